use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid symbol `{0}`: expected `BASE/QUOTE` form")]
    InvalidSymbol(String),

    #[error("invalid timeframe `{0}`")]
    InvalidTimeframe(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("order {id} is {status:?}; cannot {action}")]
    InvalidTransition {
        id: String,
        status: crate::order::OrderStatus,
        action: &'static str,
    },

    #[error("a price is required for {0:?} orders")]
    MissingPrice(crate::order::OrderType),
}

pub type Result<T> = std::result::Result<T, Error>;
