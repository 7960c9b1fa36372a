use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("no market data seen yet for {0}")]
    NoMarketData(core_types::Symbol),

    #[error("no resting order with id {0}")]
    UnknownOrder(core_types::OrderId),

    #[error(transparent)]
    Core(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
