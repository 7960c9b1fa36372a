use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no market events in [{start}, {end})")]
    InsufficientData {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error(transparent)]
    Engine(#[from] engine::Error),

    #[error(transparent)]
    Execution(#[from] execution::Error),

    #[error("data source failed: {0}")]
    Data(String),
}

pub type Result<T> = std::result::Result<T, Error>;
