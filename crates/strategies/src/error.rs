use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse strategy parameters: {0}")]
    ParseParams(#[from] toml::de::Error),

    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Core(#[from] core_types::Error),

    #[error("strategy callback failed: {0}")]
    Callback(String),
}

pub type Result<T> = std::result::Result<T, Error>;
