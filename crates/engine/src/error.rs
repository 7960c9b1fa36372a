use core_types::InstanceId;
use thiserror::Error;

use crate::instance::LifecycleState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("strategy class `{0}` is already registered")]
    DuplicateRegistration(String),

    #[error("no strategy class registered as `{0}`")]
    UnknownClass(String),

    #[error("invalid strategy configuration: {0}")]
    Configuration(String),

    #[error("no strategy instance with id {0}")]
    UnknownInstance(InstanceId),

    #[error("instance {id} is {state:?}; cannot {action}")]
    InvalidState {
        id: InstanceId,
        state: LifecycleState,
        action: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
