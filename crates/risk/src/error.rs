use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("a risk rule named `{0}` already exists")]
    DuplicateRule(String),

    #[error("no risk rule named `{0}`")]
    UnknownRule(String),
}

pub type Result<T> = std::result::Result<T, Error>;
