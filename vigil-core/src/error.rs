use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid detection settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Unknown detection mode: {0}")]
    UnknownMode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
