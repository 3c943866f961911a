//! Error types for the funnel confidence estimator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    #[error("Invalid confidence level: {0}")]
    InvalidConfidence(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
