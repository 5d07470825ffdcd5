//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Not Found")]
    NotFound,
    #[error("Timeout")]
    Timeout,
    #[error("Unassigned channel bucket could not be removed")]
    UnassignedBucket,
    #[error("Duplicate simulation channel {0}")]
    DuplicateChannel(u32),
    #[error("Player already running")]
    PlayerRunning,
    #[error("Persistence Error: {0}")]
    Persistence(String),
    #[error(transparent)]
    ExpressionError(#[from] crate::expression::error::Error),
    #[error(transparent)]
    ReconstructError(#[from] crate::reconstruct::error::Error),
    #[error(transparent)]
    TransportError(#[from] crate::transport::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Persistence(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Error {
        Error::Timeout
    }
}
