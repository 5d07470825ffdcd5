use thiserror::Error;

/// Reasons a logged message or filter could not be rebuilt. Each one drops only the affected message or filter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown protocol {0}")]
    UnknownProtocol(String),
    #[error("Unknown filter type {0}")]
    UnknownFilterType(String),
    #[error("Invalid flag value {0}")]
    InvalidFlags(String),
    #[error("Invalid payload bytes {0}")]
    InvalidData(String),
    #[error("Declared {declared} bytes, found {found}")]
    SizeMismatch { declared: usize, found: usize },
    #[error("Payload of {0} bytes does not fit a length byte")]
    PayloadTooLong(usize),
    #[error("Filter has no {0} message")]
    MissingFilterMessage(&'static str),
}
