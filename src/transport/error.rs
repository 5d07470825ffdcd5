//! Error types for PassThru transports.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Device or channel not open")]
    NotOpen,
    #[error("Disconnected")]
    Disconnected,
    #[error("Timeout")]
    Timeout,
    #[error("Write Failed: {0}")]
    WriteFailed(String),
    #[error("Filter Rejected: {0}")]
    FilterRejected(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
