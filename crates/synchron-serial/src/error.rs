//! Error types for host links

use thiserror::Error;

/// Host link errors
#[derive(Debug, Error)]
pub enum LinkError {
    /// Failed to open or accept a connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The host closed the connection
    #[error("Connection closed by host")]
    Closed,

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Result type for link operations
pub type Result<T> = core::result::Result<T, LinkError>;
