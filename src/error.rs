//! Error types for SetuIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire serialization or deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file failure
    #[error("Configuration error: {0}")]
    Config(String),

    /// Write attempted while the vehicle link is closed
    #[error("Vehicle link is not open")]
    LinkClosed,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
