//! Scale link errors

use thiserror::Error;

/// Errors that can occur while selecting, opening, reading or closing a scale port
#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("Port selection cancelled")]
    SelectionCancelled,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Failed to open port: {0}")]
    OpenFailed(String),

    #[error("Port is already open")]
    AlreadyOpen,

    #[error("Port is not open")]
    NotOpen,

    #[error("Reader is unavailable (already acquired or port closed)")]
    ReaderUnavailable,

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
