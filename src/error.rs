//! Error types for blobsync

use thiserror::Error;

/// Result type alias for blobsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for blobsync
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file system or transport reads and writes)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Rolling checksum asked to slide a window of non-positive length
    #[error("invalid rolling window length {length}")]
    InvalidWindow { length: i64 },

    /// Fewer bytes were available than a block declares
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Fewer bytes were written than a block declares
    #[error("short write at offset {offset}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// Reconstruction reached an offset with neither a reusable block nor a fetched range
    #[error("no reusable block or transfer range begins at offset {offset}")]
    MissingRange { offset: u64 },

    /// Malformed or unsupported persisted signature
    #[error("Signature error: {message}")]
    Signature { message: String },

    /// Storage backend errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Azure SDK errors
    #[error("Azure error: {message}")]
    Azure { message: String },

    /// Object not present in the store
    #[error("Object not found: {container}/{object}")]
    NotFound { container: String, object: String },

    /// Transfer worker failures
    #[error("Transfer error: {message}")]
    Transfer { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a signature format error
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying at the transport layer
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io { source, .. } => {
                use std::io::ErrorKind;
                matches!(
                    source.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                )
            }
            Error::Azure { message } => {
                let msg = message.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("connection")
                    || msg.contains("serverbusy")
                    || msg.contains("500")
                    || msg.contains("503")
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
