//! Error types for BES transport and caching operations
//!
//! The taxonomy separates faults that are fatal to a connection (malformed
//! headers, I/O failures, rejected handshakes) from failures the BES itself
//! reports for a request. Only the latter are values worth caching, so they
//! live in their own cloneable [`BackendError`] type.

use std::fmt;
use thiserror::Error;

/// A failure reported by the BES for one request (`status=error`).
///
/// The message is the diagnostic text the BES wrote into the error stream.
/// This type is `Clone` because the caches keep it as a first-class cached
/// response and hand copies to every caller that hits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from the raw bytes collected in an error sink.
    pub fn from_detail(detail: &[u8]) -> Self {
        let text = String::from_utf8_lossy(detail);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Self::new("BES reported an error without a diagnostic message")
        } else {
            Self::new(trimmed)
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

/// Main error type for BES operations
#[derive(Error, Debug)]
pub enum BesError {
    /// Chunk header could not be parsed - fatal to the connection
    #[error("Malformed chunk header: {0}")]
    MalformedHeader(String),

    /// Attempt to encode a chunk larger than the 7-hex-digit size field allows
    #[error("Chunk of {size} bytes exceeds the maximum encodable size of {max} bytes")]
    ChunkTooLarge { size: usize, max: usize },

    /// I/O failure on the underlying connection
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Transport failure described by context rather than an io::Error
    #[error("Transport error: {0}")]
    TransportMessage(String),

    /// The connection has already been torn down
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Peer rejected the connection or never reached the ready state
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The BES explicitly reported an error for a request
    #[error("BES error: {0}")]
    Backend(BackendError),

    /// Cache `init` called twice
    #[error("{0} has already been initialized")]
    AlreadyInitialized(&'static str),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    BadConfiguration(String),

    /// A response could not be turned into a document
    #[error("Parse error: {0}")]
    Parse(String),
}

impl BesError {
    /// True for errors that leave the connection unusable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            BesError::MalformedHeader(_)
                | BesError::Transport(_)
                | BesError::TransportMessage(_)
                | BesError::ConnectionClosed(_)
                | BesError::HandshakeFailed(_)
        )
    }

    /// The cached-failure payload, if this is a BES-reported error.
    pub fn as_backend(&self) -> Option<&BackendError> {
        match self {
            BesError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for BesError {
    fn from(e: BackendError) -> Self {
        BesError::Backend(e)
    }
}

/// Result type alias for BES operations
pub type Result<T> = std::result::Result<T, BesError>;
