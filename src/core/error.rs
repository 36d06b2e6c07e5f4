//! Error types for typed Redis operations

use std::io;
use thiserror::Error;

/// Result type for Redis operations
pub type RedisResult<T> = Result<T, RedisError>;

/// Comprehensive error type for Redis operations
#[derive(Error, Debug)]
pub enum RedisError {
    /// IO error during network operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection error (transport unreachable, handshake failure)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Server rejected a command
    #[error("Server error: {0}")]
    Server(String),

    /// Value conversion error (serialization or deserialization)
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Invalid configuration, reported by transport factories
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Transaction-level failure (aborted batch, mismatched results)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Unexpected response from server
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl RedisError {
    /// Check if this error indicates the transport itself is unusable
    /// (as opposed to a per-command rejection by the server).
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RedisError::Io(_) | RedisError::Connection(_) | RedisError::Timeout
        )
    }

    /// Check if this error is a server-side `NOSCRIPT` rejection of EVALSHA.
    pub fn is_noscript(&self) -> bool {
        matches!(self, RedisError::Server(msg) if msg.starts_with("NOSCRIPT"))
    }
}
