//! Error types for srpchat operations.

use thiserror::Error;

/// Result type alias for srpchat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Main error type for srpchat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// I/O errors on the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level errors (bad header, oversized payload, decoder underflow)
    #[error("Frame error: {0}")]
    Frame(String),

    /// Protocol-state errors (wrong message type, malformed fields)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentication errors (proof mismatch, rejected ephemeral values)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The requested username has no stored credentials
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Cryptographic operation errors (AEAD failure, key derivation)
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Registration errors (duplicate username, invalid credentials)
    #[error("Registration error: {0}")]
    Registration(String),

    /// Credential store persistence errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Creates a new frame error.
    pub fn frame<T: ToString>(msg: T) -> Self {
        Self::Frame(msg.to_string())
    }

    /// Creates a new protocol error.
    pub fn protocol<T: ToString>(msg: T) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Creates a new authentication error.
    pub fn auth<T: ToString>(msg: T) -> Self {
        Self::Auth(msg.to_string())
    }

    /// Creates a new user-not-found error.
    pub fn user_not_found<T: ToString>(username: T) -> Self {
        Self::UserNotFound(username.to_string())
    }

    /// Creates a new cryptographic error.
    pub fn crypto<T: ToString>(msg: T) -> Self {
        Self::Crypto(msg.to_string())
    }

    /// Creates a new registration error.
    pub fn registration<T: ToString>(msg: T) -> Self {
        Self::Registration(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }
}
