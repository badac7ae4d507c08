//! Common error types for CrypTool.

use thiserror::Error;

/// Top-level error type for CrypTool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input provided by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Input is not valid ciphertext for the supplied key material.
    ///
    /// Covers a wrong key or IV, a different strength tier, truncated or
    /// corrupted input and padding failures.
    #[error("Input is not valid ciphertext for this key")]
    CiphertextInvalid,

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was stopped through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Cipher setup failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error means "the input was not ciphertext for this key".
    ///
    /// This is the only class of failure after which treating the input as
    /// plaintext makes sense.
    pub fn is_ciphertext_invalid(&self) -> bool {
        matches!(self, Error::CiphertextInvalid)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
