//! Common error types for NanoVault.

use thiserror::Error;

/// Top-level error type for NanoVault operations.
///
/// Variants are grouped by the layer that produces them. Callers that only
/// need to know "wrong password" versus "anything else" should match on
/// [`Error::WrongPassword`] and treat the rest as opaque.
#[derive(Debug, Error)]
pub enum Error {
    /// Master password verification did not match the stored record.
    #[error("Wrong master password")]
    WrongPassword,

    /// The user canceled or dismissed the biometric ceremony.
    #[error("Authentication canceled")]
    AuthenticationCanceled,

    /// The biometric ceremony completed but did not match. Retryable.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// No secure element or no enrolled biometric on this device.
    #[error("Hardware key storage unavailable")]
    HardwareUnavailable,

    /// AEAD tag did not verify: wrong key, corruption, or tampering.
    #[error("Authentication tag mismatch")]
    AuthenticationFailure,

    /// Encoded input could not be parsed (bad base64, truncated envelope).
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The vault is locked and no key is available.
    #[error("Vault is locked")]
    Locked,

    /// A master-password change is in progress; entry mutations are refused.
    #[error("Vault is busy re-encrypting")]
    Busy,

    /// No master password has been set up yet.
    #[error("No master password has been set up")]
    NoMasterSecret,

    /// A master password already exists.
    #[error("Master password already set up")]
    AlreadyInitialized,

    /// Cryptographic primitive failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// External store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the user can simply try again (retype, re-scan).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WrongPassword | Error::AuthenticationFailed | Error::AuthenticationCanceled
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
