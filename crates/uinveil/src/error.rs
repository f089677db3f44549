//! Error types for the codecs and the policy engine.

use thiserror::Error;

/// Errors produced by the core operations.
///
/// Cipher failures are deliberately collapsed into [`CloakError::Integrity`] so
/// callers cannot tell a malformed token from a forged one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CloakError {
    /// Caller input rejected: missing identifier or extras under `deny`.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The cipher token did not decode to authentic plaintext.
    #[error("Invalid cipher")]
    Integrity,

    /// Key material or policy configuration cannot be used.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The signature token does not match the request.
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// Outbound materials could not be serialized.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloakError {
    /// Whether the error is the caller's fault rather than a forgery or misconfiguration.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the error means the request failed authentication.
    ///
    /// These are terminal; retrying the same input cannot succeed.
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Integrity | Self::SignatureMismatch)
    }
}

/// Result type alias using `CloakError`.
pub type Result<T> = std::result::Result<T, CloakError>;
