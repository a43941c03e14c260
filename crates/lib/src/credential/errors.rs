//! Error types for credential issuance and validation

use thiserror::Error;

/// Errors raised by the credential manager.
///
/// Callers outside the core only ever see a generic "unauthorized" outcome;
/// the variants exist for logging and tests.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Malformed credential: {reason}")]
    Malformed { reason: &'static str },

    #[error("Credential signature mismatch")]
    InvalidSignature,

    #[error("Credential expired at {expired_at}")]
    Expired { expired_at: i64 },

    #[error("Credential has been revoked")]
    Revoked,

    #[error("Credential lifetime must be at least one second")]
    InvalidTtl,

    #[error("Signing key rejected: {reason}")]
    KeyRejected { reason: String },

    #[error("Failed to encode credential claims")]
    Encoding {
        #[source]
        source: serde_json::Error,
    },
}

impl CredentialError {
    /// Check if this error means the token was once valid but its time ran out.
    pub fn is_expired(&self) -> bool {
        matches!(self, CredentialError::Expired { .. })
    }

    /// Check if this error means the token was forged, tampered or garbled.
    pub fn is_forged(&self) -> bool {
        matches!(
            self,
            CredentialError::InvalidSignature | CredentialError::Malformed { .. }
        )
    }

    /// Check if this error is about a presented token rather than issuance.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CredentialError::Malformed { .. }
                | CredentialError::InvalidSignature
                | CredentialError::Expired { .. }
                | CredentialError::Revoked
        )
    }
}

impl From<CredentialError> for crate::Error {
    fn from(err: CredentialError) -> Self {
        crate::Error::Credential(err)
    }
}
