//! Error types for session operations

use thiserror::Error;

use crate::credential::CredentialError;

/// Authentication and authorization failures.
///
/// The display strings are deliberately generic; they are what clients see.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown user or wrong secret. The two are indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The presented credential is missing, malformed, forged, expired or revoked.
    #[error("unauthorized")]
    Unauthorized {
        #[source]
        source: Option<CredentialError>,
    },

    /// The principal is valid but the target is outside its tenant.
    #[error("forbidden")]
    Forbidden { reason: String },
}

impl SessionError {
    /// Check if this error should be answered with an authentication challenge.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidCredentials | SessionError::Unauthorized { .. }
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, SessionError::Forbidden { .. })
    }
}

impl From<SessionError> for crate::Error {
    fn from(err: SessionError) -> Self {
        crate::Error::Session(err)
    }
}
