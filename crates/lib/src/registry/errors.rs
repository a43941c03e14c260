//! Error types for the master registry

use thiserror::Error;

/// Errors raised by tenant resolution and registry administration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No user with this name exists in the master registry.
    #[error("User not found: {username}")]
    UserNotFound { username: String },

    /// No tenant owns this database name.
    #[error("Tenant not found: {database}")]
    TenantNotFound { database: String },

    #[error("User already exists: {username}")]
    DuplicateUser { username: String },

    #[error("Tenant database already registered: {database}")]
    DuplicateTenant { database: String },

    /// A stored row cannot be used, e.g. an unsafe tenant database name.
    #[error("Corrupt registry record for '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl RegistryError {
    /// Check if this error means a lookup found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::UserNotFound { .. } | RegistryError::TenantNotFound { .. }
        )
    }

    /// Check if this error is a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RegistryError::DuplicateUser { .. } | RegistryError::DuplicateTenant { .. }
        )
    }
}

impl From<RegistryError> for crate::Error {
    fn from(err: RegistryError) -> Self {
        crate::Error::Registry(err)
    }
}
