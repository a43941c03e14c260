//!
//! Switchboard: tenant-aware authentication and data routing.
//! Users are registered in a master database that maps each of them to one
//! tenant database. A successful login issues a signed credential bound to that
//! tenant, and every later read is routed to the tenant named in the credential.
//!
//! ## Core Concepts
//!
//! * **Connection provider (`pool::ConnectionProvider`)**: One sqlx pool per admitted database name, handing out scoped connections and running transactional work.
//! * **Credentials (`credential::CredentialManager`)**: HMAC-SHA256 signed, time-scoped tokens carrying the user and tenant.
//! * **Registry (`registry::TenantResolver`)**: Looks up which tenant database a user belongs to. `registry::MasterRegistry` is the SQL implementation.
//! * **Sessions (`session::SessionService`)**: Login, authorization and tenant-scoped reads.
//! * **Tenant queries (`tenant::TenantQuery`)**: Typed, parameterized reads of contacts and tickets. No raw SQL crosses the API.
//! * **Database names (`validation::DatabaseName`)**: The only way a tenant name reaches a connection target.

pub mod clock;
pub mod config;
pub mod credential;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod secret;
pub mod session;
pub mod tenant;
pub mod validation;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use config::Settings;
pub use session::{Principal, SessionService};
pub use validation::DatabaseName;

/// Result type used throughout the Switchboard library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Switchboard library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Malformed input, rejected before any I/O
    #[error(transparent)]
    Validation(validation::ValidationError),

    /// Database connectivity and SQL failures from the pool module
    #[error(transparent)]
    Connection(pool::ConnectionError),

    /// Credential failures from the credential module
    #[error(transparent)]
    Credential(credential::CredentialError),

    /// Lookup and administration failures from the registry module
    #[error(transparent)]
    Registry(registry::RegistryError),

    /// Secret hashing failures from the secret module
    #[error(transparent)]
    Secret(secret::SecretError),

    /// Authentication and authorization failures from the session module
    #[error(transparent)]
    Session(session::SessionError),
}

/// Coarse classification of an [`Error`], used to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was malformed
    Validation,
    /// The caller is not authenticated
    Unauthorized,
    /// The caller is authenticated but not allowed
    Forbidden,
    /// The requested record does not exist
    NotFound,
    /// The record already exists
    Conflict,
    /// A database operation failed; retrying may help
    Unavailable,
    /// Anything else
    Internal,
}

impl From<validation::ValidationError> for Error {
    fn from(err: validation::ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Validation(_) => "validation",
            Error::Connection(_) => "pool",
            Error::Credential(_) => "credential",
            Error::Registry(_) => "registry",
            Error::Secret(_) => "secret",
            Error::Session(_) => "session",
        }
    }

    /// Classify this error.
    ///
    /// Credential failures count as unauthorized. Every connection provider
    /// failure, SQL errors included, counts as unavailable.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Credential(e) if e.is_rejection() => ErrorKind::Unauthorized,
            Error::Session(e) if e.is_forbidden() => ErrorKind::Forbidden,
            Error::Session(_) => ErrorKind::Unauthorized,
            Error::Registry(e) if e.is_not_found() => ErrorKind::NotFound,
            Error::Registry(e) if e.is_conflict() => ErrorKind::Conflict,
            Error::Connection(_) => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Registry(e) => e.is_not_found(),
            Error::Connection(e) => e.is_unknown_database(),
            _ => false,
        }
    }

    /// Check if this error is authentication-related.
    pub fn is_authentication_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unauthorized)
    }

    /// Check if this error indicates permission was denied.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.kind(), ErrorKind::Forbidden)
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this error is database-related.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error indicates a timeout waiting for a connection.
    pub fn is_timeout_error(&self) -> bool {
        match self {
            Error::Connection(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Registry(e) => e.is_conflict(),
            _ => false,
        }
    }
}
