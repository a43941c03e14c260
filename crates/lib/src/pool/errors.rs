//! Connection provider error types.

use thiserror::Error;

/// Errors raised while obtaining or using a database connection.
///
/// Every variant is a "service unavailable" class failure from the caller's
/// point of view: the request may be retried later.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The database name is well formed but not on the allow-list.
    #[error("Unknown database: {name}")]
    UnknownDatabase {
        /// The rejected database name
        name: String,
    },

    /// Opening a pool or connection to the database failed.
    #[error("Failed to connect to database '{database}'")]
    ConnectFailed {
        /// The database being connected to
        database: String,
        /// The underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// No connection became free within the configured timeout.
    #[error("Timed out waiting for a connection to '{database}'")]
    AcquireTimeout {
        /// The database whose pool was exhausted
        database: String,
    },

    /// The provider has been closed.
    #[error("Connection provider is closed")]
    Closed,

    /// A statement or transaction control command failed.
    #[error("SQL error: {reason}")]
    Sql {
        /// Context and driver message
        reason: String,
        /// The underlying driver error, if any
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl ConnectionError {
    /// Check if this error came from an unknown database name.
    pub fn is_unknown_database(&self) -> bool {
        matches!(self, ConnectionError::UnknownDatabase { .. })
    }

    /// Check if this error is a pool exhaustion timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::AcquireTimeout { .. })
    }

    /// Check if a statement was rejected by a unique or primary key constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ConnectionError::Sql {
                source: Some(sqlx::Error::Database(db)),
                ..
            } => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Check if the failure happened while establishing connectivity.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectFailed { .. }
                | ConnectionError::AcquireTimeout { .. }
                | ConnectionError::Closed
        )
    }
}

impl From<ConnectionError> for crate::Error {
    fn from(err: ConnectionError) -> Self {
        crate::Error::Connection(err)
    }
}
