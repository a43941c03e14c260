//! Input validation for identifiers that cross the core boundary.
//!
//! Database names and usernames are checked here before they reach a
//! connection target or a query. Nothing in this module touches a database.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a database name.
pub const MAX_DATABASE_NAME_LEN: usize = 64;

/// Maximum length of a username, in bytes.
pub const MAX_USERNAME_LEN: usize = 128;

/// Errors raised for malformed client input.
///
/// These are always client errors and are surfaced before any I/O happens.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A database identifier failed the safe-identifier rules.
    #[error("Unsafe database identifier '{value}': {reason}")]
    UnsafeIdentifier {
        /// The rejected value
        value: String,
        /// Which rule was violated
        reason: &'static str,
    },

    /// A username failed the username rules.
    #[error("Invalid username: {reason}")]
    InvalidUsername {
        /// Which rule was violated
        reason: &'static str,
    },

    /// A query filter field is out of range or malformed.
    #[error("Invalid filter '{field}': {reason}")]
    InvalidFilter {
        /// The offending filter field
        field: &'static str,
        /// Description of the problem
        reason: String,
    },

    /// A configuration value is unusable.
    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig {
        /// The offending setting
        field: &'static str,
        /// Description of the problem
        reason: String,
    },
}

/// A syntactically safe database identifier.
///
/// Accepted names are 1 to 64 characters of ASCII letters, digits and `_`,
/// starting with a letter or `_`. A `DatabaseName` can be interpolated into a
/// connection target without escaping. It is never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Parse and validate a database name.
    pub fn parse(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let value = value.as_ref();
        let unsafe_identifier = |reason| ValidationError::UnsafeIdentifier {
            value: value.chars().take(MAX_DATABASE_NAME_LEN).collect(),
            reason,
        };

        let Some(first) = value.chars().next() else {
            return Err(unsafe_identifier("empty"));
        };
        if value.len() > MAX_DATABASE_NAME_LEN {
            return Err(unsafe_identifier("longer than 64 characters"));
        }
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(unsafe_identifier("must start with a letter or underscore"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(unsafe_identifier(
                "only ASCII letters, digits and underscores are allowed",
            ));
        }

        Ok(Self(value.to_string()))
    }

    /// The validated name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DatabaseName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DatabaseName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for DatabaseName {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DatabaseName> for String {
    fn from(name: DatabaseName) -> Self {
        name.0
    }
}

/// Check a username against the username policy.
///
/// Usernames are matched exactly and case-sensitively, so no normalization
/// happens here; the value is only rejected or accepted.
pub fn check_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::InvalidUsername { reason: "empty" });
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(ValidationError::InvalidUsername {
            reason: "longer than 128 bytes",
        });
    }
    if username.chars().any(char::is_control) {
        return Err(ValidationError::InvalidUsername {
            reason: "contains control characters",
        });
    }
    Ok(())
}
