//! Stored-secret hashing and verification.
//!
//! Secrets are stored as Argon2id PHC strings. [`PlaintextVerifier`] exists
//! only to check legacy rows that predate hashing.

use std::fmt::Debug;

use argon2::{
    Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core},
};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while hashing a secret.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret hashing failed: {reason}")]
    HashFailed { reason: String },

    #[error("Verifier task failed: {reason}")]
    TaskFailed { reason: String },
}

impl From<SecretError> for crate::Error {
    fn from(err: SecretError) -> Self {
        crate::Error::Secret(err)
    }
}

/// Checks presented secrets against stored values.
///
/// Implementations are CPU-bound; async callers should run them on a
/// blocking thread.
pub trait SecretVerifier: Send + Sync + Debug {
    /// Whether `secret` matches `stored`. Unparsable stored values never match.
    fn verify(&self, secret: &str, stored: &str) -> bool;

    /// Produce the stored form of `secret`.
    fn hash(&self, secret: &str) -> Result<String, SecretError>;

    /// A stored value that matches no secret, verified when the user does not
    /// exist so that lookups cost the same either way.
    fn dummy(&self) -> &str;
}

/// Argon2id verifier; the default.
#[derive(Debug, Clone)]
pub struct Argon2Verifier {
    params: Params,
    dummy: String,
}

impl Argon2Verifier {
    /// Verifier hashing with the Argon2 default cost.
    pub fn new() -> Result<Self, SecretError> {
        Self::with_params(Params::default())
    }

    /// Verifier hashing with explicit cost parameters.
    ///
    /// Verification always uses the parameters recorded in the stored hash.
    pub fn with_params(params: Params) -> Result<Self, SecretError> {
        let mut verifier = Self {
            params,
            dummy: String::new(),
        };
        verifier.dummy = verifier.hash("switchboard-dummy-secret")?;
        Ok(verifier)
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }
}

impl SecretVerifier for Argon2Verifier {
    fn verify(&self, secret: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            tracing::warn!("Stored secret is not a PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    fn hash(&self, secret: &str) -> Result<String, SecretError> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        self.hasher()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| SecretError::HashFailed {
                reason: e.to_string(),
            })
    }

    fn dummy(&self) -> &str {
        &self.dummy
    }
}

/// Compares against secrets stored in the clear.
///
/// Only for legacy registries that have not been rehashed. Both sides are
/// digested before comparison so the comparison time does not depend on
/// where the secrets first differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextVerifier;

impl SecretVerifier for PlaintextVerifier {
    fn verify(&self, secret: &str, stored: &str) -> bool {
        Sha256::digest(secret.as_bytes()) == Sha256::digest(stored.as_bytes())
    }

    fn hash(&self, secret: &str) -> Result<String, SecretError> {
        Ok(secret.to_string())
    }

    fn dummy(&self) -> &str {
        ""
    }
}
