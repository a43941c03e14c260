//! Process-local revocation set used by logout.
//!
//! Entries are kept only until the revoked credential would have expired on
//! its own; after that the expiry check rejects it anyway.

use std::collections::HashMap;
use std::sync::Mutex;

use super::Claims;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Revoked {
    subject: String,
    tenant: String,
    issued_at: i64,
    expires_at: i64,
}

/// Revoked credentials keyed by token id.
#[derive(Debug, Default)]
pub struct RevocationSet {
    entries: Mutex<HashMap<String, Revoked>>,
}

impl RevocationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `claims`, dropping entries that expired before `now`.
    pub fn revoke(&self, claims: &Claims, now: i64) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            claims.jti.clone(),
            Revoked {
                subject: claims.sub.clone(),
                tenant: claims.tenant.to_string(),
                issued_at: claims.iat,
                expires_at: claims.exp,
            },
        );
    }

    /// Whether `claims` identifies a revoked credential.
    pub fn is_revoked(&self, claims: &Claims) -> bool {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(&claims.jti).is_some_and(|entry| {
            entry.subject == claims.sub
                && entry.tenant == claims.tenant.as_str()
                && entry.issued_at == claims.iat
        })
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
