//! Signed, time-scoped credentials.
//!
//! A token has two segments separated by `.`:
//!
//! ```text
//! base64url(json(claims)) "." base64url(HMAC-SHA256(key, first segment))
//! ```
//!
//! Both segments use unpadded URL-safe base64. The MAC covers the encoded
//! claims exactly as transmitted, so any change to the payload text breaks
//! the signature. A token is expired once `now >= exp`.

mod errors;
mod revocation;

use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

pub use errors::CredentialError;
pub use revocation::RevocationSet;

use crate::clock::{Clock, SystemClock};
use crate::config::CredentialSettings;
use crate::validation::DatabaseName;

type HmacSha256 = Hmac<Sha256>;

/// Longest token accepted by [`CredentialManager::validate`].
pub const MAX_TOKEN_LEN: usize = 4096;

/// The signed content of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated username
    pub sub: String,
    /// Tenant database resolved at login
    pub tenant: DatabaseName,
    /// Client id of the tenant, when the registry knows it
    #[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Expires at, unix seconds
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl Claims {
    /// Seconds left before expiry at `now`, zero once expired.
    pub fn seconds_remaining(&self, now: i64) -> u64 {
        u64::try_from(self.exp.saturating_sub(now)).unwrap_or(0)
    }

    /// Whether these claims are expired at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// An issued credential: the bearer token plus the claims it carries.
#[derive(Clone)]
pub struct Credential {
    token: String,
    claims: Claims,
}

impl Credential {
    /// The bearer token to hand to the client.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    pub fn tenant(&self) -> &DatabaseName {
        &self.claims.tenant
    }

    pub fn issued_at(&self) -> i64 {
        self.claims.iat
    }

    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    /// Lifetime granted at issuance, in seconds.
    pub fn lifetime_secs(&self) -> u64 {
        u64::try_from(self.claims.exp - self.claims.iat).unwrap_or(0)
    }

    pub fn into_token(self) -> String {
        self.token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Expiry details for a presented token.
///
/// Times are present whenever the signature checks out, even for expired
/// tokens; they are `None` for malformed or forged input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpiryInfo {
    pub expired: bool,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub seconds_remaining: u64,
    pub minutes_remaining: u64,
}

/// Issues and validates credentials with a single HMAC key.
pub struct CredentialManager {
    key: Zeroizing<Vec<u8>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    revoked: RevocationSet,
}

impl CredentialManager {
    /// Create a manager reading wall-clock time.
    pub fn new(settings: &CredentialSettings) -> crate::Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock.
    pub fn with_clock(settings: &CredentialSettings, clock: Arc<dyn Clock>) -> crate::Result<Self> {
        settings.validate()?;
        Ok(Self {
            key: settings.key_material(),
            default_ttl: settings.ttl(),
            clock,
            revoked: RevocationSet::new(),
        })
    }

    /// The lifetime used when `issue` is given no explicit one.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Current time according to the manager's clock.
    pub fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    /// Issue a credential for `subject` bound to `tenant`.
    pub fn issue(
        &self,
        subject: &str,
        tenant: &DatabaseName,
        client_id: Option<i64>,
        ttl: Option<Duration>,
    ) -> Result<Credential, CredentialError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| CredentialError::InvalidTtl)?;
        if ttl_secs < 1 {
            return Err(CredentialError::InvalidTtl);
        }

        let iat = self.clock.now_secs();
        let claims = Claims {
            sub: subject.to_string(),
            tenant: tenant.clone(),
            client_id,
            iat,
            exp: iat.saturating_add(ttl_secs),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let json = serde_json::to_vec(&claims).map_err(|source| CredentialError::Encoding { source })?;
        let payload = Base64UrlUnpadded::encode_string(&json);
        let signature = self.mac(payload.as_bytes())?.finalize().into_bytes();
        let token = format!("{payload}.{}", Base64UrlUnpadded::encode_string(&signature));

        tracing::debug!(username = %claims.sub, tenant = %claims.tenant, exp = claims.exp, "Issued credential");
        Ok(Credential { token, claims })
    }

    /// Check signature, expiry and revocation; return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, CredentialError> {
        let claims = self.verified_claims(token)?;
        let now = self.clock.now_secs();
        if claims.is_expired_at(now) {
            return Err(CredentialError::Expired {
                expired_at: claims.exp,
            });
        }
        if self.revoked.is_revoked(&claims) {
            return Err(CredentialError::Revoked);
        }
        Ok(claims)
    }

    /// Whether `token` is unusable. Malformed, forged and revoked tokens
    /// count as expired.
    pub fn is_expired(&self, token: &str) -> bool {
        self.validate(token).is_err()
    }

    /// Expiry details for `token`. Never fails.
    pub fn expiry_info(&self, token: &str) -> ExpiryInfo {
        let now = self.clock.now_secs();
        match self.verified_claims(token) {
            Ok(claims) => {
                let expired = claims.is_expired_at(now) || self.revoked.is_revoked(&claims);
                let seconds_remaining = if expired {
                    0
                } else {
                    claims.seconds_remaining(now)
                };
                ExpiryInfo {
                    expired,
                    issued_at: Some(claims.iat),
                    expires_at: Some(claims.exp),
                    seconds_remaining,
                    minutes_remaining: seconds_remaining / 60,
                }
            }
            Err(_) => ExpiryInfo {
                expired: true,
                issued_at: None,
                expires_at: None,
                seconds_remaining: 0,
                minutes_remaining: 0,
            },
        }
    }

    /// Issue a fresh credential for the same subject and tenant.
    ///
    /// The old credential stays valid until its own expiry.
    pub fn refresh(&self, claims: &Claims) -> Result<Credential, CredentialError> {
        self.issue(&claims.sub, &claims.tenant, claims.client_id, None)
    }

    /// Revoke the credential identified by `claims` until it expires.
    pub fn revoke(&self, claims: &Claims) {
        self.revoked.revoke(claims, self.clock.now_secs());
        tracing::debug!(username = %claims.sub, tenant = %claims.tenant, "Revoked credential");
    }

    /// Parse `token` and check its signature, ignoring time and revocation.
    fn verified_claims(&self, token: &str) -> Result<Claims, CredentialError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(CredentialError::Malformed {
                reason: "token too long",
            });
        }
        let (payload, signature) = token.split_once('.').ok_or(CredentialError::Malformed {
            reason: "expected two segments",
        })?;
        if payload.is_empty() || signature.is_empty() || signature.contains('.') {
            return Err(CredentialError::Malformed {
                reason: "expected two segments",
            });
        }

        let signature_bytes = Base64UrlUnpadded::decode_vec(signature).map_err(|_| {
            CredentialError::Malformed {
                reason: "signature is not base64url",
            }
        })?;
        // Only the canonical encoding of a signature is accepted
        if Base64UrlUnpadded::encode_string(&signature_bytes) != signature {
            return Err(CredentialError::InvalidSignature);
        }
        self.mac(payload.as_bytes())?
            .verify_slice(&signature_bytes)
            .map_err(|_| CredentialError::InvalidSignature)?;

        let json = Base64UrlUnpadded::decode_vec(payload).map_err(|_| CredentialError::Malformed {
            reason: "payload is not base64url",
        })?;
        serde_json::from_slice(&json).map_err(|_| CredentialError::Malformed {
            reason: "payload is not a claims object",
        })
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, CredentialError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| {
            CredentialError::KeyRejected {
                reason: e.to_string(),
            }
        })?;
        mac.update(data);
        Ok(mac)
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("key", &"<redacted>")
            .field("default_ttl", &self.default_ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
