//! Login, authorization and tenant-scoped data access.
//!
//! [`SessionService`] is the entry point used by the HTTP layer. Every data
//! call starts from a [`Principal`], and a `Principal` can only be obtained
//! by validating a credential through [`SessionService::authorize`]. The
//! tenant a principal reads from is the one recorded in its credential at
//! login; the registry is not consulted again.

mod errors;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use zeroize::Zeroizing;

pub use errors::SessionError;

use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::credential::{Claims, Credential, CredentialManager, ExpiryInfo};
use crate::pool::ConnectionProvider;
use crate::registry::{MasterRegistry, TenantRecord, TenantResolver, UserProfile};
use crate::schema;
use crate::secret::{Argon2Verifier, SecretError, SecretVerifier};
use crate::tenant::{self, ContactRecord, TenantQuery, TenantRecords};
use crate::validation::{DatabaseName, check_username};

/// An authenticated caller, bound to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    username: String,
    tenant: DatabaseName,
    client_id: Option<i64>,
    issued_at: i64,
    expires_at: i64,
    #[serde(skip)]
    claims: Claims,
}

impl Principal {
    fn from_claims(claims: Claims) -> Self {
        Self {
            username: claims.sub.clone(),
            tenant: claims.tenant.clone(),
            client_id: claims.client_id,
            issued_at: claims.iat,
            expires_at: claims.exp,
            claims,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The tenant database this principal may read.
    pub fn tenant(&self) -> &DatabaseName {
        &self.tenant
    }

    pub fn client_id(&self) -> Option<i64> {
        self.client_id
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub credential: Credential,
    pub username: String,
    pub tenant: DatabaseName,
    pub client_id: i64,
    /// Contacts of the tenant at login time
    pub contacts: Vec<ContactRecord>,
}

impl LoginOutcome {
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn expires_at(&self) -> i64 {
        self.credential.expires_at()
    }
}

/// Validity details of a presented credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub username: String,
    pub tenant: DatabaseName,
    pub client_id: Option<i64>,
    pub issued_at: i64,
    pub valid_until: i64,
    pub seconds_remaining: u64,
    pub minutes_remaining: u64,
}

/// Authenticates users and serves tenant-scoped reads.
#[derive(Debug)]
pub struct SessionService {
    provider: Arc<ConnectionProvider>,
    resolver: Arc<dyn TenantResolver>,
    credentials: CredentialManager,
    verifier: Arc<dyn SecretVerifier>,
}

impl SessionService {
    /// Assemble a service from its parts.
    pub fn new(
        provider: Arc<ConnectionProvider>,
        resolver: Arc<dyn TenantResolver>,
        credentials: CredentialManager,
        verifier: Arc<dyn SecretVerifier>,
    ) -> Self {
        Self {
            provider,
            resolver,
            credentials,
            verifier,
        }
    }

    /// Open a service from settings with the system clock and Argon2id.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let verifier = Arc::new(Argon2Verifier::new()?);
        Self::open_with(settings, Arc::new(SystemClock), verifier).await
    }

    /// Open a service from settings with an explicit clock and verifier.
    ///
    /// Ensures the master schema exists and admits every registered tenant,
    /// so credentials issued before a restart keep routing.
    pub async fn open_with(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn SecretVerifier>,
    ) -> Result<Self> {
        settings.validate()?;
        let provider = Arc::new(ConnectionProvider::new(
            settings.connection.clone(),
            settings.master_database.clone(),
        )?);
        schema::initialize_master(&provider).await?;

        let registry = Arc::new(MasterRegistry::new(Arc::clone(&provider)));
        let credentials = CredentialManager::with_clock(&settings.credentials, clock)?;
        let service = Self::new(provider, registry, credentials, verifier);

        let tenants = service.resolver.list_tenants().await?;
        tracing::info!(tenants = tenants.len(), "Session service ready");
        Ok(service)
    }

    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn resolver(&self) -> &Arc<dyn TenantResolver> {
        &self.resolver
    }

    pub fn verifier(&self) -> &Arc<dyn SecretVerifier> {
        &self.verifier
    }

    /// Authenticate `username` and issue a credential bound to its tenant.
    ///
    /// Unknown users and wrong secrets both fail with
    /// [`SessionError::InvalidCredentials`] after the same amount of hashing.
    pub async fn login(&self, username: &str, secret: &str) -> Result<LoginOutcome> {
        check_username(username)?;

        let record = match self.resolver.resolve_by_username(username).await {
            Ok(record) => Some(record),
            Err(crate::Error::Registry(e)) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let stored = match &record {
            Some(record) => record.secret_hash.clone(),
            None => self.verifier.dummy().to_string(),
        };
        let verifier = Arc::clone(&self.verifier);
        let secret = Zeroizing::new(secret.to_string());
        let matched = tokio::task::spawn_blocking(move || verifier.verify(&secret, &stored))
            .await
            .map_err(|e| SecretError::TaskFailed {
                reason: e.to_string(),
            })?;

        let record = match record {
            Some(record) if matched => record,
            _ => {
                tracing::warn!(username, "Login rejected");
                return Err(SessionError::InvalidCredentials.into());
            }
        };

        let credential =
            self.credentials
                .issue(&record.username, &record.tenant, Some(record.client_id), None)?;

        let contacts = self
            .read_tenant(&record.tenant, &TenantQuery::all_contacts())
            .await?
            .into_contacts()
            .unwrap_or_default();

        tracing::info!(
            username = %record.username,
            tenant = %record.tenant,
            contacts = contacts.len(),
            "Login succeeded"
        );
        Ok(LoginOutcome {
            credential,
            username: record.username,
            tenant: record.tenant,
            client_id: record.client_id,
            contacts,
        })
    }

    /// Validate `token` and return the principal it names.
    pub fn authorize(&self, token: &str) -> Result<Principal> {
        match self.credentials.validate(token) {
            Ok(claims) => Ok(Principal::from_claims(claims)),
            Err(source) => {
                tracing::debug!("Credential rejected: {source}");
                Err(SessionError::Unauthorized {
                    source: Some(source),
                }
                .into())
            }
        }
    }

    /// Run `query` against the principal's tenant.
    pub async fn fetch_tenant_data(
        &self,
        principal: &Principal,
        query: &TenantQuery,
    ) -> Result<TenantRecords> {
        query.validate()?;
        let records = self.read_tenant(principal.tenant(), query).await?;
        tracing::debug!(
            username = %principal.username,
            tenant = %principal.tenant,
            rows = records.len(),
            "Fetched tenant data"
        );
        Ok(records)
    }

    /// Check `token` and report how long it stays valid.
    pub fn verify(&self, token: &str) -> Result<TokenStatus> {
        let principal = self.authorize(token)?;
        let seconds_remaining = principal.claims.seconds_remaining(self.credentials.now());
        Ok(TokenStatus {
            username: principal.username,
            tenant: principal.tenant,
            client_id: principal.client_id,
            issued_at: principal.issued_at,
            valid_until: principal.expires_at,
            seconds_remaining,
            minutes_remaining: seconds_remaining / 60,
        })
    }

    /// Expiry details without failing; see [`CredentialManager::expiry_info`].
    pub fn expiry_info(&self, token: &str) -> ExpiryInfo {
        self.credentials.expiry_info(token)
    }

    /// Issue a new credential for the same user and tenant.
    pub fn refresh(&self, principal: &Principal) -> Result<Credential> {
        let credential = self.credentials.refresh(&principal.claims)?;
        tracing::info!(username = %principal.username, tenant = %principal.tenant, "Credential refreshed");
        Ok(credential)
    }

    /// Revoke `token` so later calls with it fail.
    pub fn logout(&self, token: &str) -> Result<()> {
        let principal = self.authorize(token)?;
        self.credentials.revoke(&principal.claims);
        tracing::info!(username = %principal.username, tenant = %principal.tenant, "Logged out");
        Ok(())
    }

    /// Registered tenants visible to `principal`: its own.
    pub async fn list_tenants(&self, principal: &Principal) -> Result<Vec<TenantRecord>> {
        let tenants = self.resolver.list_tenants().await?;
        Ok(tenants
            .into_iter()
            .filter(|t| &t.database == principal.tenant())
            .collect())
    }

    /// Table names in `database`, which must be the principal's tenant.
    pub async fn list_tables(
        &self,
        principal: &Principal,
        database: &DatabaseName,
    ) -> Result<Vec<String>> {
        if database != principal.tenant() {
            return Err(SessionError::Forbidden {
                reason: format!("{database} is not the caller's tenant"),
            }
            .into());
        }
        let mut conn = self.provider.acquire(database).await?;
        schema::table_names(&mut conn, self.provider.target().is_sqlite()).await
    }

    /// Profile of `username` if it belongs to the principal's tenant.
    ///
    /// Users of other tenants are reported as not found.
    pub async fn user_record(&self, principal: &Principal, username: &str) -> Result<UserProfile> {
        let record = self.resolver.resolve_by_username(username).await?;
        if &record.tenant != principal.tenant() {
            return Err(crate::registry::RegistryError::UserNotFound {
                username: username.to_string(),
            }
            .into());
        }
        Ok(record.profile())
    }

    /// Default lifetime of issued credentials.
    pub fn token_ttl(&self) -> Duration {
        self.credentials.default_ttl()
    }

    async fn read_tenant(&self, tenant: &DatabaseName, query: &TenantQuery) -> Result<TenantRecords> {
        let mut conn = self.provider.acquire(tenant).await?;
        tenant::run(&mut conn, query).await
    }
}
