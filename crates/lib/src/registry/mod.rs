//! Master registry: which user belongs to which tenant database.
//!
//! The registry lives in the master database (`users` joined to `tenants`).
//! Every tenant database name read from it is validated and admitted into the
//! [`ConnectionProvider`] allow-list; nothing else can add tenant names.

mod errors;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use errors::RegistryError;

use crate::Result;
use crate::pool::{ConnectionProvider, SqlxResultExt};
use crate::secret::SecretVerifier;
use crate::validation::{DatabaseName, check_username};

/// Registration attempts before a client id collision is reported.
const CLIENT_ID_ATTEMPTS: usize = 3;

/// A user row from the master registry.
#[derive(Clone)]
pub struct UserRecord {
    pub username: String,
    /// Stored secret, normally an Argon2id PHC string
    pub secret_hash: String,
    /// Tenant database the user's data lives in
    pub tenant: DatabaseName,
    pub client_id: i64,
}

impl UserRecord {
    /// The record without its stored secret.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            tenant: self.tenant.clone(),
            client_id: self.client_id,
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("secret_hash", &"<redacted>")
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Public view of a [`UserRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub tenant: DatabaseName,
    pub client_id: i64,
}

/// A tenant row from the master registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantRecord {
    pub client_id: i64,
    pub name: String,
    pub database: DatabaseName,
}

/// Looks up the tenant a user belongs to.
#[async_trait]
pub trait TenantResolver: Send + Sync + std::fmt::Debug {
    /// Find `username` and the tenant database it maps to.
    ///
    /// Fails with [`RegistryError::UserNotFound`] when there is no such user.
    async fn resolve_by_username(&self, username: &str) -> Result<UserRecord>;

    /// Every registered tenant, ordered by client id.
    async fn list_tenants(&self) -> Result<Vec<TenantRecord>>;
}

/// [`TenantResolver`] backed by the master database.
#[derive(Debug, Clone)]
pub struct MasterRegistry {
    provider: Arc<ConnectionProvider>,
}

impl MasterRegistry {
    pub fn new(provider: Arc<ConnectionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<ConnectionProvider> {
        &self.provider
    }

    /// Register a tenant owning `database`. The client id is assigned here.
    ///
    /// Another registry process may claim the same client id between the
    /// allocation and the insert; the registration is then retried with a
    /// fresh id.
    pub async fn register_tenant(&self, name: &str, database: &DatabaseName) -> Result<TenantRecord> {
        if database == self.provider.master() {
            return Err(RegistryError::DuplicateTenant {
                database: database.to_string(),
            }
            .into());
        }

        let mut attempt = 1;
        let client_id = loop {
            match self.insert_tenant(name, database).await {
                Err(err) if is_unique_violation(&err) && attempt < CLIENT_ID_ATTEMPTS => {
                    tracing::debug!(tenant = %database, attempt, "Client id taken, retrying");
                    attempt += 1;
                }
                result => break result?,
            }
        };

        self.provider.admit(database);
        tracing::info!(tenant = %database, client_id, "Registered tenant");
        Ok(TenantRecord {
            client_id,
            name: name.to_string(),
            database: database.clone(),
        })
    }

    async fn insert_tenant(&self, name: &str, database: &DatabaseName) -> Result<i64> {
        let tenant_name = name.to_string();
        let db = database.to_string();
        self.provider
            .with_transaction(self.provider.master(), move |conn| {
                Box::pin(async move {
                    let existing: Option<(i64,)> =
                        sqlx::query_as("SELECT client_id FROM tenants WHERE database_name = $1")
                            .bind(&db)
                            .fetch_optional(&mut *conn)
                            .await
                            .sql_context("Failed to check tenant")?;
                    if existing.is_some() {
                        return Err(RegistryError::DuplicateTenant { database: db }.into());
                    }

                    let (client_id,): (i64,) =
                        sqlx::query_as("SELECT COALESCE(MAX(client_id), 0) + 1 FROM tenants")
                            .fetch_one(&mut *conn)
                            .await
                            .sql_context("Failed to allocate client id")?;

                    sqlx::query(
                        "INSERT INTO tenants (client_id, name, database_name) VALUES ($1, $2, $3)",
                    )
                    .bind(client_id)
                    .bind(&tenant_name)
                    .bind(&db)
                    .execute(&mut *conn)
                    .await
                    .sql_context("Failed to insert tenant")?;
                    Ok(client_id)
                })
            })
            .await
    }

    /// Register `username` under the tenant owning `database`.
    ///
    /// The secret is hashed with `verifier` before it is stored.
    pub async fn register_user(
        &self,
        username: &str,
        secret: &str,
        database: &DatabaseName,
        verifier: &dyn SecretVerifier,
    ) -> Result<UserProfile> {
        check_username(username)?;
        let secret_hash = verifier.hash(secret)?;

        let master = self.provider.master().clone();
        let user = username.to_string();
        let db = database.to_string();
        let client_id = self
            .provider
            .with_transaction(&master, move |conn| {
                Box::pin(async move {
                    let tenant: Option<(i64,)> =
                        sqlx::query_as("SELECT client_id FROM tenants WHERE database_name = $1")
                            .bind(&db)
                            .fetch_optional(&mut *conn)
                            .await
                            .sql_context("Failed to look up tenant")?;
                    let Some((client_id,)) = tenant else {
                        return Err(RegistryError::TenantNotFound { database: db }.into());
                    };

                    let existing: Option<(String,)> =
                        sqlx::query_as("SELECT username FROM users WHERE username = $1")
                            .bind(&user)
                            .fetch_optional(&mut *conn)
                            .await
                            .sql_context("Failed to check user")?;
                    if existing.is_some() {
                        return Err(RegistryError::DuplicateUser { username: user }.into());
                    }

                    let inserted = sqlx::query(
                        "INSERT INTO users (username, password_hash, client_id) VALUES ($1, $2, $3)",
                    )
                    .bind(&user)
                    .bind(&secret_hash)
                    .bind(client_id)
                    .execute(&mut *conn)
                    .await
                    .sql_context("Failed to insert user");
                    match inserted {
                        Ok(_) => Ok(client_id),
                        // Registered elsewhere after the check above
                        Err(err) if is_unique_violation(&err) => {
                            Err(RegistryError::DuplicateUser { username: user }.into())
                        }
                        Err(err) => Err(err),
                    }
                })
            })
            .await?;

        tracing::info!(username, tenant = %database, "Registered user");
        Ok(UserProfile {
            username: username.to_string(),
            tenant: database.clone(),
            client_id,
        })
    }

    /// Validate a stored tenant database name and admit it.
    fn admit_stored(&self, key: &str, stored: &str) -> Result<DatabaseName> {
        let database = DatabaseName::parse(stored).map_err(|e| RegistryError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.provider.admit(&database);
        Ok(database)
    }
}

fn is_unique_violation(err: &crate::Error) -> bool {
    matches!(err, crate::Error::Connection(e) if e.is_unique_violation())
}

#[async_trait]
impl TenantResolver for MasterRegistry {
    async fn resolve_by_username(&self, username: &str) -> Result<UserRecord> {
        check_username(username)?;
        let mut conn = self.provider.acquire(self.provider.master()).await?;
        let row: Option<(String, String, i64, String)> = sqlx::query_as(
            "SELECT u.username, u.password_hash, u.client_id, t.database_name \
             FROM users u INNER JOIN tenants t ON t.client_id = u.client_id \
             WHERE u.username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *conn)
        .await
        .sql_context("Failed to resolve user")?;
        drop(conn);

        let Some((username, secret_hash, client_id, database)) = row else {
            return Err(RegistryError::UserNotFound {
                username: username.to_string(),
            }
            .into());
        };
        let tenant = self.admit_stored(&username, &database)?;
        tracing::debug!(username = %username, tenant = %tenant, "Resolved user");
        Ok(UserRecord {
            username,
            secret_hash,
            tenant,
            client_id,
        })
    }

    async fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        let mut conn = self.provider.acquire(self.provider.master()).await?;
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT client_id, name, database_name FROM tenants ORDER BY client_id",
        )
        .fetch_all(&mut *conn)
        .await
        .sql_context("Failed to list tenants")?;
        drop(conn);

        let mut tenants = Vec::with_capacity(rows.len());
        for (client_id, name, database) in rows {
            match self.admit_stored(&name, &database) {
                Ok(database) => tenants.push(TenantRecord {
                    client_id,
                    name,
                    database,
                }),
                Err(e) => tracing::warn!(client_id, "Skipping tenant: {e}"),
            }
        }
        Ok(tenants)
    }
}
