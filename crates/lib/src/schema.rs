//! Versioned schema contract for the master registry and tenant databases.
//!
//! Every tenant database carries the same fixed set of tables, so queries never
//! interpolate table or column names. The SQL is portable between SQLite and
//! PostgreSQL.
//!
//! # Migration System
//!
//! Each schema kind records its version in a `schema_version` table. When
//! `SCHEMA_VERSION` is incremented, add a `migrate_vN_to_vM` function and a
//! match arm in [`run_migration`].

use sqlx::AnyConnection;

use crate::Result;
use crate::pool::{ConnectionError, ConnectionProvider, SqlxResultExt};
use crate::validation::DatabaseName;

/// Current schema version for both schema kinds.
pub const SCHEMA_VERSION: i64 = 1;

/// Which table set a database carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// The master registry: tenants and users.
    Master,
    /// A tenant database: contacts and tickets.
    Tenant,
}

impl SchemaKind {
    fn tables(self) -> &'static [&'static str] {
        match self {
            SchemaKind::Master => MASTER_TABLES,
            SchemaKind::Tenant => TENANT_TABLES,
        }
    }

    fn indexes(self) -> &'static [&'static str] {
        match self {
            SchemaKind::Master => MASTER_INDEXES,
            SchemaKind::Tenant => TENANT_INDEXES,
        }
    }
}

const SCHEMA_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version BIGINT PRIMARY KEY
)";

/// Master registry tables.
pub const MASTER_TABLES: &[&str] = &[
    // One row per client; database_name is the tenant allow-list
    "CREATE TABLE IF NOT EXISTS tenants (
        client_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        database_name TEXT NOT NULL UNIQUE
    )",
    // password_hash holds a PHC string
    "CREATE TABLE IF NOT EXISTS users (
        username TEXT PRIMARY KEY NOT NULL,
        password_hash TEXT NOT NULL,
        client_id BIGINT NOT NULL REFERENCES tenants(client_id)
    )",
];

const MASTER_INDEXES: &[&str] = &["CREATE INDEX IF NOT EXISTS idx_users_client ON users(client_id)"];

/// Tenant database tables.
pub const TENANT_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS contacts (
        id BIGINT PRIMARY KEY,
        username TEXT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        status BIGINT NOT NULL DEFAULT 0,
        channel TEXT
    )",
    "CREATE TABLE IF NOT EXISTS tickets (
        id BIGINT PRIMARY KEY,
        contact_id BIGINT NOT NULL REFERENCES contacts(id),
        subject TEXT NOT NULL,
        status BIGINT NOT NULL DEFAULT 0,
        channel TEXT,
        created_at TEXT NOT NULL
    )",
];

const TENANT_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status)",
    "CREATE INDEX IF NOT EXISTS idx_tickets_contact ON tickets(contact_id)",
];

/// Create the master registry schema on the provider's master database.
pub async fn initialize_master(provider: &ConnectionProvider) -> Result<()> {
    let master = provider.master().clone();
    initialize(provider, &master, SchemaKind::Master).await
}

/// Create the tenant schema on `database`.
pub async fn initialize_tenant(provider: &ConnectionProvider, database: &DatabaseName) -> Result<()> {
    initialize(provider, database, SchemaKind::Tenant).await
}

/// Create tables and indexes if missing and bring the version up to date.
///
/// Runs in a single transaction, so a failure leaves the database untouched.
pub async fn initialize(
    provider: &ConnectionProvider,
    database: &DatabaseName,
    kind: SchemaKind,
) -> Result<()> {
    provider
        .with_transaction(database, move |conn| {
            Box::pin(async move { apply(conn, kind).await })
        })
        .await?;
    tracing::info!(database = %database, ?kind, version = SCHEMA_VERSION, "Schema ready");
    Ok(())
}

async fn apply(conn: &mut AnyConnection, kind: SchemaKind) -> Result<()> {
    sqlx::query(SCHEMA_VERSION_TABLE)
        .execute(&mut *conn)
        .await
        .sql_context("Failed to create schema_version")?;

    for statement in kind.tables() {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .sql_context(&format!("Schema creation failed - SQL: {statement}"))?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(&mut *conn)
        .await
        .sql_context("Failed to check schema version")?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(&mut *conn)
                .await
                .sql_context("Failed to initialize schema version")?;
        }
        Some((current,)) if current < SCHEMA_VERSION => {
            migrate(conn, kind, current, SCHEMA_VERSION).await?;
        }
        Some((current,)) if current > SCHEMA_VERSION => {
            return Err(ConnectionError::Sql {
                reason: format!(
                    "Database schema v{current} is newer than supported v{SCHEMA_VERSION}"
                ),
                source: None,
            }
            .into());
        }
        Some(_) => {}
    }

    for statement in kind.indexes() {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .sql_context(&format!("Index creation failed - SQL: {statement}"))?;
    }

    Ok(())
}

async fn migrate(conn: &mut AnyConnection, kind: SchemaKind, from: i64, to: i64) -> Result<()> {
    let mut current = from;
    while current < to {
        let next = current + 1;
        tracing::info!(?kind, from = current, to = next, "Running migration");
        run_migration(conn, kind, current, next).await?;

        sqlx::query("UPDATE schema_version SET version = $1")
            .bind(next)
            .execute(&mut *conn)
            .await
            .sql_context(&format!("Failed to update schema version to {next}"))?;
        current = next;
    }
    Ok(())
}

/// Execute a single migration step.
async fn run_migration(
    conn: &mut AnyConnection,
    kind: SchemaKind,
    from: i64,
    to: i64,
) -> Result<()> {
    // No migrations exist yet; the first one becomes a match on (kind, from).
    let _ = conn;
    Err(ConnectionError::Sql {
        reason: format!(
            "Unknown {kind:?} migration path: v{from} to v{to}. \
             SCHEMA_VERSION was incremented without adding a migration."
        ),
        source: None,
    }
    .into())
}

/// Names of the tables in the connected database, sorted.
pub async fn table_names(conn: &mut AnyConnection, sqlite: bool) -> Result<Vec<String>> {
    let sql = if sqlite {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    } else {
        "SELECT CAST(table_name AS TEXT) FROM information_schema.tables \
         WHERE table_schema = current_schema() ORDER BY table_name"
    };
    let rows: Vec<(String,)> = sqlx::query_as(sql)
        .fetch_all(&mut *conn)
        .await
        .sql_context("Failed to list tables")?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}
