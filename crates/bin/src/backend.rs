//! Turning command-line arguments into library settings.

use std::path::PathBuf;
use std::sync::Arc;

use switchboard::{
    DatabaseName, Settings,
    config::{ConnectionSettings, ConnectionTarget, CredentialSettings},
    pool::ConnectionProvider,
    registry::MasterRegistry,
    schema,
};

use crate::cli::{Backend, ConnectionArgs, CredentialArgs};

/// Build the connection target and pool sizing from `args`.
///
/// Creates the data directory for the sqlite backend.
pub async fn connection_settings(
    args: &ConnectionArgs,
) -> Result<ConnectionSettings, Box<dyn std::error::Error>> {
    let target = match args.backend {
        Backend::Sqlite => {
            let dir = args.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
            tokio::fs::create_dir_all(&dir).await?;
            ConnectionTarget::SqliteDir { dir }
        }
        Backend::Postgres => {
            let url = args.postgres_url.clone().ok_or(
                "PostgreSQL backend requires --postgres-url or SWITCHBOARD_POSTGRES_URL",
            )?;
            ConnectionTarget::Postgres { url }
        }
        Backend::Memory => ConnectionTarget::SqliteMemory {
            namespace: format!("switchboard{}", std::process::id()),
        },
    };
    tracing::info!("Using {}", target.redacted());

    let mut settings = ConnectionSettings::new(target);
    settings.max_connections = args.max_connections;
    settings.acquire_timeout_secs = args.acquire_timeout;
    settings.validate()?;
    Ok(settings)
}

/// Full service settings for the server.
pub async fn service_settings(
    connection: &ConnectionArgs,
    credentials: &CredentialArgs,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut signing = CredentialSettings::new(credentials.secret_key.clone());
    signing.ttl_minutes = credentials.ttl_minutes;

    let settings = Settings {
        master_database: DatabaseName::parse(&connection.master_database)?,
        credentials: signing,
        connection: connection_settings(connection).await?,
    };
    settings.validate()?;
    Ok(settings)
}

/// Open the master registry for admin commands, creating its schema if needed.
///
/// Admin commands never sign credentials, so no secret is required.
pub async fn open_registry(
    args: &ConnectionArgs,
) -> Result<MasterRegistry, Box<dyn std::error::Error>> {
    let master = DatabaseName::parse(&args.master_database)?;
    let provider = ConnectionProvider::new(connection_settings(args).await?, master)?;
    let provider = Arc::new(provider);
    schema::initialize_master(&provider).await?;
    Ok(MasterRegistry::new(provider))
}
