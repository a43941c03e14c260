//! CLI argument definitions for the Switchboard binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use switchboard::config::DEFAULT_TTL_MINUTES;

/// Where tenant and master databases live
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// One SQLite file per database inside the data directory (default)
    Sqlite,
    /// Databases on a PostgreSQL server
    Postgres,
    /// Shared in-memory SQLite, lost on exit (for development)
    Memory,
}

/// Switchboard tenant-aware authentication server
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Switchboard: tenant-aware authentication and data routing")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Create the master schema and the schema of every registered tenant
    Init(InitArgs),
    /// Manage registered tenants
    #[command(subcommand)]
    Tenant(TenantCommand),
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Check health of a running Switchboard server
    Health(HealthArgs),
}

/// Connection settings shared by every command that opens databases
#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Database backend to use
    #[arg(short, long, default_value = "sqlite", env = "SWITCHBOARD_BACKEND")]
    pub backend: Backend,

    /// Directory holding one `<name>.db` file per database (sqlite backend)
    #[arg(short = 'D', long, env = "SWITCHBOARD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// PostgreSQL server URL without a database path (required when backend=postgres)
    #[arg(long, env = "SWITCHBOARD_POSTGRES_URL")]
    pub postgres_url: Option<String>,

    /// Name of the master registry database
    #[arg(long, default_value = "ondem_master_rb", env = "SWITCHBOARD_MASTER_DATABASE")]
    pub master_database: String,

    /// Maximum open connections per database
    #[arg(long, default_value_t = 5, env = "SWITCHBOARD_MAX_CONNECTIONS")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection
    #[arg(long, default_value_t = 5, env = "SWITCHBOARD_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: u64,
}

/// Credential signing settings
#[derive(clap::Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Secret used to sign credentials (at least 16 bytes)
    #[arg(long, env = "SWITCHBOARD_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Lifetime of issued credentials in minutes
    #[arg(long, default_value_t = DEFAULT_TTL_MINUTES, env = "SWITCHBOARD_TOKEN_TTL_MINUTES")]
    pub ttl_minutes: u32,
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8000, env = "SWITCHBOARD_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "SWITCHBOARD_HOST")]
    pub host: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    /// Register a tenant and create its schema
    Add(TenantAddArgs),
    /// List registered tenants
    List(TenantListArgs),
}

#[derive(clap::Args, Debug)]
pub struct TenantAddArgs {
    /// Display name of the tenant
    pub name: String,

    /// Database name holding the tenant's data
    pub database: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(clap::Args, Debug)]
pub struct TenantListArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user under an existing tenant
    Add(UserAddArgs),
}

#[derive(clap::Args, Debug)]
pub struct UserAddArgs {
    /// Login name
    pub username: String,

    /// Database name of the tenant the user belongs to
    #[arg(long)]
    pub database: String,

    /// Login secret; stored as an argon2id hash
    #[arg(long, env = "SWITCHBOARD_USER_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server to check
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "SWITCHBOARD_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}
