//! Switchboard server and admin CLI.

mod api;
mod backend;
mod cli;
mod commands;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, TenantCommand, UserCommand};
use crate::output::OutputFormat;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("switchboard=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_flag(cli.json);
    match &cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Init(args) => commands::init::run(args, format).await,
        Commands::Tenant(TenantCommand::Add(args)) => commands::admin::add_tenant(args, format).await,
        Commands::Tenant(TenantCommand::List(args)) => {
            commands::admin::list_tenants(args, format).await
        }
        Commands::User(UserCommand::Add(args)) => commands::admin::add_user(args, format).await,
        Commands::Health(args) => commands::health::run(args, format).await,
    }
}
