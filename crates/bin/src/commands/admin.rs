//! Tenant and user administration commands.

use switchboard::{DatabaseName, registry::TenantResolver, schema, secret::Argon2Verifier};

use crate::backend::open_registry;
use crate::cli::{TenantAddArgs, TenantListArgs, UserAddArgs};
use crate::output::{OutputFormat, print_json, print_table};

/// Run the `tenant add` command
pub async fn add_tenant(
    args: &TenantAddArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = DatabaseName::parse(&args.database)?;
    let registry = open_registry(&args.connection).await?;

    let tenant = registry.register_tenant(&args.name, &database).await?;
    schema::initialize_tenant(registry.provider(), &tenant.database).await?;
    registry.provider().close().await;

    match format {
        OutputFormat::Human => println!(
            "Registered tenant '{}' as client {} in {}",
            tenant.name, tenant.client_id, tenant.database
        ),
        OutputFormat::Json => print_json(&tenant)?,
    }
    Ok(())
}

/// Run the `tenant list` command
pub async fn list_tenants(
    args: &TenantListArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(&args.connection).await?;
    let tenants = registry.list_tenants().await?;
    registry.provider().close().await;

    match format {
        OutputFormat::Human => {
            if tenants.is_empty() {
                println!("No tenants registered.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = tenants
                .iter()
                .map(|t| {
                    vec![
                        t.client_id.to_string(),
                        t.name.clone(),
                        t.database.to_string(),
                    ]
                })
                .collect();
            print_table(&["CLIENT ID", "NAME", "DATABASE"], &rows);
        }
        OutputFormat::Json => print_json(&tenants)?,
    }
    Ok(())
}

/// Run the `user add` command
pub async fn add_user(
    args: &UserAddArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let database = DatabaseName::parse(&args.database)?;
    let registry = open_registry(&args.connection).await?;
    let verifier = Argon2Verifier::new()?;

    let profile = registry
        .register_user(&args.username, &args.password, &database, &verifier)
        .await?;
    registry.provider().close().await;

    match format {
        OutputFormat::Human => println!(
            "Registered user '{}' for client {} in {}",
            profile.username, profile.client_id, profile.tenant
        ),
        OutputFormat::Json => print_json(&profile)?,
    }
    Ok(())
}
