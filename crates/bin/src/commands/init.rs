//! Init command - creates the master schema and every tenant schema.

use switchboard::{registry::TenantResolver, schema};

use crate::backend::open_registry;
use crate::cli::InitArgs;
use crate::output::{OutputFormat, print_json};

/// Run the `init` command
///
/// Safe to repeat: schemas that are already current are left alone.
pub async fn run(args: &InitArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let registry = open_registry(&args.connection).await?;
    let provider = registry.provider();

    let tenants = registry.list_tenants().await?;
    for tenant in &tenants {
        schema::initialize_tenant(provider, &tenant.database).await?;
    }
    provider.close().await;

    match format {
        OutputFormat::Human => {
            println!("Master database:  {}", provider.master());
            println!("Tenant schemas:   {}", tenants.len());
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "master": provider.master(),
            "tenants": tenants.iter().map(|t| &t.database).collect::<Vec<_>>(),
        }))?,
    }
    Ok(())
}
