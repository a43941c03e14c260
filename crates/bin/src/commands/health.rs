//! Health check command - checks a running Switchboard server.

use std::time::Duration;

use crate::cli::HealthArgs;
use crate::output::{OutputFormat, print_json};

/// Probe URL for a server base URL; a URL already ending in `/health` is kept.
pub fn health_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    }
}

/// Run the health check command
///
/// Fails unless the server answers 200 with `{"status":"healthy"}`.
pub async fn run(args: &HealthArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let url = health_url(&args.url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("unhealthy: failed to connect to {url}: {e}"))?;
    if !response.status().is_success() {
        return Err(format!("unhealthy: server returned HTTP status {}", response.status()).into());
    }

    let body: serde_json::Value = response.json().await?;
    match body.get("status").and_then(|s| s.as_str()) {
        Some("healthy") => {
            match format {
                OutputFormat::Human => println!("healthy: {url}"),
                OutputFormat::Json => print_json(&body)?,
            }
            Ok(())
        }
        status => Err(format!("unhealthy: server reported status {}", status.unwrap_or("<missing>")).into()),
    }
}
