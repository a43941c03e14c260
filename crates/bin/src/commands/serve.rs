//! Serve command - runs the Switchboard HTTP server.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};

use switchboard::SessionService;

use crate::api::{AppState, router};
use crate::backend::service_settings;
use crate::cli::ServeArgs;

/// Run the Switchboard server until SIGTERM or SIGINT
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = service_settings(&args.connection, &args.credentials).await?;
    let service = Arc::new(SessionService::open(&settings).await?);

    let app = router(AppState {
        service: Arc::clone(&service),
    });

    // Bind server
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, master = %settings.master_database, "Listening");

    println!("Switchboard listening on http://{local_addr}");
    println!();
    println!("Available endpoints:");
    println!("  POST /login                      - Authenticate and receive a credential");
    println!("  POST /verify-token               - Check a credential");
    println!("  GET  /protected/profile          - Caller identity");
    println!("  GET  /protected/contacts         - Tenant contacts (status, channel, name, limit)");
    println!("  GET  /protected/contacts/active  - Active tenant contacts");
    println!("  GET  /protected/contacts/search  - Contacts by name");
    println!("  GET  /protected/tickets          - Tenant tickets (status, channel, contact_id, limit)");
    println!("  POST /protected/refresh-token    - Issue a fresh credential");
    println!("  POST /protected/logout           - Revoke the presented credential");
    println!("  GET  /debug/tenants|tables|users - Introspection of the caller's tenant");
    println!("  GET  /health                     - Liveness check");
    println!();
    println!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.provider().close().await;
    println!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Failed to install signal handlers ({e}), waiting for Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {e}");
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
    }
}
