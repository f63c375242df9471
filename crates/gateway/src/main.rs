//! Gateway entry point: configuration, rehydration, HTTP serving and
//! graceful shutdown.

use std::sync::Arc;

use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use rmsg_gateway::{router, AppState, GatewayConfig};
use rmsg_session_core::{CredentialStore, SessionConfig, SessionManager};
use rmsg_transport::MemoryTransportFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let session_config = SessionConfig::from_env();
    let gateway_config = GatewayConfig::from_env();

    let store = Arc::new(CredentialStore::new(session_config.sessions_dir.clone()));
    // In-memory transport backend; a wire-protocol adapter slots in behind
    // `TransportFactory` without touching the gateway.
    let factory = Arc::new(MemoryTransportFactory::new());
    let manager = SessionManager::new(session_config, store, factory);

    let restored = manager.restore_persisted().await?;
    info!(restored, "startup rehydration complete");

    let addr = gateway_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");

    let app = router(AppState { manager: Arc::clone(&manager) });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
