//! Hub daemon: coordinator actor plus HTTP/WebSocket gateway.

use hearth::config::HubConfig;
use hearth::store::StateStore;
use hearth::{coordinator, gateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = HubConfig::load().map_err(|e| anyhow::anyhow!("cannot load config: {e}"))?;
    let state_path = config
        .storage
        .state_path
        .clone()
        .or_else(StateStore::default_state_path);
    if state_path.is_none() {
        tracing::warn!("no data directory available; state will not be persisted");
    }
    let store = StateStore::new(state_path);

    let connections = gateway::Connections::default();
    let (handle, actor) = coordinator::spawn(&config, store, connections.clone());
    let maintenance = coordinator::spawn_maintenance(handle.clone(), config.maintenance.interval_secs);

    let app = gateway::router(handle.clone(), connections);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("hearthd listening on http://{local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for shutdown signal: {e}");
            }
        })
        .await?;

    // Final awaited persist before exit.
    tracing::info!("shutting down");
    maintenance.abort();
    handle
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("coordinator shutdown failed: {e}"))?;
    actor.await?;

    tracing::info!("hearthd shut down cleanly");
    Ok(())
}
