use std::sync::Arc;

use relaygate::GatewayServer;
use relaygate::config::Config;
use relaygate::proxy::StaticInstanceManager;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    if cfg.instances.is_empty() {
        tracing::warn!("No instances configured, every request will be rejected");
    }
    let manager = Arc::new(StaticInstanceManager::new(
        cfg.instances.clone(),
        cfg.selection,
    ));

    let mut server = GatewayServer::new(&cfg, manager);
    server.listen(&cfg.server.listen_addr).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.shutdown().await;

    Ok(())
}
