use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use isrv_common::ServerConfig;
use isrv_data::WdiTable;
use isrv_server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load().context("failed to load server configuration")?;
    let table = WdiTable::load(&config.dataset_path)
        .with_context(|| format!("failed to load dataset {}", config.dataset_path.display()))?;

    let server = Server::new(config, Arc::new(table));
    server.start().await.context("failed to start server")?;

    tokio::select! {
        _ = server.stopped() => info!("shutdown requested by a client"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("interrupt received");
            info!("{}", server.shutdown().await);
        }
    }

    server.wait_terminated().await;
    Ok(())
}
