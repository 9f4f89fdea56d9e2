use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use slotkeeper::config::Config;
use slotkeeper::engine::Engine;
use slotkeeper::store::LedgerStore;
use slotkeeper::wire::SlotHandler;
use slotkeeper::{compactor, observability, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_tracing();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(LedgerStore::open(config.wal_path())?);
    let engine = Arc::new(Engine::over(store.clone(), config.engine.clone()));
    let handler = Arc::new(SlotHandler::new(engine, store.clone()));

    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold).await;
    });

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("slotkeeper listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {}", config.max_connections);
    info!(
        "  business hours: {:02}:00-{:02}:00, horizon {} days",
        config.engine.business_hours.open_hour,
        config.engine.business_hours.close_hour,
        config.engine.horizon_days
    );
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    };

    server::serve(listener, handler, config.max_connections, server::DRAIN_TIMEOUT, shutdown).await;

    if let Err(e) = store.compact_wal().await {
        tracing::error!("final WAL compaction failed: {e}");
    }
    info!("slotkeeper stopped");
    Ok(())
}
