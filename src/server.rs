use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::observability;
use crate::wire::{self, SlotHandler};

/// How long `serve` waits for open connections after shutdown is requested.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until `shutdown` resolves, then wait up to
/// `drain_timeout` for the open ones to finish. Connections past
/// `max_connections` are closed on accept.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<SlotHandler>,
    max_connections: usize,
    drain_timeout: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let permits = Arc::new(Semaphore::new(max_connections));
    tokio::pin!(shutdown);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("accept error: {e}");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested, no longer accepting");
                break;
            }
        };

        let Ok(permit) = permits.clone().try_acquire_owned() else {
            warn!("connection limit reached, rejecting {peer}");
            metrics::counter!(observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
            continue;
        };

        info!("connection from {peer}");
        metrics::counter!(observability::CONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(observability::CONNECTIONS_ACTIVE).increment(1.0);
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = wire::process_connection(socket, handler).await {
                error!("connection error from {peer}: {e}");
            }
            metrics::gauge!(observability::CONNECTIONS_ACTIVE).decrement(1.0);
            drop(permit);
        });
    }

    // Every permit back means every connection has closed.
    let all = u32::try_from(max_connections).unwrap_or(u32::MAX);
    info!("draining connections");
    match tokio::time::timeout(drain_timeout, permits.acquire_many(all)).await {
        Ok(_) => info!("all connections drained"),
        Err(_) => {
            let open = max_connections - permits.available_permits();
            warn!("drain timed out with {open} connections still open");
        }
    }
}
