//! Signal handling for graceful shutdown
//!
//! Ctrl-C (and SIGTERM on unix) stops dispatch of new tasks; tasks already
//! claimed by a worker finish normally.

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::pool::ShutdownHandle;

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                return;
            }
            Err(e) => warn!("Cannot install SIGTERM handler: {}", e),
        }
    }
    std::future::pending::<()>().await
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Cannot install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await
    }
}

/// Spawn a task that closes the queue on the first shutdown signal
///
/// Abort the returned handle once the run is over.
pub fn install_shutdown_handler(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c() => info!("Received Ctrl+C, finishing in-flight tasks"),
            _ = terminate() => info!("Received terminate signal, finishing in-flight tasks"),
        }
        handle.shutdown().await;
    })
}
