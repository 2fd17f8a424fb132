//! Turns process interrupts into run cancellation.

use super::CancellationToken;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Spawns a task that cancels `token` on the first SIGINT or SIGTERM.
///
/// Later interrupts are logged and otherwise ignored, so they cannot cut
/// Teardown short. Abort the returned handle once the run is over.
pub fn spawn_signal_listener(token: Arc<CancellationToken>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = wait_for_interrupt().await {
            if token.is_cancelled() {
                warn!(signal, "Interrupt ignored; waiting for teardown to finish");
            } else {
                warn!(signal, "Interrupt received; cancelling run, teardown will still run");
                token.cancel(format!("received {signal}"));
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_interrupt() -> Option<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        received = ctrl_c() => received,
        _ = terminate.recv() => Some("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> Option<&'static str> {
    ctrl_c().await
}

async fn ctrl_c() -> Option<&'static str> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some("SIGINT"),
        Err(e) => {
            error!("Failed to install SIGINT handler: {}", e);
            std::future::pending().await
        }
    }
}
