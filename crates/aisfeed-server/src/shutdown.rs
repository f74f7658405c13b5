use tokio::sync::watch;
use tracing::{error, info};

/// Wait for SIGTERM or ctrl-c, then tell every task to stop.
pub async fn wait_for_shutdown(tx: watch::Sender<bool>) {
    shutdown_signal().await;
    info!("shutdown signal received");
    tx.send_replace(true);
}

/// Resolves once shutdown is signalled or the sender is gone.
pub async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Listen for SIGTERM (container stop) or ctrl-c.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received"),
                _ = ctrl_c => info!("ctrl-c received"),
            }
        }
        Err(e) => {
            error!(error = %e, "failed to listen for SIGTERM, ctrl-c only");
            ctrl_c.await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
