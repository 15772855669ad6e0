use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resolve once SIGINT or SIGTERM arrives.
///
/// If a handler cannot be installed the corresponding signal is ignored and
/// the other one is still awaited.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT (Ctrl+C), initiating shutdown"),
            Err(err) => {
                error!("Failed to listen for SIGINT: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating shutdown");
            }
            Err(err) => {
                error!("Failed to create SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Cancel `token` when a shutdown signal arrives or when it is cancelled
/// from elsewhere, whichever comes first.
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        () = wait_for_signal() => token.cancel(),
        () = token.cancelled() => {}
    }
}
