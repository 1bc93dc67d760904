//! Signal handling (§5): terminate is two-phase (first signal drains,
//! second exits uncleanly), hangup reloads configuration, user1 reloads the
//! in-memory store from the database.

use std::sync::Arc;

use tracing::{info, warn};

use crate::tracker::status::Status;
use crate::tracker::Tracker;

/// Awaits ctrl-c or SIGTERM. On the first hit, flips the tracker to
/// `Closing` so new announces are rejected, then returns — letting the
/// caller (axum's graceful shutdown) start draining in-flight requests. A
/// second hit, watched for in the background from that point on, exits the
/// process immediately without waiting for the drain to finish.
pub async fn shutdown_signal(tracker: Arc<Tracker>) {
    wait_for_terminate_or_interrupt().await;

    info!("terminate signal received, draining before shutdown");
    tracker.status.set(Status::Closing);

    tokio::spawn(async {
        wait_for_terminate_or_interrupt().await;
        warn!("second terminate signal received, exiting uncleanly");
        std::process::exit(1);
    });
}

async fn wait_for_terminate_or_interrupt() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Runs for the lifetime of the process, reloading configuration on SIGHUP
/// and reloading the in-memory store from the database on SIGUSR1. No-op on
/// non-unix targets since neither signal exists there.
#[cfg(unix)]
pub async fn reload_signals(tracker: Arc<Tracker>, config_path: String) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut user1 = signal(SignalKind::user_defined1()).expect("failed to install SIGUSR1 handler");

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                match crate::config::Config::from_file(&config_path) {
                    Ok(config) => {
                        tracker.live.announce_interval.store(Arc::new(config.announce_interval));
                        info!("configuration reloaded");
                    }
                    Err(err) => warn!(%err, "failed to reload configuration"),
                }
            }
            _ = user1.recv() => {
                info!("SIGUSR1 received, reloading store from the database");
                if let Err(err) = crate::store::load_all(&tracker).await {
                    warn!(%err, "failed to reload store");
                }
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_signals(_tracker: Arc<Tracker>, _config_path: String) {
    std::future::pending::<()>().await
}
