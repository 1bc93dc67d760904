use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod announce;
mod bencode;
mod config;
mod control;
mod error;
mod persistence;
mod report;
mod routes;
mod scheduler;
mod scrape;
mod signals;
mod site_client;
mod stats;
mod store;
mod tracker;
mod utils;

use config::Config;
use tracker::Tracker;

/// Announce/scrape/control-plane daemon for a private BitTorrent tracker.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Fork into the background after startup.
    #[arg(long)]
    daemonize: bool,

    /// Path to the INI configuration file.
    #[arg(long, default_value = "config.ini")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false),
        )
        .init();

    if cli.daemonize {
        tracing::warn!(
            "--daemonize is not implemented; run this binary under a process \
             supervisor (systemd, runit) instead of forking"
        );
    }

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;
    let listen_port = config.listen_port;

    let tracker = Tracker::bootstrap(config).await?;

    let scheduler_handle = tokio::spawn({
        let tracker = tracker.clone();
        async move { scheduler::handle(&tracker).await }
    });

    let reload_handle = tokio::spawn({
        let tracker = tracker.clone();
        let config_path = cli.config.clone();
        async move { signals::reload_signals(tracker, config_path).await }
    });

    let app = Router::new()
        .merge(routes::routes())
        .with_state(tracker.clone());

    let addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), listen_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "tracker listening");

    let app = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(signals::shutdown_signal(tracker.clone()))
        .await?;

    scheduler_handle.abort();
    reload_handle.abort();

    tracing::info!("flushing remaining persistence lanes before exit");
    let max_flushes = 10;
    for _ in 0..max_flushes {
        scheduler::flush(&tracker).await;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    tracing::info!("graceful shutdown complete");
    Ok(())
}
