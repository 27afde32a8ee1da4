//! UDP matching server: price-time-priority matching engine behind a
//! connectionless order-entry endpoint, with a REST/WebSocket read
//! façade.
//!
//! One matcher task owns every book; listener and sender tasks own the
//! socket; bounded queues decouple the two so the matcher never blocks
//! on I/O.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod engine;
mod snapshot;
mod udp;
mod wire;

use api::ApiState;
use engine::Engine;
use snapshot::{ServerStats, SnapshotStore};

#[derive(Parser, Debug)]
#[command(name = "match-server", about = "UDP matching engine with a REST read façade")]
struct Config {
    /// Bind address for both endpoints
    #[arg(long, default_value = "127.0.0.1", env = "MATCH_HOST")]
    host: String,
    /// UDP port for order entry
    #[arg(long, default_value_t = 8888, env = "MATCH_PORT")]
    port: u16,
    /// TCP port for the REST/WebSocket façade
    #[arg(long, default_value_t = 8080, env = "MATCH_HTTP_PORT")]
    http_port: u16,
    /// Request queue capacity; overflow is dropped with an overload ack
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,
    /// Egress (ack) queue capacity
    #[arg(long, default_value_t = 1024)]
    egress_capacity: usize,
    /// Price levels per side published in snapshots
    #[arg(long, default_value_t = 20)]
    depth: usize,
    /// Seconds between top-of-book log lines
    #[arg(long, default_value_t = 5)]
    snapshot_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let socket = Arc::new(
        UdpSocket::bind((config.host.as_str(), config.port))
            .await
            .context("bind UDP order endpoint")?,
    );
    info!(addr = %socket.local_addr()?, "order endpoint ready");

    let snapshots = Arc::new(SnapshotStore::default());
    let stats = Arc::new(ServerStats::new());
    let (trade_feed, _) = broadcast::channel(1024);
    let (req_tx, req_rx) = mpsc::channel(config.queue_capacity);
    let (egress_tx, egress_rx) = mpsc::channel(config.egress_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let matcher = tokio::spawn(
        Engine::new(
            config.depth,
            snapshots.clone(),
            stats.clone(),
            trade_feed.clone(),
            egress_tx.clone(),
        )
        .run(req_rx),
    );
    let listener = tokio::spawn(udp::run_listener(
        socket.clone(),
        req_tx.clone(),
        egress_tx.clone(),
        stats.clone(),
        shutdown_rx.clone(),
    ));
    let sender = tokio::spawn(udp::run_sender(socket.clone(), egress_rx, stats.clone()));
    let logger = tokio::spawn(snapshot::run_logger(
        snapshots.clone(),
        stats.clone(),
        Duration::from_secs(config.snapshot_interval.max(1)),
        shutdown_rx.clone(),
    ));

    let http = TcpListener::bind((config.host.as_str(), config.http_port))
        .await
        .context("bind HTTP façade")?;
    info!(addr = %http.local_addr()?, "REST façade ready");
    let api_state = ApiState {
        snapshots: snapshots.clone(),
        stats: stats.clone(),
        requests: req_tx.clone(),
        trade_feed: trade_feed.clone(),
    };
    let mut http_shutdown = shutdown_rx.clone();
    let api_server = tokio::spawn(async move {
        axum::serve(http, api::router(api_state))
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("install ctrl-c handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Stop intake first; the matcher drains whatever is already queued
    // once every request sender is gone, then the ack sender finishes.
    let grace = Duration::from_secs(5);
    let _ = timeout(grace, listener).await;
    let _ = timeout(grace, api_server).await;
    drop(req_tx);
    drop(egress_tx);
    let _ = timeout(grace, matcher).await;
    let _ = timeout(grace, sender).await;
    let _ = timeout(grace, logger).await;
    info!("shutdown complete");
    Ok(())
}
