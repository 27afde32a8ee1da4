//! Datagram transport: one bound UDP endpoint shared by a receive task
//! and a send task.
//!
//! The listener decodes each inbound frame, records the source address
//! and routes the order to the matching pipeline; the sender encodes
//! acks and returns them to that exact address. Neither task touches a
//! book. Send failures are logged and discarded (the transport is
//! best-effort).

use crate::engine::{EngineRequest, ReplyTo};
use crate::snapshot::ServerStats;
use crate::wire::{self, Rejection, ResponseFrame, MAX_FRAME_BYTES};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Receive loop. Exits on the shutdown signal or when the matcher has
/// gone away.
pub async fn run_listener(
    socket: Arc<UdpSocket>,
    requests: mpsc::Sender<EngineRequest>,
    egress: mpsc::Sender<(ResponseFrame, SocketAddr)>,
    stats: Arc<ServerStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_FRAME_BYTES];
    info!("listening for order frames");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "recv failed");
                        continue;
                    }
                };
                match wire::decode_frame(&buf[..len]) {
                    Ok(order) => {
                        let request = EngineRequest {
                            order,
                            reply: ReplyTo::Udp(peer),
                        };
                        match requests.try_send(request) {
                            Ok(()) => {}
                            Err(TrySendError::Full(request)) => {
                                // Drop newest with a negative ack; the
                                // listener must never block on the queue.
                                stats.overload_drops.fetch_add(1, Ordering::Relaxed);
                                let rejection = Rejection::overload(Some(request.order.id));
                                let _ = egress.try_send((ResponseFrame::rejected(&rejection), peer));
                            }
                            Err(TrySendError::Closed(_)) => break,
                        }
                    }
                    Err(rejection) => {
                        debug!(%peer, reason = %rejection.reason, "rejected frame");
                        stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
                        let _ = egress.try_send((ResponseFrame::rejected(&rejection), peer));
                    }
                }
            }
        }
    }
    info!("listener stopped");
}

/// Send loop. Drains the egress queue until every producer is gone, so
/// acks for requests already in the matcher still go out during
/// shutdown.
pub async fn run_sender(
    socket: Arc<UdpSocket>,
    mut acks: mpsc::Receiver<(ResponseFrame, SocketAddr)>,
    stats: Arc<ServerStats>,
) {
    while let Some((frame, peer)) = acks.recv().await {
        match serde_json::to_vec(&frame) {
            Ok(payload) => {
                if let Err(e) = socket.send_to(&payload, peer).await {
                    stats.send_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(%peer, error = %e, "failed to send ack");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode ack"),
        }
    }
    info!("sender stopped");
}
