//! Matching pipeline: a single matcher task that exclusively owns the
//! symbol registry and every book.
//!
//! Requests arrive over a bounded FIFO and are applied in pop order,
//! which defines the linearization order of the engine. The matcher
//! performs no I/O: acks go out through a bounded egress queue
//! (try-send, never blocking) or a local oneshot for in-process
//! submitters, and read state is published to the snapshot store after
//! every request.

use crate::snapshot::{ServerStats, SnapshotStore};
use crate::wire::ResponseFrame;
use orderbook::{Book, Order, OrderKind, Trade};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

/// Where the acknowledgement for a request is delivered.
pub enum ReplyTo {
    /// Datagram client; the egress task sends to this exact address.
    Udp(SocketAddr),
    /// In-process submitter (REST façade, tests).
    Local(oneshot::Sender<ResponseFrame>),
}

/// One unit of work for the matcher.
pub struct EngineRequest {
    pub order: Order,
    pub reply: ReplyTo,
}

/// Execution event published to stream consumers.
#[derive(Clone, Debug, Serialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub trade: Trade,
}

pub struct Engine {
    books: HashMap<String, Book>,
    admission_seq: u64,
    /// Price levels per side included in published snapshots.
    depth: usize,
    snapshots: Arc<SnapshotStore>,
    stats: Arc<ServerStats>,
    trade_feed: broadcast::Sender<TradeEvent>,
    egress: mpsc::Sender<(ResponseFrame, SocketAddr)>,
    last_throughput_log: Instant,
    orders_since_log: u64,
}

impl Engine {
    pub fn new(
        depth: usize,
        snapshots: Arc<SnapshotStore>,
        stats: Arc<ServerStats>,
        trade_feed: broadcast::Sender<TradeEvent>,
        egress: mpsc::Sender<(ResponseFrame, SocketAddr)>,
    ) -> Self {
        Self {
            books: HashMap::new(),
            admission_seq: 0,
            depth,
            snapshots,
            stats,
            trade_feed,
            egress,
            last_throughput_log: Instant::now(),
            orders_since_log: 0,
        }
    }

    /// Drains the request queue until every sender is gone, then
    /// publishes a final snapshot. This task is the only writer of the
    /// registry and the books.
    pub async fn run(mut self, mut requests: mpsc::Receiver<EngineRequest>) {
        info!("matcher started");
        while let Some(request) = requests.recv().await {
            self.apply(request);
        }
        self.publish_all();
        info!(
            orders = self.stats.orders_processed.load(Ordering::Relaxed),
            books = self.books.len(),
            "matcher drained, final snapshot published"
        );
    }

    fn apply(&mut self, request: EngineRequest) {
        let EngineRequest { mut order, reply } = request;
        // Admission tick: application order is priority order by
        // construction, independent of clock granularity.
        self.admission_seq += 1;
        order.submit_seq = self.admission_seq;

        let symbol = order.symbol.clone();
        let frame = match order.kind {
            OrderKind::Cancel => self.apply_cancel(order),
            OrderKind::Limit | OrderKind::Market => self.apply_order(order),
        };
        self.publish(&symbol);

        self.stats.orders_processed.fetch_add(1, Ordering::Relaxed);
        self.orders_since_log += 1;
        self.maybe_log_throughput();

        self.dispatch(frame, reply);
    }

    fn apply_cancel(&mut self, order: Order) -> ResponseFrame {
        let removed = self
            .books
            .get_mut(&order.symbol)
            .map(|book| book.cancel(&order.id))
            .unwrap_or(false);
        // Cancelling an unknown id is a non-error; the ack is positive
        // either way so retried cancels stay idempotent.
        let message = if removed { "cancelled" } else { "not found" };
        ResponseFrame::ack(Some(order.id), message, &[])
    }

    fn apply_order(&mut self, order: Order) -> ResponseFrame {
        let book = self.books.entry(order.symbol.clone()).or_insert_with(|| {
            info!(symbol = %order.symbol, "admitting new symbol");
            Book::new(order.symbol.clone())
        });

        // An order id must be unique across both sides of the book;
        // reusing a resting id would desync the cancel index.
        if book.resting(&order.id).is_some() {
            return ResponseFrame::failure(Some(order.id), "duplicate order_id");
        }

        let order_id = order.id.clone();
        let kind = order.kind;
        let quantity = order.quantity;
        let trades = book.submit(order);

        let filled: u64 = trades.iter().map(|t| t.quantity).sum();
        self.stats
            .trades_executed
            .fetch_add(trades.len() as u64, Ordering::Relaxed);
        self.stats.volume_traded.fetch_add(filled, Ordering::Relaxed);

        for trade in &trades {
            // no subscribers is fine; the feed is best-effort
            let _ = self.trade_feed.send(TradeEvent {
                symbol: trade.symbol.clone(),
                trade: trade.clone(),
            });
        }

        let message = if trades.is_empty() {
            match kind {
                OrderKind::Market => "no liquidity, order discarded".to_string(),
                _ => "accepted".to_string(),
            }
        } else if kind == OrderKind::Market && filled < quantity {
            format!(
                "executed {} trade(s), unfilled {} discarded",
                trades.len(),
                quantity - filled
            )
        } else {
            format!("executed {} trade(s)", trades.len())
        };

        ResponseFrame::ack(Some(order_id), message, &trades)
    }

    fn dispatch(&self, frame: ResponseFrame, reply: ReplyTo) {
        match reply {
            ReplyTo::Udp(addr) => {
                // Never block the matcher on egress. The transport is
                // best-effort; a full queue drops the ack.
                if self.egress.try_send((frame, addr)).is_err() {
                    self.stats.acks_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(peer = %addr, "egress queue full, ack dropped");
                }
            }
            ReplyTo::Local(tx) => {
                let _ = tx.send(frame);
            }
        }
    }

    fn publish(&self, symbol: &str) {
        if let Some(book) = self.books.get(symbol) {
            self.snapshots.publish(book.snapshot(self.depth), book.stats());
        }
    }

    fn publish_all(&self) {
        for book in self.books.values() {
            self.snapshots.publish(book.snapshot(self.depth), book.stats());
        }
    }

    fn maybe_log_throughput(&mut self) {
        let elapsed = self.last_throughput_log.elapsed();
        if elapsed.as_secs_f64() >= 1.0 {
            let rate = self.orders_since_log as f64 / elapsed.as_secs_f64();
            info!(
                orders_per_sec = rate,
                total = self.stats.orders_processed.load(Ordering::Relaxed),
                "throughput"
            );
            self.last_throughput_log = Instant::now();
            self.orders_since_log = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode_frame, RequestFrame, validate};
    use orderbook::OrderId;
    use tokio::sync::{broadcast, mpsc, oneshot};

    struct Harness {
        requests: mpsc::Sender<EngineRequest>,
        snapshots: Arc<SnapshotStore>,
        stats: Arc<ServerStats>,
        trade_feed: broadcast::Sender<TradeEvent>,
    }

    fn spawn_engine() -> Harness {
        let snapshots = Arc::new(SnapshotStore::default());
        let stats = Arc::new(ServerStats::new());
        let (trade_feed, _) = broadcast::channel(64);
        let (egress_tx, _egress_rx) = mpsc::channel(64);
        let (req_tx, req_rx) = mpsc::channel(64);

        let engine = Engine::new(
            10,
            snapshots.clone(),
            stats.clone(),
            trade_feed.clone(),
            egress_tx,
        );
        tokio::spawn(engine.run(req_rx));

        Harness {
            requests: req_tx,
            snapshots,
            stats,
            trade_feed,
        }
    }

    async fn submit(harness: &Harness, json: &str) -> ResponseFrame {
        let order = decode_frame(json.as_bytes()).expect("valid frame");
        let (tx, rx) = oneshot::channel();
        harness
            .requests
            .send(EngineRequest {
                order,
                reply: ReplyTo::Local(tx),
            })
            .await
            .expect("engine alive");
        rx.await.expect("ack delivered")
    }

    #[tokio::test]
    async fn limit_order_rests_and_is_acked() {
        let harness = spawn_engine();
        let ack = submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"LIMIT","quantity":10,"price":150.0}"#,
        )
        .await;

        assert!(ack.success);
        assert_eq!(ack.message, "accepted");
        assert_eq!(ack.order_id, Some(OrderId::from("B1")));
        assert!(ack.trades.is_empty());

        let snap = harness.snapshots.snapshot("AAPL").expect("published");
        assert_eq!(snap.best_bid.as_ref().map(|q| q.quantity), Some(10));
    }

    #[tokio::test]
    async fn crossing_orders_ack_with_trades() {
        let harness = spawn_engine();
        let mut feed = harness.trade_feed.subscribe();
        submit(
            &harness,
            r#"{"order_id":"S1","client_id":"c1","symbol":"AAPL","side":"SELL","order_type":"LIMIT","quantity":50,"price":150.0}"#,
        )
        .await;
        let ack = submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c2","symbol":"AAPL","side":"BUY","order_type":"LIMIT","quantity":50,"price":150.0}"#,
        )
        .await;

        assert!(ack.success);
        assert_eq!(ack.trades.len(), 1);
        assert_eq!(ack.trades[0].quantity, 50);
        assert!((ack.trades[0].price - 150.0).abs() < 1e-9);

        let event = feed.recv().await.expect("trade broadcast");
        assert_eq!(event.symbol, "AAPL");
        assert_eq!(event.trade.quantity, 50);

        let snap = harness.snapshots.snapshot("AAPL").expect("published");
        assert!(snap.best_bid.is_none());
        assert!(snap.best_ask.is_none());
        assert_eq!(snap.total_trades, 1);
        assert_eq!(harness.stats.volume_traded.load(Ordering::Relaxed), 50);
    }

    #[tokio::test]
    async fn market_residue_is_reported_and_discarded() {
        let harness = spawn_engine();
        submit(
            &harness,
            r#"{"order_id":"S1","client_id":"c1","symbol":"AAPL","side":"SELL","order_type":"LIMIT","quantity":5,"price":150.0}"#,
        )
        .await;
        let ack = submit(
            &harness,
            r#"{"order_id":"M1","client_id":"c2","symbol":"AAPL","side":"BUY","order_type":"MARKET","quantity":20}"#,
        )
        .await;

        assert!(ack.success);
        assert_eq!(ack.trades.len(), 1);
        assert_eq!(ack.trades[0].quantity, 5);
        assert_eq!(ack.message, "executed 1 trade(s), unfilled 15 discarded");

        let snap = harness.snapshots.snapshot("AAPL").expect("published");
        assert!(snap.best_bid.is_none());
        assert!(snap.best_ask.is_none());
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_positive_not_found() {
        let harness = spawn_engine();
        let ack = submit(
            &harness,
            r#"{"order_id":"nope","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"CANCEL"}"#,
        )
        .await;

        assert!(ack.success);
        assert_eq!(ack.message, "not found");
        assert!(ack.trades.is_empty());
    }

    #[tokio::test]
    async fn cancel_removes_resting_order() {
        let harness = spawn_engine();
        submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"LIMIT","quantity":10,"price":100.0}"#,
        )
        .await;
        let ack = submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"CANCEL"}"#,
        )
        .await;
        assert_eq!(ack.message, "cancelled");

        let snap = harness.snapshots.snapshot("AAPL").expect("published");
        assert!(snap.best_bid.is_none());

        // no crossing after the cancel
        let ack = submit(
            &harness,
            r#"{"order_id":"S1","client_id":"c2","symbol":"AAPL","side":"SELL","order_type":"LIMIT","quantity":10,"price":100.0}"#,
        )
        .await;
        assert!(ack.trades.is_empty());
    }

    #[tokio::test]
    async fn duplicate_resting_order_id_is_refused() {
        let harness = spawn_engine();
        submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"LIMIT","quantity":10,"price":100.0}"#,
        )
        .await;
        let ack = submit(
            &harness,
            r#"{"order_id":"B1","client_id":"c1","symbol":"AAPL","side":"BUY","order_type":"LIMIT","quantity":10,"price":101.0}"#,
        )
        .await;

        assert!(!ack.success);
        assert_eq!(ack.message, "duplicate order_id");

        // the original order is untouched
        let snap = harness.snapshots.snapshot("AAPL").expect("published");
        assert!((snap.best_bid.as_ref().expect("bid").price - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn symbols_are_admitted_on_first_sight() {
        let harness = spawn_engine();
        submit(
            &harness,
            r#"{"client_id":"c1","symbol":"TSLA","side":"BUY","order_type":"LIMIT","quantity":1,"price":10.0}"#,
        )
        .await;
        submit(
            &harness,
            r#"{"client_id":"c1","symbol":"NVDA","side":"SELL","order_type":"LIMIT","quantity":1,"price":10.0}"#,
        )
        .await;

        assert_eq!(
            harness.snapshots.symbols(),
            vec!["NVDA".to_string(), "TSLA".to_string()]
        );
    }

    #[test]
    fn rest_frames_reuse_wire_validation() {
        // the REST façade funnels through the same validator
        let frame = RequestFrame {
            client_id: Some("c1".to_string()),
            symbol: Some("AAPL".to_string()),
            side: Some("BUY".to_string()),
            order_type: Some("LIMIT".to_string()),
            quantity: Some(5),
            price: Some(150.0),
            ..Default::default()
        };
        assert!(validate(frame).is_ok());
    }
}
