//! Published read state: per-symbol snapshots and server-wide counters.
//!
//! The matcher publishes a complete snapshot after each applied request
//! (publish-only-complete-state); readers here never see a book
//! mid-mutation and never hold references into the live books.

use dashmap::DashMap;
use orderbook::{BookSnapshot, BookStats};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Concurrent store of the latest published view per symbol.
#[derive(Default)]
pub struct SnapshotStore {
    books: DashMap<String, PublishedBook>,
}

struct PublishedBook {
    snapshot: BookSnapshot,
    stats: BookStats,
}

impl SnapshotStore {
    /// Replaces the published view for one symbol. Matcher-only.
    pub fn publish(&self, snapshot: BookSnapshot, stats: BookStats) {
        self.books
            .insert(snapshot.symbol.clone(), PublishedBook { snapshot, stats });
    }

    pub fn snapshot(&self, symbol: &str) -> Option<BookSnapshot> {
        self.books.get(symbol).map(|b| b.snapshot.clone())
    }

    /// All published snapshots, keyed by symbol.
    pub fn all_snapshots(&self) -> BTreeMap<String, BookSnapshot> {
        self.books
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot.clone()))
            .collect()
    }

    pub fn all_stats(&self) -> BTreeMap<String, BookStats> {
        self.books
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats.clone()))
            .collect()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }
}

/// Server-wide counters. Written by the matcher and the I/O tasks,
/// read by the statistics endpoint and the snapshot logger.
pub struct ServerStats {
    started: Instant,
    pub orders_processed: AtomicU64,
    pub trades_executed: AtomicU64,
    pub volume_traded: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub overload_drops: AtomicU64,
    pub acks_dropped: AtomicU64,
    pub send_failures: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            orders_processed: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            volume_traded: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            overload_drops: AtomicU64::new(0),
            acks_dropped: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Orders per second since process start.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.uptime().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.orders_processed.load(Ordering::Relaxed) as f64 / elapsed
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate report served by `GET /statistics` and logged on
/// shutdown.
#[derive(Debug, Serialize)]
pub struct StatisticsReport {
    pub uptime_seconds: f64,
    pub total_orders_processed: u64,
    pub current_throughput: f64,
    pub total_trades: u64,
    pub total_volume: u64,
    pub rejected_requests: u64,
    pub overload_drops: u64,
    pub order_books: BTreeMap<String, BookStats>,
}

pub fn statistics(stats: &ServerStats, store: &SnapshotStore) -> StatisticsReport {
    let order_books = store.all_stats();
    StatisticsReport {
        uptime_seconds: stats.uptime().as_secs_f64(),
        total_orders_processed: stats.orders_processed.load(Ordering::Relaxed),
        current_throughput: stats.throughput(),
        total_trades: stats.trades_executed.load(Ordering::Relaxed),
        total_volume: stats.volume_traded.load(Ordering::Relaxed),
        rejected_requests: stats.rejected_requests.load(Ordering::Relaxed),
        overload_drops: stats.overload_drops.load(Ordering::Relaxed),
        order_books,
    }
}

/// Periodic top-of-book and totals log line. Reads published state
/// only; never touches the matcher.
pub async fn run_logger(
    store: Arc<SnapshotStore>,
    stats: Arc<ServerStats>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // first tick fires immediately; skip it so startup logs stay clean
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                for (symbol, book) in store.all_stats() {
                    info!(
                        %symbol,
                        best_bid = ?book.best_bid.as_ref().map(|q| q.price),
                        best_ask = ?book.best_ask.as_ref().map(|q| q.price),
                        open_orders = book.open_orders,
                        trades = book.total_trades,
                        volume = book.total_volume,
                        "top of book"
                    );
                }
                info!(
                    orders = stats.orders_processed.load(Ordering::Relaxed),
                    orders_per_sec = stats.throughput(),
                    "server totals"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook::{Book, Order, OrderId, OrderKind, Side};

    fn seed_book() -> Book {
        let mut book = Book::new("AAPL");
        book.submit(Order {
            id: OrderId::from("B1"),
            client_id: "c1".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            quantity: 10,
            price_ticks: Some(1_500_000),
            submit_seq: 1,
        });
        book
    }

    #[test]
    fn publish_replaces_previous_view() {
        let store = SnapshotStore::default();
        let mut book = seed_book();
        store.publish(book.snapshot(10), book.stats());
        assert_eq!(store.symbols(), vec!["AAPL".to_string()]);

        book.cancel(&OrderId::from("B1"));
        store.publish(book.snapshot(10), book.stats());

        let snap = store.snapshot("AAPL").expect("published");
        assert!(snap.best_bid.is_none());
        assert!(store.snapshot("TSLA").is_none());
    }

    #[test]
    fn statistics_reports_published_books() {
        let store = SnapshotStore::default();
        let stats = ServerStats::new();
        let book = seed_book();
        store.publish(book.snapshot(10), book.stats());
        stats.orders_processed.fetch_add(1, Ordering::Relaxed);

        let report = statistics(&stats, &store);
        assert_eq!(report.total_orders_processed, 1);
        assert_eq!(report.order_books.len(), 1);
        assert_eq!(report.order_books["AAPL"].open_orders, 1);
    }
}
