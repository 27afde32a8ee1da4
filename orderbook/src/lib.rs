//! Per-symbol central limit order book with price-time priority matching.
//!
//! Core behaviour:
//! - Price-time priority (best price first, then earliest admission)
//! - Partial fills; limit residue rests, market residue is discarded
//! - O(log n) cancellation via a price-level map plus an id index
//! - Queryable best quotes and top-of-book depth snapshots
//!
//! A `Book` is single-owner and not thread-safe; the server confines all
//! books to one matcher task.

pub mod ladder;
pub mod types;

pub use ladder::Ladder;
pub use types::{
    price_to_ticks, ticks_to_price, Order, OrderId, OrderKind, RestingOrder, Side, Trade, TradeId,
    PRICE_SCALE,
};

use serde::Serialize;
use std::collections::HashMap;

/// Best price on one side with the quantity aggregated across every
/// resting order at that price.
#[derive(Clone, Debug, Serialize)]
pub struct QuoteSnapshot {
    pub price: f64,
    pub quantity: u64,
}

/// One price level in a depth snapshot: summed quantity plus the
/// resting order ids in time order.
#[derive(Clone, Debug, Serialize)]
pub struct LevelSnapshot {
    pub price: f64,
    pub quantity: u64,
    pub orders: Vec<OrderId>,
}

/// Consistent top-of-book view, detached from the live book. Consumers
/// hold no references into book internals.
#[derive(Clone, Debug, Serialize)]
pub struct BookSnapshot {
    pub symbol: String,
    /// Best first (highest price).
    pub bids: Vec<LevelSnapshot>,
    /// Best first (lowest price).
    pub asks: Vec<LevelSnapshot>,
    pub best_bid: Option<QuoteSnapshot>,
    pub best_ask: Option<QuoteSnapshot>,
    pub total_volume: u64,
    pub total_trades: u64,
}

/// Aggregate per-book counters for the statistics feed.
#[derive(Clone, Debug, Serialize)]
pub struct BookStats {
    pub symbol: String,
    pub open_orders: usize,
    pub bid_orders: usize,
    pub ask_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub total_volume: u64,
    pub total_trades: u64,
    pub best_bid: Option<QuoteSnapshot>,
    pub best_ask: Option<QuoteSnapshot>,
}

/// Central limit order book for one symbol.
///
/// The book exclusively owns its resting orders and executions. The id
/// index maps every resting order to its side and price level, so a
/// cancel is a level lookup rather than a scan of the whole side. The
/// index and the ladders are mutated together; between operations the
/// index is a bijection onto the resting orders.
pub struct Book {
    symbol: String,
    bids: Ladder,
    asks: Ladder,
    index: HashMap<OrderId, (Side, i64)>,
    /// Executions retained for the lifetime of the book.
    trades: Vec<Trade>,
    total_volume: u64,
    total_trades: u64,
    next_event: u64,
}

impl Book {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: Ladder::new(Side::Buy),
            asks: Ladder::new(Side::Sell),
            index: HashMap::new(),
            trades: Vec::new(),
            total_volume: 0,
            total_trades: 0,
            next_event: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Applies an order, returning executions in the order they
    /// occurred. Matching cannot fail on well-formed input; cancels are
    /// routed through [`Book::cancel`], never here.
    pub fn submit(&mut self, order: Order) -> Vec<Trade> {
        match order.kind {
            OrderKind::Limit => self.apply_limit(order),
            OrderKind::Market => self.apply_market(order),
            OrderKind::Cancel => {
                debug_assert!(false, "cancel routed into submit");
                Vec::new()
            }
        }
    }

    fn apply_limit(&mut self, order: Order) -> Vec<Trade> {
        let Some(limit_px) = order.price_ticks else {
            debug_assert!(false, "limit order without a price reached the book");
            return Vec::new();
        };
        let (remaining, trades) = self.sweep(&order, Some(limit_px));
        if remaining > 0 {
            self.index.insert(order.id.clone(), (order.side, limit_px));
            let side = match order.side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            side.insert(RestingOrder {
                id: order.id,
                client_id: order.client_id,
                side: order.side,
                price_ticks: limit_px,
                quantity: order.quantity,
                remaining,
                submit_seq: order.submit_seq,
            });
        }
        self.record(trades)
    }

    fn apply_market(&mut self, order: Order) -> Vec<Trade> {
        // Unconditional price predicate; any unfilled remainder is
        // discarded, so market orders never leave residue on the book.
        let (_remaining, trades) = self.sweep(&order, None);
        self.record(trades)
    }

    /// Consumes liquidity from the opposite side while the incoming
    /// order still crosses. Returns the unfilled remainder and the
    /// executions, priced at the maker.
    fn sweep(&mut self, taker: &Order, limit_px: Option<i64>) -> (u64, Vec<Trade>) {
        let mut remaining = taker.quantity;
        let mut trades = Vec::new();
        let opposite = match taker.side {
            Side::Buy => &mut self.asks,
            Side::Sell => &mut self.bids,
        };

        while remaining > 0 {
            let Some(maker) = opposite.front_mut() else {
                break;
            };
            let crosses = match (taker.side, limit_px) {
                (_, None) => true,
                (Side::Buy, Some(limit)) => maker.price_ticks <= limit,
                (Side::Sell, Some(limit)) => maker.price_ticks >= limit,
            };
            if !crosses {
                break;
            }

            let fill = remaining.min(maker.remaining);
            maker.remaining -= fill;
            remaining -= fill;
            let maker_id = maker.id.clone();
            let maker_px = maker.price_ticks;
            let exhausted = maker.remaining == 0;

            self.next_event += 1;
            let (buy_order_id, sell_order_id) = match taker.side {
                Side::Buy => (taker.id.clone(), maker_id.clone()),
                Side::Sell => (maker_id.clone(), taker.id.clone()),
            };
            trades.push(Trade {
                id: TradeId::fresh(),
                buy_order_id,
                sell_order_id,
                symbol: self.symbol.clone(),
                quantity: fill,
                price_ticks: maker_px,
                event_seq: self.next_event,
            });

            if exhausted {
                opposite.pop_front_best();
                self.index.remove(&maker_id);
            }
        }

        (remaining, trades)
    }

    fn record(&mut self, trades: Vec<Trade>) -> Vec<Trade> {
        for trade in &trades {
            self.total_volume += trade.quantity;
        }
        self.total_trades += trades.len() as u64;
        self.trades.extend_from_slice(&trades);
        // A crossed book or a desynced index is unrecoverable; die
        // rather than keep matching on corrupt state.
        assert!(self.uncrossed(), "book crossed after submit");
        trades
    }

    /// Removes a resting order regardless of side, discarding its
    /// remaining quantity. Idempotent: unknown ids return `false`.
    pub fn cancel(&mut self, id: &OrderId) -> bool {
        let Some((side, price_ticks)) = self.index.remove(id) else {
            return false;
        };
        let ladder = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let removed = ladder.remove(price_ticks, id);
        assert!(removed.is_some(), "id index out of sync with ladder");
        removed.is_some()
    }

    /// Highest bid with quantity aggregated across the level.
    pub fn best_bid(&self) -> Option<(i64, u64)> {
        self.bids.best()
    }

    /// Lowest ask with quantity aggregated across the level.
    pub fn best_ask(&self) -> Option<(i64, u64)> {
        self.asks.best()
    }

    /// Top `depth` price levels per side.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: Self::side_levels(&self.bids, depth),
            asks: Self::side_levels(&self.asks, depth),
            best_bid: self.best_bid().map(Self::quote),
            best_ask: self.best_ask().map(Self::quote),
            total_volume: self.total_volume,
            total_trades: self.total_trades,
        }
    }

    pub fn stats(&self) -> BookStats {
        BookStats {
            symbol: self.symbol.clone(),
            open_orders: self.index.len(),
            bid_orders: self.bids.order_count(),
            ask_orders: self.asks.order_count(),
            bid_levels: self.bids.level_count(),
            ask_levels: self.asks.level_count(),
            total_volume: self.total_volume,
            total_trades: self.total_trades,
            best_bid: self.best_bid().map(Self::quote),
            best_ask: self.best_ask().map(Self::quote),
        }
    }

    /// Execution history in event order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn total_volume(&self) -> u64 {
        self.total_volume
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    /// Resting orders across both sides.
    pub fn open_orders(&self) -> usize {
        self.index.len()
    }

    /// Looks up a resting order by id.
    pub fn resting(&self, id: &OrderId) -> Option<&RestingOrder> {
        let (side, price_ticks) = self.index.get(id)?;
        let ladder = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        ladder.get(*price_ticks, id)
    }

    pub fn bids(&self) -> &Ladder {
        &self.bids
    }

    pub fn asks(&self) -> &Ladder {
        &self.asks
    }

    fn side_levels(ladder: &Ladder, depth: usize) -> Vec<LevelSnapshot> {
        ladder
            .levels_best_first()
            .take(depth)
            .map(|(px, queue)| LevelSnapshot {
                price: ticks_to_price(px),
                quantity: queue.iter().map(|o| o.remaining).sum(),
                orders: queue.iter().map(|o| o.id.clone()).collect(),
            })
            .collect()
    }

    fn quote((price_ticks, quantity): (i64, u64)) -> QuoteSnapshot {
        QuoteSnapshot {
            price: ticks_to_price(price_ticks),
            quantity,
        }
    }

    fn uncrossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => true,
        }
    }
}
