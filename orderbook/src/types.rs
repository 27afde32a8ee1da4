use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ticks per unit of price. 10_000 keeps four decimal places exact,
/// which covers equity-style quotes without float drift inside the book.
pub const PRICE_SCALE: f64 = 10_000.0;

/// Converts a wire price into integer ticks.
///
/// Returns `None` for non-finite, non-positive, or out-of-range values;
/// those are rejected at ingress before they reach a book.
pub fn price_to_ticks(price: f64) -> Option<i64> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let ticks = (price * PRICE_SCALE).round();
    if ticks < 1.0 || ticks > i64::MAX as f64 {
        return None;
    }
    Some(ticks as i64)
}

/// Converts integer ticks back into a wire price.
pub fn ticks_to_price(ticks: i64) -> f64 {
    ticks as f64 / PRICE_SCALE
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Limit,
    Market,
    Cancel,
}

/// Opaque order identifier. Clients may supply their own; the server
/// assigns a fresh UUID string when the field is absent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn fresh() -> Self {
        OrderId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        OrderId(s.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub fn fresh() -> Self {
        TradeId(Uuid::new_v4())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An admitted request, immutable once constructed.
///
/// `submit_seq` is the matcher's admission tick, assigned at dequeue.
/// It is a plain counter, never wall-clock, so priority ordering stays
/// total under bursty arrivals.
#[derive(Clone, Debug)]
pub struct Order {
    pub id: OrderId,
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Lots, strictly positive (ignored for cancels).
    pub quantity: u64,
    /// Limit price in ticks. `Some` iff the order is a limit.
    pub price_ticks: Option<i64>,
    pub submit_seq: u64,
}

/// The on-book form of a limit order: original identity plus the
/// mutable remaining quantity. Remaining is strictly positive while the
/// order rests; reaching zero removes it from the book.
#[derive(Clone, Debug)]
pub struct RestingOrder {
    pub id: OrderId,
    pub client_id: String,
    pub side: Side,
    pub price_ticks: i64,
    /// Quantity at admission.
    pub quantity: u64,
    pub remaining: u64,
    pub submit_seq: u64,
}

/// One execution. Price is always the passive (resting) order's price;
/// `event_seq` is a per-book monotonic tick.
#[derive(Clone, Debug, Serialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: String,
    pub quantity: u64,
    pub price_ticks: i64,
    pub event_seq: u64,
}

impl Trade {
    pub fn price(&self) -> f64 {
        ticks_to_price(self.price_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_round_trips_through_ticks() {
        let ticks = price_to_ticks(150.25).expect("valid price");
        assert_eq!(ticks, 1_502_500);
        assert!((ticks_to_price(ticks) - 150.25).abs() < 1e-9);
    }

    #[test]
    fn bad_prices_rejected() {
        assert!(price_to_ticks(0.0).is_none());
        assert!(price_to_ticks(-1.5).is_none());
        assert!(price_to_ticks(f64::NAN).is_none());
        assert!(price_to_ticks(f64::INFINITY).is_none());
    }

    #[test]
    fn side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
