//! Request/response frame codec for the datagram transport.
//!
//! Frames are self-describing JSON text records. Ingress validation
//! happens here: a frame either decodes into a well-formed [`Order`] or
//! is rejected with a reason that becomes a negative acknowledgement.
//! Rejected frames never reach the matcher.

use orderbook::{price_to_ticks, Order, OrderId, OrderKind, Side, Trade, TradeId};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Maximum accepted datagram payload.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Inbound order frame as it appears on the wire. Every field is
/// optional at the serde layer so that missing fields surface as
/// specific rejections instead of opaque parse errors.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Why a request frame was refused at ingress (or at the queue).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RejectReason {
    #[error("invalid JSON: {0}")]
    Malformed(String),
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    Oversized,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid side: {0}")]
    InvalidSide(String),
    #[error("invalid order_type: {0}")]
    InvalidKind(String),
    #[error("quantity must be a positive integer")]
    BadQuantity,
    #[error("price must be positive and finite")]
    BadPrice,
    #[error("limit orders require a price")]
    MissingPrice,
    #[error("cancel requires an order_id")]
    MissingOrderId,
    #[error("overload")]
    Overload,
}

/// A refused request, keeping whatever order id was readable so the
/// negative ack can still be correlated by the client.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub order_id: Option<OrderId>,
    pub reason: RejectReason,
}

impl Rejection {
    pub fn overload(order_id: Option<OrderId>) -> Self {
        Self {
            order_id,
            reason: RejectReason::Overload,
        }
    }
}

/// Decodes a raw datagram payload into an admitted order.
pub fn decode_frame(payload: &[u8]) -> Result<Order, Rejection> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(Rejection {
            order_id: None,
            reason: RejectReason::Oversized,
        });
    }
    let frame: RequestFrame = serde_json::from_slice(payload).map_err(|e| Rejection {
        order_id: None,
        reason: RejectReason::Malformed(e.to_string()),
    })?;
    validate(frame)
}

/// Validates a decoded frame into an [`Order`], assigning a fresh
/// server-side id when the client supplied none. `submit_seq` is left
/// at zero; the matcher stamps it at dequeue.
pub fn validate(frame: RequestFrame) -> Result<Order, Rejection> {
    let order_id = frame
        .order_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(OrderId::from);
    match build_order(frame, order_id.clone()) {
        Ok(order) => Ok(order),
        Err(reason) => Err(Rejection { order_id, reason }),
    }
}

fn build_order(frame: RequestFrame, order_id: Option<OrderId>) -> Result<Order, RejectReason> {
    let client_id = required(frame.client_id, "client_id")?;
    let symbol = required(frame.symbol, "symbol")?;
    let side = parse_side(&required(frame.side, "side")?)?;
    let kind = parse_kind(&required(frame.order_type, "order_type")?)?;

    let (id, quantity, price_ticks) = match kind {
        OrderKind::Cancel => {
            // quantity and price are advisory on cancels
            let id = order_id.ok_or(RejectReason::MissingOrderId)?;
            (id, 0, None)
        }
        OrderKind::Market => {
            // price is ignored for market orders
            let quantity = positive_quantity(frame.quantity)?;
            (order_id.unwrap_or_else(OrderId::fresh), quantity, None)
        }
        OrderKind::Limit => {
            let quantity = positive_quantity(frame.quantity)?;
            let price = frame.price.ok_or(RejectReason::MissingPrice)?;
            let ticks = price_to_ticks(price).ok_or(RejectReason::BadPrice)?;
            (order_id.unwrap_or_else(OrderId::fresh), quantity, Some(ticks))
        }
    };

    Ok(Order {
        id,
        client_id,
        symbol,
        side,
        kind,
        quantity,
        price_ticks,
        submit_seq: 0,
    })
}

fn required(field: Option<String>, name: &'static str) -> Result<String, RejectReason> {
    field
        .filter(|s| !s.is_empty())
        .ok_or(RejectReason::MissingField(name))
}

fn parse_side(raw: &str) -> Result<Side, RejectReason> {
    match raw.to_ascii_uppercase().as_str() {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        _ => Err(RejectReason::InvalidSide(raw.to_string())),
    }
}

fn parse_kind(raw: &str) -> Result<OrderKind, RejectReason> {
    match raw.to_ascii_uppercase().as_str() {
        "LIMIT" => Ok(OrderKind::Limit),
        "MARKET" => Ok(OrderKind::Market),
        "CANCEL" => Ok(OrderKind::Cancel),
        _ => Err(RejectReason::InvalidKind(raw.to_string())),
    }
}

fn positive_quantity(raw: Option<i64>) -> Result<u64, RejectReason> {
    match raw {
        Some(q) if q > 0 => Ok(q as u64),
        _ => Err(RejectReason::BadQuantity),
    }
}

/// One execution as reported back to the submitter. `timestamp` is the
/// matcher's event tick, not wall-clock, so clients can order fills.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeFrame {
    pub trade_id: TradeId,
    pub quantity: u64,
    pub price: f64,
    pub timestamp: u64,
}

impl TradeFrame {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            quantity: trade.quantity,
            price: trade.price(),
            timestamp: trade.event_seq,
        }
    }
}

/// Acknowledgement frame sent back to the originating endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub success: bool,
    pub message: String,
    pub trades: Vec<TradeFrame>,
    /// Unix milliseconds at encode time.
    pub timestamp: u64,
}

impl ResponseFrame {
    pub fn ack(order_id: Option<OrderId>, message: impl Into<String>, trades: &[Trade]) -> Self {
        Self {
            order_id,
            success: true,
            message: message.into(),
            trades: trades.iter().map(TradeFrame::from_trade).collect(),
            timestamp: now_millis(),
        }
    }

    pub fn rejected(rejection: &Rejection) -> Self {
        Self::failure(rejection.order_id.clone(), rejection.reason.to_string())
    }

    pub fn failure(order_id: Option<OrderId>, message: impl Into<String>) -> Self {
        Self {
            order_id,
            success: false,
            message: message.into(),
            trades: Vec::new(),
            timestamp: now_millis(),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
