//! REST/stream façade over the published snapshots and the submit
//! pipeline. No new semantics live here: reads come from the snapshot
//! store, writes funnel through the same validation and matcher queue
//! as the datagram path.

use crate::engine::{EngineRequest, ReplyTo, TradeEvent};
use crate::snapshot::{statistics, ServerStats, SnapshotStore};
use crate::wire::{self, RequestFrame, ResponseFrame};
use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    pub snapshots: Arc<SnapshotStore>,
    pub stats: Arc<ServerStats>,
    pub requests: mpsc::Sender<EngineRequest>,
    pub trade_feed: broadcast::Sender<TradeEvent>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/statistics", get(get_statistics))
        .route("/symbols", get(list_symbols))
        .route("/orderbook", get(all_orderbooks))
        .route("/orderbook/:symbol", get(get_orderbook))
        .route("/orders", post(submit_order))
        .route("/trades/stream", get(trade_stream))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "match-server",
        "timestamp": wire::now_millis(),
    }))
}

async fn get_statistics(State(state): State<ApiState>) -> impl IntoResponse {
    Json(statistics(&state.stats, &state.snapshots))
}

#[derive(Serialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
}

async fn list_symbols(State(state): State<ApiState>) -> impl IntoResponse {
    Json(SymbolsResponse {
        symbols: state.snapshots.symbols(),
    })
}

#[derive(Deserialize)]
struct DepthQuery {
    levels: Option<usize>,
}

async fn get_orderbook(
    Path(symbol): Path<String>,
    Query(params): Query<DepthQuery>,
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, AppError> {
    let mut snapshot = state
        .snapshots
        .snapshot(&symbol)
        .ok_or(AppError::SymbolNotFound)?;
    if let Some(levels) = params.levels {
        snapshot.bids.truncate(levels);
        snapshot.asks.truncate(levels);
    }
    Ok(Json(snapshot))
}

async fn all_orderbooks(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.snapshots.all_snapshots())
}

/// Order entry over HTTP. The body is the same record as the datagram
/// payload; the ack is the same frame the datagram client would get.
async fn submit_order(
    State(state): State<ApiState>,
    Json(frame): Json<RequestFrame>,
) -> Result<Response, AppError> {
    let order = match wire::validate(frame) {
        Ok(order) => order,
        Err(rejection) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(ResponseFrame::rejected(&rejection)),
            )
                .into_response());
        }
    };

    let (tx, rx) = oneshot::channel();
    let request = EngineRequest {
        order,
        reply: ReplyTo::Local(tx),
    };
    match state.requests.try_send(request) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => return Err(AppError::Overloaded),
        Err(TrySendError::Closed(_)) => return Err(AppError::EngineUnavailable),
    }

    match tokio::time::timeout(Duration::from_secs(2), rx).await {
        Ok(Ok(frame)) => Ok(Json(frame).into_response()),
        _ => Err(AppError::EngineUnavailable),
    }
}

#[derive(Deserialize)]
struct StreamQuery {
    symbol: Option<String>,
}

async fn trade_stream(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamQuery>,
    State(state): State<ApiState>,
) -> Response {
    ws.on_upgrade(move |socket| stream_trades(socket, params.symbol, state))
}

/// Forwards executions to a WebSocket client as they occur, optionally
/// filtered to one symbol. Lag on the broadcast channel skips events
/// rather than stalling the feed.
async fn stream_trades(socket: WebSocket, symbol: Option<String>, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.trade_feed.subscribe();

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = sender.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "trade stream socket error");
                    break;
                }
            },
            event = feed.recv() => match event {
                Ok(event) => {
                    if symbol.as_deref().is_some_and(|s| s != event.symbol) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(text) => {
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode trade event"),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "trade stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[derive(Debug)]
enum AppError {
    SymbolNotFound,
    Overloaded,
    EngineUnavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::SymbolNotFound => (StatusCode::NOT_FOUND, "symbol not found"),
            AppError::Overloaded => (StatusCode::SERVICE_UNAVAILABLE, "overload"),
            AppError::EngineUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "engine unavailable"),
        };
        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
