//! Command line client for the matching server.
//!
//! Order entry and the load scenario talk to the UDP endpoint; the
//! read commands go through the REST façade.

use clap::{Parser, Subcommand};
use orderbook::Side;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Parser)]
#[command(name = "matchbook-cli")]
#[command(about = "Client for the matchbook UDP matching server")]
struct Cli {
    /// UDP order endpoint
    #[arg(short, long, default_value = "127.0.0.1:8888")]
    server: SocketAddr,
    /// REST façade base URL
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    http: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a limit order
    Limit {
        #[arg(short = 's', long)]
        symbol: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(short = 'p', long)]
        price: f64,
        #[arg(short = 'q', long)]
        quantity: u64,
        #[arg(short = 'c', long, default_value = "cli")]
        client_id: String,
        /// Optional client-assigned order id
        #[arg(long)]
        order_id: Option<String>,
    },
    /// Submit a market order
    Market {
        #[arg(short = 's', long)]
        symbol: String,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(short = 'q', long)]
        quantity: u64,
        #[arg(short = 'c', long, default_value = "cli")]
        client_id: String,
    },
    /// Cancel a resting order
    Cancel {
        #[arg(short = 's', long)]
        symbol: String,
        #[arg(long)]
        order_id: String,
        #[arg(short = 'c', long, default_value = "cli")]
        client_id: String,
    },
    /// Sustained load scenario against the UDP endpoint
    Bench {
        /// Target orders per second
        #[arg(short, long, default_value_t = 500)]
        rate: u64,
        /// Scenario length in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Comma-separated symbols to spread orders across
        #[arg(long, default_value = "AAPL,GOOGL,MSFT,TSLA,AMZN")]
        symbols: String,
        #[arg(short = 'c', long, default_value = "bench")]
        client_id: String,
    },
    /// Server statistics (REST)
    Stats,
    /// Order book snapshot for one symbol (REST)
    Book {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, default_value_t = 10)]
        levels: usize,
    },
    /// Active symbols (REST)
    Symbols,
}

fn parse_side(raw: &str) -> Result<Side, String> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" | "bid" | "b" => Ok(Side::Buy),
        "sell" | "ask" | "s" => Ok(Side::Sell),
        _ => Err(format!("invalid side: {raw}. Use 'buy' or 'sell'")),
    }
}

#[derive(Serialize)]
struct OrderRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    client_id: String,
    symbol: String,
    side: String,
    order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
}

#[derive(Deserialize)]
struct OrderResponse {
    order_id: Option<String>,
    success: bool,
    message: String,
    #[serde(default)]
    trades: Vec<TradeLine>,
}

#[derive(Deserialize)]
struct TradeLine {
    quantity: u64,
    price: f64,
}

#[derive(Deserialize)]
struct SymbolsResponse {
    symbols: Vec<String>,
}

#[derive(Deserialize)]
struct QuoteView {
    price: f64,
    quantity: u64,
}

#[derive(Deserialize)]
struct LevelView {
    price: f64,
    quantity: u64,
    orders: Vec<String>,
}

#[derive(Deserialize)]
struct BookView {
    symbol: String,
    bids: Vec<LevelView>,
    asks: Vec<LevelView>,
    best_bid: Option<QuoteView>,
    best_ask: Option<QuoteView>,
    total_volume: u64,
    total_trades: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Limit {
            symbol,
            side,
            price,
            quantity,
            client_id,
            order_id,
        } => {
            let request = OrderRequest {
                order_id,
                client_id,
                symbol,
                side: side.to_string(),
                order_type: "LIMIT".to_string(),
                quantity: Some(quantity),
                price: Some(price),
            };
            send_and_print(cli.server, &request).await?;
        }

        Commands::Market {
            symbol,
            side,
            quantity,
            client_id,
        } => {
            let request = OrderRequest {
                order_id: None,
                client_id,
                symbol,
                side: side.to_string(),
                order_type: "MARKET".to_string(),
                quantity: Some(quantity),
                price: None,
            };
            send_and_print(cli.server, &request).await?;
        }

        Commands::Cancel {
            symbol,
            order_id,
            client_id,
        } => {
            let request = OrderRequest {
                order_id: Some(order_id),
                client_id,
                symbol,
                // side is advisory on cancels but the field is required
                side: "BUY".to_string(),
                order_type: "CANCEL".to_string(),
                quantity: None,
                price: None,
            };
            send_and_print(cli.server, &request).await?;
        }

        Commands::Bench {
            rate,
            duration,
            symbols,
            client_id,
        } => {
            let symbols: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            run_bench(cli.server, rate, duration, symbols, client_id).await?;
        }

        Commands::Stats => {
            let body: serde_json::Value = reqwest::Client::new()
                .get(format!("{}/statistics", cli.http))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Book { symbol, levels } => {
            let response = reqwest::Client::new()
                .get(format!("{}/orderbook/{}?levels={}", cli.http, symbol, levels))
                .send()
                .await?;
            if !response.status().is_success() {
                println!("Error: {}", response.status());
                return Ok(());
            }
            let book: BookView = response.json().await?;
            print_book(&book);
        }

        Commands::Symbols => {
            let response: SymbolsResponse = reqwest::Client::new()
                .get(format!("{}/symbols", cli.http))
                .send()
                .await?
                .json()
                .await?;
            for symbol in response.symbols {
                println!("{symbol}");
            }
        }
    }

    Ok(())
}

/// Sends one order frame and prints the ack.
async fn send_and_print(
    server: SocketAddr,
    request: &OrderRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(&serde_json::to_vec(request)?, server).await?;

    let mut buf = vec![0u8; 4096];
    let (len, _) = match timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            println!("No response within 3s (transport is best-effort)");
            return Ok(());
        }
    };
    let response: OrderResponse = serde_json::from_slice(&buf[..len])?;

    if let Some(order_id) = &response.order_id {
        println!("Order ID: {order_id}");
    }
    println!("Success: {}", response.success);
    println!("Message: {}", response.message);
    if !response.trades.is_empty() {
        println!("Trades executed: {}", response.trades.len());
        for trade in &response.trades {
            println!("  {} lots @ {:.4}", trade.quantity, trade.price);
        }
    }
    Ok(())
}

fn print_book(book: &BookView) {
    println!("Order book for {}", book.symbol);
    println!(
        "Best bid: {}  Best ask: {}",
        book.best_bid
            .as_ref()
            .map(|q| format!("{:.4} x{}", q.price, q.quantity))
            .unwrap_or_else(|| "-".to_string()),
        book.best_ask
            .as_ref()
            .map(|q| format!("{:.4} x{}", q.price, q.quantity))
            .unwrap_or_else(|| "-".to_string()),
    );
    println!("\nAsks:");
    for (i, level) in book.asks.iter().enumerate() {
        println!(
            "  {}: {} @ {:.4} ({} orders)",
            i + 1,
            level.quantity,
            level.price,
            level.orders.len()
        );
    }
    println!("\nBids:");
    for (i, level) in book.bids.iter().enumerate() {
        println!(
            "  {}: {} @ {:.4} ({} orders)",
            i + 1,
            level.quantity,
            level.price,
            level.orders.len()
        );
    }
    println!(
        "\nTotals: {} trades, {} lots",
        book.total_trades, book.total_volume
    );
}

/// Fire-and-forget load scenario: random limit/market flow across the
/// configured symbols at a target rate, with a response listener
/// accounting for acks and round-trip latency.
async fn run_bench(
    server: SocketAddr,
    rate: u64,
    duration_secs: u64,
    symbols: Vec<String>,
    client_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    if symbols.is_empty() || rate == 0 {
        return Err("bench needs at least one symbol and a non-zero rate".into());
    }
    println!("Load scenario: {rate} orders/sec for {duration_secs}s across {symbols:?}");

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
    let received = Arc::new(AtomicU64::new(0));
    let fills = Arc::new(AtomicU64::new(0));
    let pending: Arc<Mutex<HashMap<String, Instant>>> = Arc::new(Mutex::new(HashMap::new()));
    let latencies: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

    // Response listener: correlate acks by order id.
    let listener = {
        let socket = socket.clone();
        let received = received.clone();
        let fills = fills.clone();
        let pending = pending.clone();
        let latencies = latencies.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok(Ok((len, _))) =
                    timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await
                else {
                    continue;
                };
                let Ok(response) = serde_json::from_slice::<OrderResponse>(&buf[..len]) else {
                    continue;
                };
                received.fetch_add(1, Ordering::Relaxed);
                fills.fetch_add(response.trades.len() as u64, Ordering::Relaxed);
                if let Some(order_id) = response.order_id {
                    if let Some(sent_at) = pending.lock().await.remove(&order_id) {
                        latencies.lock().await.push(sent_at.elapsed());
                    }
                }
            }
        })
    };

    let started = Instant::now();
    let deadline = Duration::from_secs(duration_secs);
    let mut sent = 0u64;
    let mut seq = 0u64;

    while started.elapsed() < deadline {
        // Catch up to the target for the elapsed time, then yield.
        let target = (started.elapsed().as_secs_f64() * rate as f64) as u64;
        while sent < target {
            seq += 1;
            let order_id = format!("{client_id}-{seq}");
            let request = random_order(&symbols, &client_id, &order_id);
            pending.lock().await.insert(order_id, Instant::now());
            socket.send_to(&serde_json::to_vec(&request)?, server).await?;
            sent += 1;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // Grace period for trailing acks.
    tokio::time::sleep(Duration::from_millis(500)).await;
    listener.abort();

    let elapsed = started.elapsed().as_secs_f64();
    let received = received.load(Ordering::Relaxed);
    let fills = fills.load(Ordering::Relaxed);
    let mut latencies = latencies.lock().await.clone();
    latencies.sort();

    println!("\nResults");
    println!("  sent:       {sent} ({:.1}/s)", sent as f64 / elapsed);
    println!(
        "  acked:      {received} ({:.1}% of sent)",
        100.0 * received as f64 / sent.max(1) as f64
    );
    println!("  fills:      {fills}");
    if !latencies.is_empty() {
        println!("  latency p50: {:?}", percentile(&latencies, 50));
        println!("  latency p95: {:?}", percentile(&latencies, 95));
        println!("  latency p99: {:?}", percentile(&latencies, 99));
    }
    Ok(())
}

fn random_order(symbols: &[String], client_id: &str, order_id: &str) -> OrderRequest {
    let mut rng = rand::thread_rng();
    let symbol = symbols[rng.gen_range(0..symbols.len())].clone();
    let side = if rng.gen_bool(0.5) { "BUY" } else { "SELL" };
    // mostly limits near a common mid so the books actually cross
    let is_limit = rng.gen_bool(0.8);
    OrderRequest {
        order_id: Some(order_id.to_string()),
        client_id: client_id.to_string(),
        symbol,
        side: side.to_string(),
        order_type: if is_limit { "LIMIT" } else { "MARKET" }.to_string(),
        quantity: Some(rng.gen_range(1..=100)),
        price: is_limit.then(|| 100.0 + rng.gen_range(-5.0..5.0)),
    }
}

fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    let idx = (sorted.len().saturating_sub(1)) * pct / 100;
    sorted[idx]
}
