//! Latency and throughput measurements for the matching core.
//!
//! Scenarios: quote lookup, non-crossing submission, crossing sweeps,
//! indexed cancellation, and a sustained mixed workload.

use orderbook::{Book, Order, OrderId, OrderKind, Side};
use std::time::Instant;

pub fn limit_order(id: &str, side: Side, price: f64, qty: u64, seq: u64) -> Order {
    Order {
        id: OrderId::from(id),
        client_id: "perf".to_string(),
        symbol: "AAPL".to_string(),
        side,
        kind: OrderKind::Limit,
        quantity: qty,
        price_ticks: orderbook::price_to_ticks(price),
        submit_seq: seq,
    }
}

fn market_order(id: &str, side: Side, qty: u64, seq: u64) -> Order {
    Order {
        id: OrderId::from(id),
        client_id: "perf".to_string(),
        symbol: "AAPL".to_string(),
        side,
        kind: OrderKind::Market,
        quantity: qty,
        price_ticks: None,
        submit_seq: seq,
    }
}

pub fn run_latency_tests() {
    println!("\n--- Latency ---");
    test_quote_latency();
    test_submission_latency();
    test_matching_latency();
    test_cancellation_latency();
}

/// Best bid/ask lookup over a populated book.
fn test_quote_latency() {
    let mut book = Book::new("AAPL");
    for i in 0..100u64 {
        book.submit(limit_order(
            &format!("A{i}"),
            Side::Sell,
            151.0 + i as f64 * 0.01,
            100,
            i,
        ));
        book.submit(limit_order(
            &format!("B{i}"),
            Side::Buy,
            150.0 - i as f64 * 0.01,
            100,
            100 + i,
        ));
    }

    let iterations = 1_000_000u64;
    let start = Instant::now();
    for _ in 0..iterations {
        std::hint::black_box(book.best_bid());
        std::hint::black_box(book.best_ask());
    }
    let elapsed = start.elapsed();
    println!(
        "  quote lookup: {:.2} ns/pair",
        elapsed.as_nanos() as f64 / iterations as f64
    );
}

/// Non-crossing limit submission into a fresh book.
fn test_submission_latency() {
    let iterations = 10_000u64;
    let mut total_nanos = 0u128;

    for i in 0..iterations {
        let mut book = Book::new("AAPL");
        let order = limit_order("B0", Side::Buy, 150.0, 100, i);

        let start = Instant::now();
        std::hint::black_box(book.submit(order));
        total_nanos += start.elapsed().as_nanos();
    }
    println!(
        "  non-crossing submit: {:.2} ns/order",
        total_nanos as f64 / iterations as f64
    );
}

/// Crossing order sweeping ten resting levels.
fn test_matching_latency() {
    let iterations = 5_000u64;
    let mut total_nanos = 0u128;

    for i in 0..iterations {
        let mut book = Book::new("AAPL");
        for level in 0..10u64 {
            book.submit(limit_order(
                &format!("S{level}"),
                Side::Sell,
                150.0 + level as f64 * 0.01,
                10,
                level,
            ));
        }
        let sweep = limit_order("B0", Side::Buy, 151.0, 100, 100 + i);

        let start = Instant::now();
        let trades = book.submit(sweep);
        total_nanos += start.elapsed().as_nanos();
        assert_eq!(trades.len(), 10);
    }
    println!(
        "  10-level sweep: {:.2} ns/order",
        total_nanos as f64 / iterations as f64
    );
}

/// Indexed cancel of a random resting order.
fn test_cancellation_latency() {
    let iterations = 10_000u64;
    let mut total_nanos = 0u128;

    for i in 0..iterations {
        let mut book = Book::new("AAPL");
        for n in 0..50u64 {
            book.submit(limit_order(
                &format!("B{n}"),
                Side::Buy,
                150.0 - (n % 10) as f64 * 0.01,
                100,
                n,
            ));
        }
        let target = OrderId(format!("B{}", i % 50));

        let start = Instant::now();
        let removed = book.cancel(&target);
        total_nanos += start.elapsed().as_nanos();
        assert!(removed);
    }
    println!(
        "  indexed cancel: {:.2} ns/cancel",
        total_nanos as f64 / iterations as f64
    );
}

/// Sustained mixed workload: 70% resting limits, 20% crossing, 10%
/// cancels, reported as orders per second.
pub fn run_throughput_test() {
    println!("\n--- Sustained throughput (mixed 70/20/10) ---");

    let mut book = Book::new("AAPL");
    let total = 500_000u64;
    let mut cancelled = 0u64;
    let mut trades = 0u64;

    let start = Instant::now();
    for i in 0..total {
        match i % 10 {
            // resting flow on both sides of a stable spread
            0..=3 => {
                book.submit(limit_order(
                    &format!("B{i}"),
                    Side::Buy,
                    149.0 - (i % 20) as f64 * 0.01,
                    10,
                    i,
                ));
            }
            4..=6 => {
                book.submit(limit_order(
                    &format!("S{i}"),
                    Side::Sell,
                    151.0 + (i % 20) as f64 * 0.01,
                    10,
                    i,
                ));
            }
            // crossing flow
            7 => {
                trades += book
                    .submit(limit_order(&format!("X{i}"), Side::Buy, 151.5, 15, i))
                    .len() as u64;
            }
            8 => {
                trades += book.submit(market_order(&format!("M{i}"), Side::Sell, 15, i)).len() as u64;
            }
            // cancel flow against a recent resting bid
            _ => {
                let target = OrderId(format!("B{}", i.saturating_sub(10) / 10 * 10));
                if book.cancel(&target) {
                    cancelled += 1;
                }
            }
        }
    }
    let elapsed = start.elapsed();

    println!(
        "  {} ops in {:.2}s -> {:.0} ops/sec",
        total,
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    println!(
        "  trades: {trades}, cancels: {cancelled}, resting: {}",
        book.open_orders()
    );
}
