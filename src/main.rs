//! Matchbook performance lab.
//!
//! In-process latency and throughput measurements over the matching
//! core, followed by a short demo of order placement, matching and
//! cancellation. End-to-end (UDP) load belongs to the CLI bench.

mod perf;

fn main() {
    println!("=== Matchbook Performance Lab ===");

    perf::run_latency_tests();
    perf::run_throughput_test();

    println!("\n=== Basic Demo ===");
    run_basic_demo();
}

/// Walks through the basic book lifecycle with printed state.
fn run_basic_demo() {
    use orderbook::{Book, OrderId};

    let mut book = Book::new("AAPL");
    let mut seq = 0u64;

    println!("Submitting ask: 100 @ 150.00");
    book.submit(perf::limit_order("S1", orderbook::Side::Sell, 150.0, 100, {
        seq += 1;
        seq
    }));

    println!("Submitting bid: 50 @ 149.50");
    book.submit(perf::limit_order("B1", orderbook::Side::Buy, 149.5, 50, {
        seq += 1;
        seq
    }));

    println!("Best bid: {:?}", book.best_bid());
    println!("Best ask: {:?}", book.best_ask());

    println!("Submitting crossing bid: 75 @ 150.00");
    let trades = book.submit(perf::limit_order("B2", orderbook::Side::Buy, 150.0, 75, {
        seq += 1;
        seq
    }));

    println!("Trades executed: {}", trades.len());
    for trade in &trades {
        println!("  {} lots @ {:.2}", trade.quantity, trade.price());
    }

    println!("Cancelling resting bid B1: {}", book.cancel(&OrderId::from("B1")));
    println!("Final best bid: {:?}", book.best_bid());
    println!("Final best ask: {:?}", book.best_ask());
    println!("Totals: {} trades, {} lots", book.total_trades(), book.total_volume());
}
