//! Property-based tests for book invariants across randomly generated
//! order flow.

use orderbook::{Book, Order, OrderId, OrderKind, Side};
use proptest::prelude::*;

fn price_strategy() -> impl Strategy<Value = i64> {
    1_000i64..=2_000i64
}

fn quantity_strategy() -> impl Strategy<Value = u64> {
    1u64..=500u64
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

#[derive(Clone, Debug)]
enum Op {
    Limit { side: Side, price_ticks: i64, quantity: u64 },
    Market { side: Side, quantity: u64 },
    /// Cancel the n-th order submitted so far (may already be gone).
    Cancel { target: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (side_strategy(), price_strategy(), quantity_strategy())
            .prop_map(|(side, price_ticks, quantity)| Op::Limit { side, price_ticks, quantity }),
        1 => (side_strategy(), quantity_strategy())
            .prop_map(|(side, quantity)| Op::Market { side, quantity }),
        1 => (0usize..200).prop_map(|target| Op::Cancel { target }),
    ]
}

fn order(id: &OrderId, kind: OrderKind, side: Side, quantity: u64, price_ticks: Option<i64>, seq: u64) -> Order {
    Order {
        id: id.clone(),
        client_id: "prop".to_string(),
        symbol: "AAPL".to_string(),
        side,
        kind,
        quantity,
        price_ticks,
        submit_seq: seq,
    }
}

/// Drives a book through a script of operations, returning the ids in
/// submission order.
fn run_script(book: &mut Book, ops: &[Op]) -> Vec<OrderId> {
    let mut ids = Vec::new();
    for (seq, op) in ops.iter().enumerate() {
        let seq = seq as u64 + 1;
        match op {
            Op::Limit { side, price_ticks, quantity } => {
                let id = OrderId(format!("ord-{seq}"));
                book.submit(order(&id, OrderKind::Limit, *side, *quantity, Some(*price_ticks), seq));
                ids.push(id);
            }
            Op::Market { side, quantity } => {
                let id = OrderId(format!("ord-{seq}"));
                book.submit(order(&id, OrderKind::Market, *side, *quantity, None, seq));
                ids.push(id);
            }
            Op::Cancel { target } => {
                if let Some(id) = ids.get(*target) {
                    book.cancel(id);
                }
            }
        }
    }
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The book is never crossed after any finite operation sequence.
    #[test]
    fn never_crossed(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut book = Book::new("AAPL");
        run_script(&mut book, &ops);

        if let (Some((bid, _)), Some((ask, _))) = (book.best_bid(), book.best_ask()) {
            prop_assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
        }
    }

    /// Quantity conservation per order: fills + resting never exceed
    /// the original (cancels discard the remainder, markets discard
    /// their residue).
    #[test]
    fn quantity_conserved(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut book = Book::new("AAPL");
        let ids = run_script(&mut book, &ops);

        let submissions: Vec<&Op> = ops
            .iter()
            .filter(|op| matches!(op, Op::Limit { .. } | Op::Market { .. }))
            .collect();

        // Submitted ids line up with non-cancel ops in order.
        let mut submitted = ids.iter();
        for op in &submissions {
            let id = submitted.next().expect("id per submission");
            let filled: u64 = book
                .trades()
                .iter()
                .filter(|t| &t.buy_order_id == id || &t.sell_order_id == id)
                .map(|t| t.quantity)
                .sum();
            let resting = book.resting(id).map(|o| o.remaining).unwrap_or(0);
            match op {
                Op::Limit { quantity, .. } => {
                    prop_assert!(filled + resting <= *quantity);
                }
                Op::Market { quantity, .. } => {
                    prop_assert!(filled <= *quantity);
                    prop_assert_eq!(resting, 0, "market order rested");
                }
                Op::Cancel { .. } => unreachable!(),
            }
        }
    }

    /// Volume counters always equal the execution history.
    #[test]
    fn counters_match_history(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut book = Book::new("AAPL");
        run_script(&mut book, &ops);

        let volume: u64 = book.trades().iter().map(|t| t.quantity).sum();
        prop_assert_eq!(volume, book.total_volume());
        prop_assert_eq!(book.trades().len() as u64, book.total_trades());
    }

    /// Executions always carry positive quantity and price, and the
    /// trade event sequence is strictly increasing.
    #[test]
    fn executions_well_formed(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut book = Book::new("AAPL");
        run_script(&mut book, &ops);

        for trade in book.trades() {
            prop_assert!(trade.quantity > 0, "zero-quantity trade");
            prop_assert!(trade.price_ticks > 0, "non-positive trade price");
        }
        for pair in book.trades().windows(2) {
            prop_assert!(pair[0].event_seq < pair[1].event_seq);
        }
    }

    /// Snapshot aggregates agree with the ladders, and levels are
    /// sorted best-first on both sides.
    #[test]
    fn snapshot_consistent(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut book = Book::new("AAPL");
        run_script(&mut book, &ops);

        let snap = book.snapshot(usize::MAX);
        let bid_qty: u64 = snap.bids.iter().map(|l| l.quantity).sum();
        let ask_qty: u64 = snap.asks.iter().map(|l| l.quantity).sum();
        prop_assert_eq!(bid_qty, book.bids().total_quantity());
        prop_assert_eq!(ask_qty, book.asks().total_quantity());

        for pair in snap.bids.windows(2) {
            prop_assert!(pair[0].price > pair[1].price, "bids not descending");
        }
        for pair in snap.asks.windows(2) {
            prop_assert!(pair[0].price < pair[1].price, "asks not ascending");
        }
    }

    /// Double cancel leaves the book identical to a single cancel.
    #[test]
    fn cancel_idempotent(
        price_ticks in price_strategy(),
        quantity in quantity_strategy(),
        side in side_strategy(),
    ) {
        let mut book = Book::new("AAPL");
        let id = OrderId::from("target");
        book.submit(order(&id, OrderKind::Limit, side, quantity, Some(price_ticks), 1));

        prop_assert!(book.cancel(&id));
        let after_first = book.open_orders();
        prop_assert!(!book.cancel(&id));
        prop_assert_eq!(book.open_orders(), after_first);
    }

    /// Replaying the same script produces the same fills and book shape.
    #[test]
    fn deterministic_replay(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut first = Book::new("AAPL");
        run_script(&mut first, &ops);
        let mut second = Book::new("AAPL");
        run_script(&mut second, &ops);

        let fills_a: Vec<(u64, i64)> = first.trades().iter().map(|t| (t.quantity, t.price_ticks)).collect();
        let fills_b: Vec<(u64, i64)> = second.trades().iter().map(|t| (t.quantity, t.price_ticks)).collect();
        prop_assert_eq!(fills_a, fills_b);
        prop_assert_eq!(first.best_bid(), second.best_bid());
        prop_assert_eq!(first.best_ask(), second.best_ask());
    }
}
