//! Per-symbol orderbook reconstruction
//!
//! # State Machine
//!
//! ```text
//! AwaitingSnapshot → Synced → Invalid (sequence gap)
//!                      ↓
//!                    Stale (connection lost)
//! ```
//!
//! Any snapshot moves the book back to `Synced`. Deltas are only applied while
//! `Synced`; in every other state they are suppressed.

use crate::storage::TreeBook;
use bcx_types::{BookDelta, BookSide, BookSnapshot, Level, LevelChange};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Orderbook synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderbookState {
    /// Subscribed, waiting for the first snapshot
    #[default]
    AwaitingSnapshot,
    /// Contiguous with the exchange
    Synced,
    /// A sequence gap was detected, awaiting a fresh snapshot
    Invalid,
    /// The connection dropped, contents are outdated
    Stale,
}

/// Delta sequence did not follow the last applied sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Sequence gap for {symbol}: expected {expected}, received {received}")]
pub struct SequenceGap {
    /// Symbol that had the gap
    pub symbol: String,
    /// `last_sequence + 1`
    pub expected: u64,
    /// Sequence carried by the delta
    pub received: u64,
}

impl From<SequenceGap> for bcx_types::BcxError {
    fn from(gap: SequenceGap) -> Self {
        bcx_types::BcxError::sequence_gap(gap.symbol, gap.expected, gap.received)
    }
}

/// What happened to a delta that did not fail with a gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// All level changes were applied
    Applied,
    /// The book was not synced; nothing was applied
    Suppressed(OrderbookState),
}

/// Sequence-checked L2 orderbook for one symbol
#[derive(Debug, Clone)]
pub struct Orderbook {
    symbol: String,
    storage: TreeBook,
    last_sequence: Option<u64>,
    state: OrderbookState,
}

impl Orderbook {
    /// Create an empty book awaiting its snapshot
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            storage: TreeBook::new(),
            last_sequence: None,
            state: OrderbookState::AwaitingSnapshot,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> OrderbookState {
        self.state
    }

    /// Only synced books reflect the exchange
    pub fn is_synced(&self) -> bool {
        self.state == OrderbookState::Synced
    }

    /// Sequence of the last applied snapshot or delta
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Replace the book wholesale; zero-quantity levels are skipped
    pub fn apply_snapshot(&mut self, sequence: u64, bids: &[Level], asks: &[Level]) {
        self.storage.clear();
        for level in bids {
            self.storage
                .upsert(BookSide::Bid, level.price, level.qty, level.orders);
        }
        for level in asks {
            self.storage
                .upsert(BookSide::Ask, level.price, level.qty, level.orders);
        }
        self.last_sequence = Some(sequence);
        self.state = OrderbookState::Synced;
    }

    /// Apply one delta frame atomically
    ///
    /// A delta whose sequence is not exactly `last_sequence + 1` leaves the
    /// levels untouched and moves the book to `Invalid`.
    pub fn apply_delta(
        &mut self,
        sequence: u64,
        changes: &[LevelChange],
    ) -> Result<DeltaOutcome, SequenceGap> {
        if self.state != OrderbookState::Synced {
            return Ok(DeltaOutcome::Suppressed(self.state));
        }

        let expected = self.last_sequence.map_or(0, |s| s + 1);
        if sequence != expected {
            self.state = OrderbookState::Invalid;
            return Err(SequenceGap {
                symbol: self.symbol.clone(),
                expected,
                received: sequence,
            });
        }

        for change in changes {
            self.storage
                .upsert(change.side, change.price, change.qty, change.orders);
        }
        self.last_sequence = Some(sequence);
        Ok(DeltaOutcome::Applied)
    }

    /// Apply a normalized snapshot
    pub fn apply_book_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.apply_snapshot(snapshot.sequence, &snapshot.bids, &snapshot.asks);
    }

    /// Apply a normalized delta
    pub fn apply_book_delta(&mut self, delta: &BookDelta) -> Result<DeltaOutcome, SequenceGap> {
        self.apply_delta(delta.sequence, &delta.changes)
    }

    /// Mark the book invalid; returns true only on the transition into `Invalid`
    pub fn invalidate(&mut self) -> bool {
        if self.state == OrderbookState::Invalid {
            return false;
        }
        self.state = OrderbookState::Invalid;
        true
    }

    /// Mark the book stale after a connection loss
    pub fn mark_stale(&mut self) {
        if self.state != OrderbookState::AwaitingSnapshot {
            self.state = OrderbookState::Stale;
        }
    }

    /// Level at an exact price
    pub fn level(&self, side: BookSide, price: Decimal) -> Option<&Level> {
        self.storage.level(side, price)
    }

    pub fn best_bid(&self) -> Option<&Level> {
        self.storage.best_bid()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.storage.best_ask()
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Midpoint of best bid and best ask
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask.price + bid.price) / Decimal::TWO),
            _ => None,
        }
    }

    pub fn top_bids(&self, n: usize) -> Vec<Level> {
        self.storage.top(BookSide::Bid, n)
    }

    pub fn top_asks(&self, n: usize) -> Vec<Level> {
        self.storage.top(BookSide::Ask, n)
    }

    pub fn bid_count(&self) -> usize {
        self.storage.len(BookSide::Bid)
    }

    pub fn ask_count(&self) -> usize {
        self.storage.len(BookSide::Ask)
    }

    /// Capture the current state
    pub fn snapshot(&self) -> OrderbookSnapshot {
        OrderbookSnapshot {
            symbol: self.symbol.clone(),
            sequence: self.last_sequence,
            bids: self.storage.bids().cloned().collect(),
            asks: self.storage.asks().cloned().collect(),
            state: self.state,
        }
    }
}

/// Immutable copy of an orderbook
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    /// Trading pair symbol
    pub symbol: String,
    /// Last applied sequence
    pub sequence: Option<u64>,
    /// Bid levels, best first
    pub bids: Vec<Level>,
    /// Ask levels, best first
    pub asks: Vec<Level>,
    /// State at capture time
    pub state: OrderbookState,
}

impl OrderbookSnapshot {
    pub fn is_synced(&self) -> bool {
        self.state == OrderbookState::Synced
    }

    pub fn best_bid_price(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask_price(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask_price(), self.best_bid_price()) {
            (Some(ask), Some(bid)) => Some((ask + bid) / Decimal::TWO),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, qty: Decimal) -> Level {
        Level::new(price, qty, 1)
    }

    fn synced_book() -> Orderbook {
        let mut book = Orderbook::new("BTC-USD");
        book.apply_snapshot(
            100,
            &[level(dec!(100.00), dec!(2))],
            &[level(dec!(100.10), dec!(3))],
        );
        book
    }

    #[test]
    fn test_new_book_awaits_snapshot() {
        let mut book = Orderbook::new("BTC-USD");
        assert_eq!(book.state(), OrderbookState::AwaitingSnapshot);
        assert_eq!(book.last_sequence(), None);

        let outcome = book.apply_delta(1, &[LevelChange::new(BookSide::Bid, dec!(1), dec!(1), 1)]);
        assert_eq!(
            outcome,
            Ok(DeltaOutcome::Suppressed(OrderbookState::AwaitingSnapshot))
        );
        assert!(book.top_bids(10).is_empty());
    }

    #[test]
    fn test_zero_quantity_delta_removes_level() {
        let mut book = synced_book();
        let outcome = book
            .apply_delta(101, &[LevelChange::new(BookSide::Bid, dec!(100.00), dec!(0), 0)])
            .unwrap();

        assert_eq!(outcome, DeltaOutcome::Applied);
        assert!(book.level(BookSide::Bid, dec!(100.00)).is_none());
        assert_eq!(book.bid_count(), 0);
        assert_eq!(book.best_ask().map(|l| l.qty), Some(dec!(3)));
        assert_eq!(book.last_sequence(), Some(101));
    }

    #[test]
    fn test_gap_invalidates_without_applying() {
        let mut book = synced_book();
        let before = book.snapshot();

        let err = book
            .apply_delta(103, &[LevelChange::new(BookSide::Ask, dec!(100.10), dec!(0), 0)])
            .unwrap_err();

        assert_eq!(
            err,
            SequenceGap {
                symbol: "BTC-USD".into(),
                expected: 101,
                received: 103,
            }
        );
        assert_eq!(book.state(), OrderbookState::Invalid);
        assert_eq!(book.last_sequence(), Some(100));
        assert_eq!(book.top_asks(10), before.asks);
        assert_eq!(book.top_bids(10), before.bids);
    }

    #[test]
    fn test_stale_sequence_is_a_gap() {
        let mut book = synced_book();
        assert!(book.apply_delta(100, &[]).is_err());
    }

    #[test]
    fn test_deltas_suppressed_until_resnapshot() {
        let mut book = synced_book();
        assert!(book.apply_delta(105, &[]).is_err());

        let outcome = book
            .apply_delta(101, &[LevelChange::new(BookSide::Bid, dec!(99), dec!(1), 1)])
            .unwrap();
        assert_eq!(outcome, DeltaOutcome::Suppressed(OrderbookState::Invalid));
        assert!(book.level(BookSide::Bid, dec!(99)).is_none());

        book.apply_snapshot(200, &[level(dec!(98), dec!(1))], &[]);
        assert!(book.is_synced());
        assert_eq!(
            book.apply_delta(201, &[LevelChange::new(BookSide::Bid, dec!(97), dec!(1), 1)]),
            Ok(DeltaOutcome::Applied)
        );
        assert_eq!(book.bid_count(), 2);
    }

    #[test]
    fn test_contiguous_deltas_match_equivalent_snapshot() {
        let mut incremental = Orderbook::new("ETH-USD");
        incremental.apply_snapshot(
            10,
            &[level(dec!(200), dec!(1)), level(dec!(199), dec!(2))],
            &[level(dec!(201), dec!(1)), level(dec!(202), dec!(4))],
        );

        let deltas = vec![
            vec![
                LevelChange::new(BookSide::Bid, dec!(200), dec!(0), 0),
                LevelChange::new(BookSide::Bid, dec!(199.5), dec!(3), 2),
            ],
            vec![LevelChange::new(BookSide::Ask, dec!(201), dec!(0.5), 1)],
            vec![
                LevelChange::new(BookSide::Ask, dec!(202), dec!(0), 0),
                LevelChange::new(BookSide::Ask, dec!(203), dec!(7), 3),
            ],
        ];
        for (offset, changes) in deltas.iter().enumerate() {
            let sequence = 11 + offset as u64;
            assert_eq!(
                incremental.apply_delta(sequence, changes),
                Ok(DeltaOutcome::Applied)
            );
        }

        let mut direct = Orderbook::new("ETH-USD");
        direct.apply_snapshot(
            13,
            &[Level::new(dec!(199.5), dec!(3), 2), level(dec!(199), dec!(2))],
            &[level(dec!(201), dec!(0.5)), Level::new(dec!(203), dec!(7), 3)],
        );

        assert_eq!(incremental.snapshot(), direct.snapshot());
    }

    #[test]
    fn test_snapshot_skips_zero_levels() {
        let mut book = Orderbook::new("BTC-USD");
        book.apply_snapshot(1, &[level(dec!(10), dec!(0))], &[level(dec!(11), dec!(1))]);
        assert_eq!(book.bid_count(), 0);
        assert_eq!(book.ask_count(), 1);
    }

    #[test]
    fn test_invalidate_reports_transition_once() {
        let mut book = synced_book();
        assert!(book.invalidate());
        assert!(!book.invalidate());
    }

    #[test]
    fn test_stale_book_waits_for_snapshot() {
        let mut book = synced_book();
        book.mark_stale();
        assert_eq!(book.state(), OrderbookState::Stale);
        assert_eq!(
            book.apply_delta(101, &[]),
            Ok(DeltaOutcome::Suppressed(OrderbookState::Stale))
        );
        assert_eq!(book.bid_count(), 1);

        book.apply_snapshot(200, &[], &[]);
        assert_eq!(book.state(), OrderbookState::Synced);
        assert_eq!(book.bid_count(), 0);
        assert_eq!(book.last_sequence(), Some(200));
    }

    #[test]
    fn test_spread_and_mid() {
        let book = synced_book();
        assert_eq!(book.spread(), Some(dec!(0.10)));
        assert_eq!(book.mid_price(), Some(dec!(100.05)));

        let snapshot = book.snapshot();
        assert!(snapshot.is_synced());
        assert_eq!(snapshot.spread(), Some(dec!(0.10)));
        assert_eq!(snapshot.sequence, Some(100));
    }
}
