//! Per-symbol book storage shared with callers
//!
//! The connection actor is the only writer; callers read snapshots.

use bcx_book::{DeltaOutcome, Orderbook, OrderbookSnapshot, OrderbookState, SequenceGap};
use bcx_types::{BookDelta, BookSnapshot};
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map of symbol to [`Orderbook`]
#[derive(Debug, Clone, Default)]
pub struct BookStore {
    books: Arc<DashMap<String, Orderbook>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty book awaiting its snapshot, if none exists
    pub fn track(&self, symbol: &str) {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| Orderbook::new(symbol));
    }

    /// Replace a book wholesale
    pub fn apply_snapshot(&self, snapshot: &BookSnapshot) {
        self.books
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| Orderbook::new(&snapshot.symbol))
            .apply_book_snapshot(snapshot);
    }

    /// Apply a delta; unknown symbols are suppressed
    pub fn apply_delta(&self, delta: &BookDelta) -> Result<DeltaOutcome, SequenceGap> {
        match self.books.get_mut(&delta.symbol) {
            Some(mut book) => book.apply_book_delta(delta),
            None => Ok(DeltaOutcome::Suppressed(OrderbookState::AwaitingSnapshot)),
        }
    }

    /// Invalidate one symbol; true only on the transition into `Invalid`
    pub fn invalidate(&self, symbol: &str) -> bool {
        self.books
            .get_mut(symbol)
            .map(|mut book| book.invalidate())
            .unwrap_or(false)
    }

    /// Flag every book stale after a connection loss
    pub fn mark_all_stale(&self) {
        for mut book in self.books.iter_mut() {
            book.mark_stale();
        }
    }

    /// Drop a book (on unsubscribe)
    pub fn remove(&self, symbol: &str) {
        self.books.remove(symbol);
    }

    pub fn state(&self, symbol: &str) -> Option<OrderbookState> {
        self.books.get(symbol).map(|book| book.state())
    }

    /// Copy of the current book
    pub fn snapshot(&self, symbol: &str) -> Option<OrderbookSnapshot> {
        self.books.get(symbol).map(|book| book.snapshot())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
