//! BTreeMap-based price level storage
//!
//! Uses `Reverse<Decimal>` keys for bids so both sides iterate best-first.

use bcx_types::{BookSide, Level};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Two-sided level storage with O(log N) upserts
///
/// Zero-quantity levels are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeBook {
    /// Highest price first
    bids: BTreeMap<Reverse<Decimal>, Level>,
    /// Lowest price first
    asks: BTreeMap<Decimal, Level>,
}

impl TreeBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replace or remove a level; zero quantity removes it
    pub fn upsert(&mut self, side: BookSide, price: Decimal, qty: Decimal, orders: u32) {
        match side {
            BookSide::Bid => {
                if qty.is_zero() {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), Level::new(price, qty, orders));
                }
            }
            BookSide::Ask => {
                if qty.is_zero() {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, Level::new(price, qty, orders));
                }
            }
        }
    }

    /// Look up the level at an exact price
    pub fn level(&self, side: BookSide, price: Decimal) -> Option<&Level> {
        match side {
            BookSide::Bid => self.bids.get(&Reverse(price)),
            BookSide::Ask => self.asks.get(&price),
        }
    }

    /// Best bid (highest price)
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.values().next()
    }

    /// Best ask (lowest price)
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.values().next()
    }

    /// Bids, highest to lowest price
    pub fn bids(&self) -> impl Iterator<Item = &Level> {
        self.bids.values()
    }

    /// Asks, lowest to highest price
    pub fn asks(&self) -> impl Iterator<Item = &Level> {
        self.asks.values()
    }

    /// Top `n` levels of one side
    pub fn top(&self, side: BookSide, n: usize) -> Vec<Level> {
        match side {
            BookSide::Bid => self.bids.values().take(n).cloned().collect(),
            BookSide::Ask => self.asks.values().take(n).cloned().collect(),
        }
    }

    /// Number of levels on one side
    pub fn len(&self, side: BookSide) -> usize {
        match side {
            BookSide::Bid => self.bids.len(),
            BookSide::Ask => self.asks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}
