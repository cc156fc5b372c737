//! Sequence-checked L2 orderbook engine
//!
//! This crate holds the price-level storage and the per-symbol reconstructor
//! that turns a snapshot plus contiguous deltas into a live book.
//!
//! - NO `tokio`
//! - NO networking code
//!
//! # Example
//!
//! ```
//! use bcx_book::{Orderbook, OrderbookState};
//!
//! let book = Orderbook::new("BTC-USD");
//! assert_eq!(book.state(), OrderbookState::AwaitingSnapshot);
//! ```

pub mod orderbook;
pub mod storage;

// Re-export main types
pub use orderbook::{DeltaOutcome, Orderbook, OrderbookSnapshot, OrderbookState, SequenceGap};
pub use storage::TreeBook;
