//! Shared types for the Blockchain.com Exchange WebSocket API
//!
//! This crate provides the core type definitions used across the bcx client
//! crates. It has minimal dependencies and can be used independently.
//!
//! # Key Types
//!
//! - [`check_symbol`] - `BASE-QUOTE` symbol format (e.g., "BTC-USD")
//! - [`Level`] - Orderbook price level with decimal precision
//! - [`Channel`], [`Side`], [`BookSide`] - Subscription and book enums
//! - [`SubscribeRequest`], [`AuthRequest`], [`OrderRequest`] - Outbound payloads
//! - [`BookSnapshot`], [`BookDelta`] - Normalized L2 data
//! - [`BcxError`] - Error types

pub mod enums;
pub mod error;
pub mod level;
pub mod messages;
pub mod symbol;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
pub use level::*;
pub use messages::*;
pub use symbol::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
