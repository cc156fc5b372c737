//! High-level SDK for the Blockchain.com Exchange WebSocket API
//!
//! This crate wraps the `bcx-ws` connection actor in a client that handles
//! configuration validation, handler registration and orderbook queries.
//!
//! # Quick Start
//!
//! ```no_run
//! use bcx_sdk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BcxClient::builder()
//!         .with_l2(["BTC-USD", "ETH-USD"])
//!         .with_trades(["BTC-USD"])
//!         .on(EventCategory::Trade, |event| println!("{:?}", event))
//!         .on(EventCategory::Error, |event| eprintln!("{:?}", event))
//!         .connect()
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     if let Some(mid) = client.mid_price("BTC-USD") {
//!         println!("BTC-USD mid: {}", mid);
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **Simple API**: Builder pattern for configuration
//! - **Automatic Reconnection**: Exponential backoff with jitter
//! - **Orderbook Management**: Sequence tracking with per-symbol resync
//! - **Isolated Handlers**: Each handler has its own bounded queue

pub mod builder;
pub mod client;
pub mod prelude;

// Re-export main types
pub use builder::{BcxClientBuilder, ClientConfig, ConfigError};
pub use client::BcxClient;

// Re-export commonly used types from dependencies
pub use bcx_auth::{AuthStatus, Credentials};
pub use bcx_book::{Orderbook, OrderbookSnapshot, OrderbookState};
pub use bcx_types::{BcxError, BcxResult, Channel, Level, SymbolDetails};
pub use bcx_ws::{Environment, Event, EventCategory, ReconnectConfig, SessionState};
