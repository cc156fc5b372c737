//! Native WebSocket stream client for the Blockchain.com Exchange
//!
//! This crate implements the mercury gateway protocol: transport, wire
//! codec, session state machine, subscription registry, order book store
//! and event dispatcher, driven by a single connection actor.
//!
//! # Features
//!
//! - Automatic reconnection with exponential backoff and jitter
//! - Subscription replay after reconnect, in deterministic order
//! - Per-symbol orderbook reconstruction with sequence gap recovery
//! - Bounded per-handler event queues (drop-oldest)
//!
//! # Example
//!
//! ```no_run
//! use bcx_ws::{Connection, ConnectionConfig, Dispatcher, Environment, EventCategory, Subscription};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new().with_environment(Environment::Staging);
//!     let dispatcher = Arc::new(Dispatcher::new(config.handler_queue_size));
//!     dispatcher.register(EventCategory::BookSnapshot, Arc::new(|event| println!("{:?}", event)));
//!
//!     let handle = Connection::new(config, None, dispatcher)
//!         .with_subscriptions([Subscription::l2("BTC-USD")])
//!         .spawn();
//!
//!     tokio::time::sleep(Duration::from_secs(30)).await;
//!     handle.close(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

pub mod books;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod events;
pub mod reconnect;
pub mod session;
pub mod subscription;
pub mod transport;

// Re-export main types
pub use books::BookStore;
pub use codec::{CodecError, Decoded, JsonCodec, WireCodec};
pub use connection::{Command, Connection, ConnectionConfig, ConnectionHandle, SharedState};
pub use dispatcher::{DispatchReport, Dispatcher, EventHandler, DEFAULT_QUEUE_SIZE};
pub use endpoint::Environment;
pub use events::{AckStatus, DisconnectReason, ErrorKind, Event, EventCategory};
pub use reconnect::{Backoff, ReconnectConfig};
pub use session::{transition, SessionAction, SessionInput, SessionState, Transition};
pub use subscription::{
    Subscription, SubscriptionEntry, SubscriptionError, SubscriptionKey, SubscriptionRegistry,
    SubscriptionStatus,
};
pub use transport::{Transport, TransportError, TransportFactory, WsTransport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{mock_factory, MockPeer, MockTransport};
