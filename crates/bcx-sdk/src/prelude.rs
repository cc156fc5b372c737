//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use bcx_sdk::prelude::*;
//! ```

// Client
pub use crate::builder::{BcxClientBuilder, ClientConfig, ConfigError, SUPPORTED_GRANULARITIES};
pub use crate::client::BcxClient;

// Types from bcx-types
pub use bcx_types::{
    BalanceData, BcxError, BcxResult, BookDelta, BookSide, BookSnapshot, CandleData, Channel,
    Level, LevelChange, NewOrder, OrderReport, OrderRequest, OrderStatus, OrderType, Side,
    SymbolDetails, TickerData, TimeInForce, TradeData,
};

// Credentials
pub use bcx_auth::{AuthStatus, Credentials};

// WebSocket types
pub use bcx_ws::{
    AckStatus, DisconnectReason, Environment, ErrorKind, Event, EventCategory, ReconnectConfig,
    SessionState, Subscription, SubscriptionKey, SubscriptionStatus,
};

// Orderbook types
pub use bcx_book::{Orderbook, OrderbookSnapshot, OrderbookState};

// Decimal for prices/quantities
pub use rust_decimal::Decimal;
