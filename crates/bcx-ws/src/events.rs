//! Normalized events delivered to handlers
//!
//! Every inbound frame is decoded once into the closed [`Event`] enum.
//! Handlers register per [`EventCategory`].

use crate::session::SessionState;
use bcx_types::{
    BalanceData, BookDelta, BookSnapshot, CandleData, Channel, OrderReport, SymbolDetails,
    TickerData, TradeData,
};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Server closed the connection
    ServerClosed,
    /// Network error on an established connection
    NetworkError(String),
    /// Connect attempt failed or timed out
    ConnectFailed(String),
    /// No frame within the heartbeat timeout
    HeartbeatTimeout,
    /// Connection-level `seqnum` skipped ahead, frames were lost
    MessageGap { expected: u64, received: u64 },
    /// Exchange rejected the credentials
    AuthFailed(String),
    /// Backoff gave up
    RetriesExhausted,
    /// Client requested shutdown
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerClosed => write!(f, "server closed the connection"),
            Self::NetworkError(e) => write!(f, "network error: {}", e),
            Self::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            Self::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            Self::MessageGap { expected, received } => {
                write!(f, "message gap: expected seqnum {}, received {}", expected, received)
            }
            Self::AuthFailed(reason) => write!(f, "authentication failed: {}", reason),
            Self::RetriesExhausted => write!(f, "reconnect attempts exhausted"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Classification of [`Event::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect attempt failed; retried via backoff
    ConnectError,
    /// Credentials rejected; terminal
    AuthFailed,
    /// Frame could not be decoded and was skipped
    ProtocolDecodeError,
    /// Book sequence gap; the symbol is resynchronizing
    SequenceGap,
    /// A handler queue overflowed and dropped its oldest event
    HandlerOverrun,
    /// Writing a frame failed
    SendError,
}

/// Outcome carried by a subscription acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    Subscribed,
    Unsubscribed,
    Rejected { reason: String },
}

/// All events the client emits
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Liveness frame from the `heartbeat` channel
    Heartbeat { timestamp: Option<DateTime<Utc>> },
    /// Result of the auth handshake
    AuthResult {
        authenticated: bool,
        reason: Option<String>,
    },
    /// Subscription acknowledgement
    SubscriptionAck {
        channel: Channel,
        symbol: Option<String>,
        status: AckStatus,
    },
    /// Full L2 book for a symbol
    BookSnapshot(BookSnapshot),
    /// Contiguous L2 update for a symbol
    BookDelta(BookDelta),
    /// Public trade
    Trade(TradeData),
    /// Ticker statistics
    Ticker(TickerData),
    /// Candle from the `prices` channel
    Candle(CandleData),
    /// Instrument details from the `symbols` channel, updates already merged
    SymbolDetails {
        details: SymbolDetails,
        is_snapshot: bool,
    },
    /// Order state changes
    OrderUpdate {
        orders: Vec<OrderReport>,
        is_snapshot: bool,
    },
    /// Account balances
    BalanceUpdate {
        balances: Vec<BalanceData>,
        is_snapshot: bool,
    },
    /// Session state machine moved
    ConnectionStateChanged {
        from: SessionState,
        to: SessionState,
        reason: Option<DisconnectReason>,
    },
    /// Non-fatal or terminal error report
    Error {
        kind: ErrorKind,
        symbol: Option<String>,
        message: String,
    },
}

/// Handler registration key, one per [`Event`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventCategory {
    Heartbeat,
    AuthResult,
    SubscriptionAck,
    BookSnapshot,
    BookDelta,
    Trade,
    Ticker,
    Candle,
    SymbolDetails,
    OrderUpdate,
    BalanceUpdate,
    ConnectionStateChanged,
    Error,
}

impl Event {
    /// Category used for handler routing
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Heartbeat { .. } => EventCategory::Heartbeat,
            Self::AuthResult { .. } => EventCategory::AuthResult,
            Self::SubscriptionAck { .. } => EventCategory::SubscriptionAck,
            Self::BookSnapshot(_) => EventCategory::BookSnapshot,
            Self::BookDelta(_) => EventCategory::BookDelta,
            Self::Trade(_) => EventCategory::Trade,
            Self::Ticker(_) => EventCategory::Ticker,
            Self::Candle(_) => EventCategory::Candle,
            Self::SymbolDetails { .. } => EventCategory::SymbolDetails,
            Self::OrderUpdate { .. } => EventCategory::OrderUpdate,
            Self::BalanceUpdate { .. } => EventCategory::BalanceUpdate,
            Self::ConnectionStateChanged { .. } => EventCategory::ConnectionStateChanged,
            Self::Error { .. } => EventCategory::Error,
        }
    }

    /// Symbol the event refers to, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::SubscriptionAck { symbol, .. } | Self::Error { symbol, .. } => symbol.as_deref(),
            Self::BookSnapshot(s) => Some(&s.symbol),
            Self::BookDelta(d) => Some(&d.symbol),
            Self::Trade(t) => Some(&t.symbol),
            Self::Ticker(t) => Some(&t.symbol),
            Self::Candle(c) => Some(&c.symbol),
            Self::SymbolDetails { details, .. } => Some(&details.symbol),
            _ => None,
        }
    }

    /// Build an error event
    pub fn error(kind: ErrorKind, symbol: Option<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            symbol,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<BookSnapshot> for Event {
    fn from(snapshot: BookSnapshot) -> Self {
        Event::BookSnapshot(snapshot)
    }
}

impl From<BookDelta> for Event {
    fn from(delta: BookDelta) -> Self {
        Event::BookDelta(delta)
    }
}

impl From<TradeData> for Event {
    fn from(trade: TradeData) -> Self {
        Event::Trade(trade)
    }
}

impl From<TickerData> for Event {
    fn from(ticker: TickerData) -> Self {
        Event::Ticker(ticker)
    }
}

impl From<CandleData> for Event {
    fn from(candle: CandleData) -> Self {
        Event::Candle(candle)
    }
}
