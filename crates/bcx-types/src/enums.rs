//! Channel, Side, OrderType, and status enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// WebSocket channel types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Heartbeat channel - liveness messages every few seconds
    Heartbeat,
    /// Level 2 orderbook (aggregated price levels)
    L2,
    /// Market trades
    Trades,
    /// Ticker - last trade price and 24h statistics
    Ticker,
    /// Candlestick data
    Prices,
    /// Instrument reference data (scales, increments, status)
    Symbols,
    /// Authentication handshake
    Auth,
    /// Private balance updates
    Balances,
    /// Private order entry and order events
    Trading,
}

impl Channel {
    /// Every channel the client understands
    pub const ALL: [Channel; 9] = [
        Channel::Heartbeat,
        Channel::L2,
        Channel::Trades,
        Channel::Ticker,
        Channel::Prices,
        Channel::Symbols,
        Channel::Auth,
        Channel::Balances,
        Channel::Trading,
    ];

    /// Returns the channel name as used in API messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::L2 => "l2",
            Self::Trades => "trades",
            Self::Ticker => "ticker",
            Self::Prices => "prices",
            Self::Symbols => "symbols",
            Self::Auth => "auth",
            Self::Balances => "balances",
            Self::Trading => "trading",
        }
    }

    /// Parse a channel name from a message
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Returns true if this channel requires an authenticated session
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Auth | Self::Balances | Self::Trading)
    }

    /// Returns true if subscriptions to this channel carry a symbol
    pub fn is_symbol_specific(&self) -> bool {
        matches!(
            self,
            Self::L2 | Self::Trades | Self::Ticker | Self::Prices | Self::Symbols
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order / trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

/// Side of the orderbook a price level belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Resting buy interest, best (highest) price first
    Bid,
    /// Resting sell interest, best (lowest) price first
    Ask,
}

/// Order types accepted by the trading channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute immediately at the best available price
    #[serde(rename = "market")]
    Market,
    /// Execute at the given price or better
    #[serde(rename = "limit")]
    Limit,
    /// Market order triggered at the stop price
    #[serde(rename = "stop")]
    Stop,
    /// Limit order triggered at the stop price
    #[serde(rename = "stopLimit")]
    StopLimit,
}

impl OrderType {
    /// Returns true if the order type carries a limit price
    pub fn requires_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Returns true if the order type carries a stop price
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, Self::Stop | Self::StopLimit)
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
    /// Good till date
    Gtd,
}

/// Order lifecycle status reported on the trading channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted but not yet working
    Pending,
    /// Working in the book
    Open,
    /// Partially filled, still working
    Partial,
    /// Completely filled
    Filled,
    /// Cancelled
    Cancelled,
    /// Expired
    Expired,
    /// Rejected by the exchange
    Rejected,
}

impl OrderStatus {
    /// Parse from status string, treating unknown values as rejected
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "open" | "new" => Self::Open,
            "partial" | "partially_filled" => Self::Partial,
            "filled" => Self::Filled,
            "cancelled" | "canceled" => Self::Cancelled,
            "expired" => Self::Expired,
            _ => Self::Rejected,
        }
    }

    /// Check if order is terminal (no more changes)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired | Self::Rejected)
    }
}

/// The `event` discriminator carried by every inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEvent {
    /// The subscription was accepted
    Subscribed,
    /// The subscription was removed
    Unsubscribed,
    /// The last action for the channel was rejected
    Rejected,
    /// Full channel state
    Snapshot,
    /// Incremental channel update
    Updated,
}
