//! Subscription registry
//!
//! Records what the caller asked for, tracks acknowledgements, and yields the
//! deterministic replay list after a reconnect.

use crate::events::AckStatus;
use bcx_types::{
    check_symbol, BcxError, Channel, SubscribeRequest, DEFAULT_GRANULARITY, SUPPORTED_GRANULARITIES,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a subscription cannot be sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("channel {0} requires a symbol")]
    MissingSymbol(Channel),

    #[error("channel {channel} does not take a symbol (got {symbol})")]
    UnexpectedSymbol { channel: Channel, symbol: String },

    #[error("the auth channel is managed by the session")]
    ManagedChannel,

    #[error(transparent)]
    InvalidSymbol(#[from] bcx_types::InvalidSymbol),

    #[error("invalid granularity: {0} (supported: 60, 300, 900, 3600, 21600, 86400)")]
    InvalidGranularity(u32),
}

impl From<SubscriptionError> for BcxError {
    fn from(e: SubscriptionError) -> Self {
        BcxError::InvalidSubscription(e.to_string())
    }
}

/// Registry key: one subscription per (channel, symbol)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub channel: Channel,
    pub symbol: Option<String>,
}

impl SubscriptionKey {
    pub fn new(channel: Channel, symbol: Option<String>) -> Self {
        Self { channel, symbol }
    }
}

// Replay order: channel name, then symbol, lexicographic
impl Ord for SubscriptionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.channel
            .as_str()
            .cmp(other.channel.as_str())
            .then_with(|| self.symbol.cmp(&other.symbol))
    }
}

impl PartialOrd for SubscriptionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A requested channel subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Channel type
    pub channel: Channel,
    /// Symbol, for market data channels
    pub symbol: Option<String>,
    /// Book depth (l2 only)
    pub depth: Option<u32>,
    /// Candle granularity in seconds (prices only)
    pub granularity: Option<u32>,
}

impl Subscription {
    pub fn new(channel: Channel, symbol: Option<String>) -> Self {
        let granularity = (channel == Channel::Prices).then_some(DEFAULT_GRANULARITY);
        Self {
            channel,
            symbol,
            depth: None,
            granularity,
        }
    }

    /// L2 orderbook subscription
    pub fn l2(symbol: impl Into<String>) -> Self {
        Self::new(Channel::L2, Some(symbol.into()))
    }

    pub fn trades(symbol: impl Into<String>) -> Self {
        Self::new(Channel::Trades, Some(symbol.into()))
    }

    pub fn ticker(symbol: impl Into<String>) -> Self {
        Self::new(Channel::Ticker, Some(symbol.into()))
    }

    /// Instrument details for a symbol
    pub fn symbols(symbol: impl Into<String>) -> Self {
        Self::new(Channel::Symbols, Some(symbol.into()))
    }

    /// Candles with the given granularity in seconds
    pub fn prices(symbol: impl Into<String>, granularity: u32) -> Self {
        Self {
            granularity: Some(granularity),
            ..Self::new(Channel::Prices, Some(symbol.into()))
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(Channel::Heartbeat, None)
    }

    pub fn balances() -> Self {
        Self::new(Channel::Balances, None)
    }

    pub fn trading() -> Self {
        Self::new(Channel::Trading, None)
    }

    /// Limit the requested book depth
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.channel, self.symbol.clone())
    }

    /// Check the symbol matches the channel kind and the options are supported
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.channel == Channel::Auth {
            return Err(SubscriptionError::ManagedChannel);
        }
        match (self.channel.is_symbol_specific(), &self.symbol) {
            (true, None) => return Err(SubscriptionError::MissingSymbol(self.channel)),
            (false, Some(symbol)) => {
                return Err(SubscriptionError::UnexpectedSymbol {
                    channel: self.channel,
                    symbol: symbol.clone(),
                })
            }
            (true, Some(symbol)) => check_symbol(symbol)?,
            (false, None) => {}
        }
        match self.granularity {
            Some(granularity) if !SUPPORTED_GRANULARITIES.contains(&granularity) => {
                Err(SubscriptionError::InvalidGranularity(granularity))
            }
            _ => Ok(()),
        }
    }

    /// Subscribe request for this subscription
    pub fn to_request(&self) -> SubscribeRequest {
        SubscribeRequest::subscribe(self.channel, self.symbol.clone())
            .with_granularity(self.granularity)
            .with_depth(self.depth)
    }

    /// Unsubscribe request for this subscription
    pub fn to_unsubscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest::unsubscribe(self.channel, self.symbol.clone())
            .with_granularity(self.granularity)
    }
}

/// Where a subscription stands with the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Sent (or to be sent), not acknowledged yet
    Pending,
    /// Acknowledged
    Confirmed,
    /// Unsubscribe sent, not acknowledged yet
    PendingRemoval,
    /// Rejected by the exchange; never replayed
    Rejected(String),
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    pub subscription: Subscription,
    pub status: SubscriptionStatus,
}

/// Registry of subscriptions, unique per (channel, symbol)
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<SubscriptionKey, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription as `Pending`
    ///
    /// Returns true if a subscribe command must be sent, false if an
    /// identical subscription is already pending or confirmed.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        let key = subscription.key();
        if let Some(entry) = self.entries.get(&key) {
            let active = matches!(
                entry.status,
                SubscriptionStatus::Pending | SubscriptionStatus::Confirmed
            );
            if active && entry.subscription == subscription {
                return false;
            }
        }

        self.entries.insert(
            key,
            SubscriptionEntry {
                subscription,
                status: SubscriptionStatus::Pending,
            },
        );
        true
    }

    /// Mark a subscription `PendingRemoval`
    ///
    /// Returns the subscription if an unsubscribe command must be sent.
    /// Rejected entries are dropped at once since the exchange never knew them.
    pub fn unsubscribe(&mut self, key: &SubscriptionKey) -> Option<Subscription> {
        let entry = self.entries.get_mut(key)?;
        match entry.status {
            SubscriptionStatus::PendingRemoval => None,
            SubscriptionStatus::Rejected(_) => {
                self.entries.remove(key);
                None
            }
            _ => {
                entry.status = SubscriptionStatus::PendingRemoval;
                Some(entry.subscription.clone())
            }
        }
    }

    /// Apply an acknowledgement; returns the resulting status (`None` if removed or unknown)
    ///
    /// Acks without a symbol on a symbol-specific channel apply to the first
    /// entry of that channel still waiting for an answer.
    pub fn apply_ack(
        &mut self,
        channel: Channel,
        symbol: Option<&str>,
        ack: &AckStatus,
    ) -> Option<SubscriptionStatus> {
        let key = self.resolve(channel, symbol)?;
        let current = self.entries.get(&key)?.status.clone();

        let next = match (ack, current) {
            (AckStatus::Subscribed, SubscriptionStatus::Pending) => SubscriptionStatus::Confirmed,
            (AckStatus::Unsubscribed | AckStatus::Rejected { .. }, SubscriptionStatus::PendingRemoval) => {
                self.entries.remove(&key);
                return None;
            }
            (AckStatus::Rejected { reason }, _) => SubscriptionStatus::Rejected(reason.clone()),
            (_, unchanged) => unchanged,
        };

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.status = next.clone();
        }
        Some(next)
    }

    fn resolve(&self, channel: Channel, symbol: Option<&str>) -> Option<SubscriptionKey> {
        let exact = SubscriptionKey::new(channel, symbol.map(str::to_string));
        if self.entries.contains_key(&exact) {
            return Some(exact);
        }
        if symbol.is_some() || !channel.is_symbol_specific() {
            return None;
        }
        self.entries
            .iter()
            .find(|(key, entry)| {
                key.channel == channel
                    && matches!(
                        entry.status,
                        SubscriptionStatus::Pending | SubscriptionStatus::PendingRemoval
                    )
            })
            .map(|(key, _)| key.clone())
    }

    /// Subscriptions to resend on a new connection, in deterministic order,
    /// plus the keys of pending removals dropped on the way
    ///
    /// Confirmed and pending entries go back to `Pending`; pending removals
    /// are dropped; rejected entries are kept but not replayed.
    pub fn replay(&mut self) -> (Vec<Subscription>, Vec<SubscriptionKey>) {
        let mut dropped = Vec::new();
        self.entries.retain(|key, entry| {
            let keep = entry.status != SubscriptionStatus::PendingRemoval;
            if !keep {
                dropped.push(key.clone());
            }
            keep
        });

        let subscriptions = self
            .entries
            .values_mut()
            .filter(|entry| {
                matches!(
                    entry.status,
                    SubscriptionStatus::Pending | SubscriptionStatus::Confirmed
                )
            })
            .map(|entry| {
                entry.status = SubscriptionStatus::Pending;
                entry.subscription.clone()
            })
            .collect();
        (subscriptions, dropped)
    }

    /// Flag a subscription `Pending` while its snapshot is re-requested
    pub fn mark_resync(&mut self, key: &SubscriptionKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.status != SubscriptionStatus::PendingRemoval => {
                entry.status = SubscriptionStatus::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        self.entries.get(key)
    }

    pub fn status(&self, key: &SubscriptionKey) -> Option<SubscriptionStatus> {
        self.entries.get(key).map(|e| e.status.clone())
    }

    /// Snapshot of all entries in replay order
    pub fn entries(&self) -> Vec<(SubscriptionKey, SubscriptionStatus)> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.status.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
