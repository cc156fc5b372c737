//! Client Builder Pattern
//!
//! Provides a fluent builder API for configuring the client with sensible
//! defaults and validation.
//!
//! # Example
//!
//! ```
//! use bcx_sdk::builder::BcxClientBuilder;
//! use bcx_sdk::Environment;
//!
//! let builder = BcxClientBuilder::new()
//!     .with_environment(Environment::Staging)
//!     .with_l2(["BTC-USD", "ETH-USD"])
//!     .with_trades(["BTC-USD"]);
//! assert!(builder.validate().is_ok());
//! ```

use bcx_auth::Credentials;
use bcx_types::Channel;
use bcx_ws::{
    ConnectionConfig, Environment, Event, EventCategory, EventHandler, ReconnectConfig,
    Subscription, SubscriptionError, TransportFactory, DEFAULT_QUEUE_SIZE,
};
use std::sync::Arc;
use std::time::Duration;

pub use bcx_types::SUPPORTED_GRANULARITIES;

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid symbol format
    #[error("invalid symbol format: {symbol} (expected format: BASE-QUOTE, e.g., BTC-USD)")]
    InvalidSymbol { symbol: String },

    /// Channel/symbol combination not allowed
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    /// Private channel without credentials
    #[error("channel {channel} requires credentials")]
    CredentialsRequired { channel: Channel },

    /// Candle granularity not supported
    #[error("invalid granularity: {granularity} (supported: 60, 300, 900, 3600, 21600, 86400)")]
    InvalidGranularity { granularity: u32 },

    /// Timeout too short
    #[error("connection timeout must be at least 1 second")]
    TimeoutTooShort,

    /// Heartbeat timeout of zero
    #[error("heartbeat timeout must be greater than zero")]
    ZeroHeartbeatTimeout,

    /// Handler queue of zero
    #[error("handler queue size must be greater than zero")]
    ZeroQueueSize,
}

impl From<SubscriptionError> for ConfigError {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::InvalidSymbol(invalid) => ConfigError::InvalidSymbol { symbol: invalid.0 },
            SubscriptionError::InvalidGranularity(granularity) => {
                ConfigError::InvalidGranularity { granularity }
            }
            other => ConfigError::InvalidSubscription(other.to_string()),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Silence after which the session reconnects
    pub heartbeat_timeout: Duration,
    /// Reconnection backoff
    pub reconnect: ReconnectConfig,
    /// Per-handler event queue capacity
    pub handler_queue_size: usize,
    /// Gateway environment
    pub environment: Environment,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Explicit gateway URL
    pub url_override: Option<String>,
    /// Cancel all open orders when closing an authenticated session
    pub cancel_orders_on_close: bool,
    /// Subscribe to the `heartbeat` channel
    pub subscribe_heartbeat: bool,
    /// How long `close` waits for the connection task and handlers
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            handler_queue_size: DEFAULT_QUEUE_SIZE,
            environment: Environment::default(),
            connect_timeout: Duration::from_secs(10),
            url_override: None,
            cancel_orders_on_close: false,
            subscribe_heartbeat: true,
            close_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    pub fn with_handler_queue_size(mut self, size: usize) -> Self {
        self.handler_queue_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }

    pub fn with_cancel_orders_on_close(mut self, enabled: bool) -> Self {
        self.cancel_orders_on_close = enabled;
        self
    }

    pub fn with_heartbeat_subscription(mut self, enabled: bool) -> Self {
        self.subscribe_heartbeat = enabled;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Check the numeric settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout < Duration::from_secs(1) {
            return Err(ConfigError::TimeoutTooShort);
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(ConfigError::ZeroHeartbeatTimeout);
        }
        if self.handler_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        Ok(())
    }

    /// Convert to connection config
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new()
            .with_environment(self.environment)
            .with_reconnect(self.reconnect.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_heartbeat_timeout(self.heartbeat_timeout)
            .with_handler_queue_size(self.handler_queue_size)
            .with_heartbeat_subscription(self.subscribe_heartbeat)
            .with_cancel_orders_on_close(self.cancel_orders_on_close);

        if let Some(url) = &self.url_override {
            config = config.with_url(url.clone());
        }
        config
    }
}

/// Builder for configuring a client
///
/// Collects credentials, configuration, initial subscriptions and handlers.
/// Handlers registered here see every event from the first connect on.
#[derive(Clone, Default)]
pub struct BcxClientBuilder {
    /// Client configuration
    pub config: ClientConfig,
    /// API credentials for private channels
    pub credentials: Option<Credentials>,
    /// Subscriptions sent once the session is ready
    pub subscriptions: Vec<Subscription>,
    pub(crate) handlers: Vec<(EventCategory, EventHandler)>,
    pub(crate) transport_factory: Option<TransportFactory>,
}

impl BcxClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate with these credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    /// Connect to a custom gateway URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.config.url_override = Some(url.into());
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.config.heartbeat_timeout = timeout;
        self
    }

    /// Set the reconnection configuration
    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.config.reconnect = config;
        self
    }

    /// Disable automatic reconnection
    pub fn without_reconnect(mut self) -> Self {
        self.config.reconnect = ReconnectConfig::disabled();
        self
    }

    /// Set the connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn with_handler_queue_size(mut self, size: usize) -> Self {
        self.config.handler_queue_size = size;
        self
    }

    /// Cancel all open orders when the client closes
    pub fn cancel_orders_on_close(mut self) -> Self {
        self.config.cancel_orders_on_close = true;
        self
    }

    /// Add a subscription
    pub fn subscribe(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Subscribe to the L2 orderbook for each symbol
    pub fn with_l2(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subscriptions
            .extend(symbols.into_iter().map(Subscription::l2));
        self
    }

    pub fn with_trades(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subscriptions
            .extend(symbols.into_iter().map(Subscription::trades));
        self
    }

    pub fn with_ticker(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subscriptions
            .extend(symbols.into_iter().map(Subscription::ticker));
        self
    }

    /// Subscribe to instrument details (scales, increments, status)
    pub fn with_symbols(mut self, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subscriptions
            .extend(symbols.into_iter().map(Subscription::symbols));
        self
    }

    /// Subscribe to candles with the given granularity in seconds
    pub fn with_prices(
        mut self,
        symbols: impl IntoIterator<Item = impl Into<String>>,
        granularity: u32,
    ) -> Self {
        self.subscriptions.extend(
            symbols
                .into_iter()
                .map(|symbol| Subscription::prices(symbol, granularity)),
        );
        self
    }

    /// Subscribe to account balances (requires credentials)
    pub fn with_balances(mut self) -> Self {
        self.subscriptions.push(Subscription::balances());
        self
    }

    /// Subscribe to order events (requires credentials)
    pub fn with_trading(mut self) -> Self {
        self.subscriptions.push(Subscription::trading());
        self
    }

    /// Register an event handler
    pub fn on<F>(mut self, category: EventCategory, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.push((category, Arc::new(handler)));
        self
    }

    /// Use a custom transport factory (e.g. a mock in tests)
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Validate the configuration
    ///
    /// Returns `Ok(())` if the configuration is valid, otherwise returns
    /// a `ConfigError` describing the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;

        for subscription in &self.subscriptions {
            subscription.validate()?;

            if subscription.channel.is_private() && self.credentials.is_none() {
                return Err(ConfigError::CredentialsRequired {
                    channel: subscription.channel,
                });
            }
        }

        Ok(())
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}

impl std::fmt::Debug for BcxClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcxClientBuilder")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("subscriptions", &self.subscriptions)
            .field("handlers", &self.handlers.len())
            .field("custom_transport", &self.transport_factory.is_some())
            .finish()
    }
}
