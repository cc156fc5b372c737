//! High-level Blockchain.com Exchange client

use crate::builder::{BcxClientBuilder, ClientConfig};
use bcx_auth::{AuthStatus, Credentials};
use bcx_book::{OrderbookSnapshot, OrderbookState};
use bcx_types::{BcxError, BcxResult, Channel, OrderRequest, SymbolDetails};
use bcx_ws::{
    Connection, ConnectionHandle, Dispatcher, Event, EventCategory, SessionState, Subscription,
    SubscriptionKey, SubscriptionStatus,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// High-level client for the Blockchain.com Exchange WebSocket API
///
/// Owns one connection actor, its subscription registry, book store and
/// event dispatcher. Nothing is shared between client instances.
///
/// # Example
///
/// ```no_run
/// use bcx_sdk::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = BcxClient::builder()
///         .with_environment(Environment::Staging)
///         .with_l2(["BTC-USD"])
///         .on(EventCategory::BookSnapshot, |event| println!("{:?}", event))
///         .connect()
///         .await?;
///
///     if let Some(spread) = client.spread("BTC-USD") {
///         println!("BTC-USD spread: {}", spread);
///     }
///
///     client.close().await?;
///     Ok(())
/// }
/// ```
pub struct BcxClient {
    handle: ConnectionHandle,
    dispatcher: Arc<Dispatcher>,
    close_timeout: Duration,
}

impl BcxClient {
    /// Create a new client builder
    pub fn builder() -> BcxClientBuilder {
        BcxClientBuilder::new()
    }

    /// Connect with the given credentials and configuration
    pub async fn connect(credentials: Option<Credentials>, config: ClientConfig) -> BcxResult<Self> {
        let mut builder = BcxClientBuilder::new().with_config(config);
        builder.credentials = credentials;
        builder.connect().await
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// True when subscriptions and orders can be sent
    pub fn is_connected(&self) -> bool {
        self.state().is_live()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.handle.auth_status()
    }

    /// Subscribe to a channel; `symbol` is required for market data channels
    pub fn subscribe(&self, channel: Channel, symbol: Option<&str>) -> BcxResult<()> {
        self.subscribe_with(Subscription::new(channel, symbol.map(str::to_string)))
    }

    /// Subscribe with explicit options (depth, granularity)
    pub fn subscribe_with(&self, subscription: Subscription) -> BcxResult<()> {
        self.handle.subscribe(subscription)
    }

    pub fn unsubscribe(&self, channel: Channel, symbol: Option<&str>) -> BcxResult<()> {
        self.handle
            .unsubscribe(SubscriptionKey::new(channel, symbol.map(str::to_string)))
    }

    /// Register an event handler
    ///
    /// Handlers run on their own task and receive events of `category` in
    /// order; a handler that falls more than the queue size behind loses
    /// its oldest events.
    pub fn on<F>(&self, category: EventCategory, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.register(category, Arc::new(handler));
    }

    /// Send an order command on the `trading` channel
    ///
    /// Resolves once the frame is written; the outcome arrives as an
    /// `OrderUpdate` event.
    #[instrument(skip(self, order))]
    pub async fn send_order(&self, order: impl Into<OrderRequest>) -> BcxResult<()> {
        self.handle.send_order(order.into()).await
    }

    /// Cancel one order by exchange order id
    pub async fn cancel_order(&self, order_id: impl Into<String>) -> BcxResult<()> {
        self.send_order(OrderRequest::Cancel {
            order_id: order_id.into(),
        })
        .await
    }

    /// Cancel every open order of the session
    pub async fn cancel_all_orders(&self) -> BcxResult<()> {
        self.send_order(OrderRequest::CancelAll).await
    }

    /// Copy of a symbol's orderbook
    pub fn orderbook(&self, symbol: &str) -> Option<OrderbookSnapshot> {
        self.handle.orderbook(symbol)
    }

    /// Get the best bid for a symbol
    pub fn best_bid(&self, symbol: &str) -> Option<Decimal> {
        self.orderbook(symbol).and_then(|book| book.best_bid_price())
    }

    /// Get the best ask for a symbol
    pub fn best_ask(&self, symbol: &str) -> Option<Decimal> {
        self.orderbook(symbol).and_then(|book| book.best_ask_price())
    }

    pub fn spread(&self, symbol: &str) -> Option<Decimal> {
        self.orderbook(symbol).and_then(|book| book.spread())
    }

    pub fn mid_price(&self, symbol: &str) -> Option<Decimal> {
        self.orderbook(symbol).and_then(|book| book.mid_price())
    }

    /// Check if orderbook is synced for a symbol
    pub fn is_synced(&self, symbol: &str) -> bool {
        self.handle.books().state(symbol) == Some(OrderbookState::Synced)
    }

    /// Instrument details from the `symbols` channel, once received
    pub fn symbol_details(&self, symbol: &str) -> Option<SymbolDetails> {
        self.handle.symbol_details(symbol)
    }

    /// Subscriptions and their status, in replay order
    pub fn subscriptions(&self) -> Vec<(SubscriptionKey, SubscriptionStatus)> {
        self.handle.subscriptions()
    }

    /// Events dropped by slow handlers so far
    pub fn dropped_event_count(&self) -> u64 {
        self.dispatcher.overruns()
    }

    /// Connect again after an auth failure or exhausted retries
    pub fn reconnect(&self) -> BcxResult<()> {
        self.handle.reconnect()
    }

    /// Close the session and stop handler tasks
    ///
    /// Waits up to the configured close timeout for the connection task and
    /// again for handlers to drain their queues.
    #[instrument(skip(self))]
    pub async fn close(&self) -> BcxResult<()> {
        let result = self.handle.close(self.close_timeout).await;
        if tokio::time::timeout(self.close_timeout, self.dispatcher.shutdown())
            .await
            .is_err()
        {
            warn!("Event handlers did not drain before the close timeout");
        }
        info!("Client closed");
        result
    }
}

impl std::fmt::Debug for BcxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcxClient")
            .field("state", &self.state())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl BcxClientBuilder {
    /// Validate, start the connection task and return a client
    ///
    /// Returns as soon as the task is running; watch
    /// `ConnectionStateChanged` events or [`BcxClient::state`] for progress.
    #[instrument(skip(self), fields(subscriptions = self.subscriptions.len()))]
    pub async fn connect(self) -> BcxResult<BcxClient> {
        self.validate()
            .map_err(|e| BcxError::Configuration(e.to_string()))?;

        let dispatcher = Arc::new(Dispatcher::new(self.config.handler_queue_size));
        for (category, handler) in self.handlers {
            dispatcher.register(category, handler);
        }

        if let Some(credentials) = &self.credentials {
            info!(identity = %credentials.identity(), "Using credentials");
        }

        let mut connection = Connection::new(
            self.config.to_connection_config(),
            self.credentials,
            Arc::clone(&dispatcher),
        )
        .with_subscriptions(self.subscriptions);
        if let Some(factory) = self.transport_factory {
            connection = connection.with_transport_factory(factory);
        }

        let handle = connection.spawn();
        info!(environment = ?self.config.environment, "Client started");

        Ok(BcxClient {
            handle,
            dispatcher,
            close_timeout: self.config.close_timeout,
        })
    }
}
