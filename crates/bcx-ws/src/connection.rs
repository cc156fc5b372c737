//! Connection actor
//!
//! A single tokio task owns the transport, the codec and every write to the
//! session state, subscription registry and book store. Callers talk to it
//! through [`ConnectionHandle`], which sends commands over a channel and reads
//! the shared views.

use crate::books::BookStore;
use crate::codec::{JsonCodec, WireCodec};
use crate::dispatcher::{Dispatcher, DEFAULT_QUEUE_SIZE};
use crate::endpoint::Environment;
use crate::events::{AckStatus, DisconnectReason, ErrorKind, Event};
use crate::reconnect::{Backoff, ReconnectConfig};
use crate::session::{transition, SessionAction, SessionInput, SessionState};
use crate::subscription::{Subscription, SubscriptionKey, SubscriptionRegistry, SubscriptionStatus};
use crate::transport::{Transport, TransportError, TransportFactory, WsTransport};

use bcx_auth::{AuthStatus, Credentials};
use bcx_book::{DeltaOutcome, OrderbookSnapshot};
use bcx_types::{BcxError, BcxResult, BookDelta, BookSnapshot, Channel, OrderRequest, SymbolDetails};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for the connection actor
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway environment
    pub environment: Environment,
    /// Explicit URL, overriding the environment's
    pub url_override: Option<String>,
    /// Reconnection settings
    pub reconnect: ReconnectConfig,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Silence after which the session reconnects; half of it degrades the session
    pub heartbeat_timeout: Duration,
    /// Per-handler event queue capacity
    pub handler_queue_size: usize,
    /// Subscribe to the `heartbeat` channel on connect
    pub subscribe_heartbeat: bool,
    /// Cancel all open orders before closing an authenticated session
    pub cancel_orders_on_close: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            url_override: None,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(10),
            handler_queue_size: DEFAULT_QUEUE_SIZE,
            subscribe_heartbeat: true,
            cancel_orders_on_close: false,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Connect to a custom URL instead of the environment's gateway
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    /// Give up after the first failure
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect = ReconnectConfig::disabled();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_handler_queue_size(mut self, size: usize) -> Self {
        self.handler_queue_size = size;
        self
    }

    pub fn with_heartbeat_subscription(mut self, enabled: bool) -> Self {
        self.subscribe_heartbeat = enabled;
        self
    }

    pub fn with_cancel_orders_on_close(mut self, enabled: bool) -> Self {
        self.cancel_orders_on_close = enabled;
        self
    }

    /// URL the actor connects to
    pub fn url(&self) -> String {
        self.url_override
            .clone()
            .unwrap_or_else(|| self.environment.url().to_string())
    }
}

/// Commands accepted by the actor
#[derive(Debug)]
pub enum Command {
    Subscribe(Subscription),
    Unsubscribe(SubscriptionKey),
    SendOrder {
        order: OrderRequest,
        reply: oneshot::Sender<BcxResult<()>>,
    },
    /// Connect again after a terminal disconnect
    Connect,
    Close,
}

/// State shared between the actor (writer) and its handle (reader)
#[derive(Clone)]
pub struct SharedState {
    pub session: Arc<RwLock<SessionState>>,
    pub auth: Arc<RwLock<AuthStatus>>,
    pub registry: Arc<RwLock<SubscriptionRegistry>>,
    pub books: BookStore,
    /// Latest `symbols` channel details per symbol
    pub symbols: Arc<DashMap<String, SymbolDetails>>,
    pub dispatcher: Arc<Dispatcher>,
}

impl SharedState {
    fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            session: Arc::new(RwLock::new(SessionState::Disconnected)),
            auth: Arc::new(RwLock::new(AuthStatus::Unauthenticated)),
            registry: Arc::new(RwLock::new(SubscriptionRegistry::new())),
            books: BookStore::new(),
            symbols: Arc::new(DashMap::new()),
            dispatcher,
        }
    }
}

/// The connection actor; consumed by [`Connection::spawn`]
pub struct Connection {
    config: ConnectionConfig,
    credentials: Option<Credentials>,
    factory: TransportFactory,
    codec: Box<dyn WireCodec>,
    transport: Option<Box<dyn Transport>>,
    commands: mpsc::UnboundedReceiver<Command>,
    shared: SharedState,
    backoff: Backoff,
    /// Last connection-level `seqnum` on the current transport
    last_seqnum: Option<u64>,
    /// Symbols whose book must be re-requested
    resyncs: BTreeSet<String>,
    closing: bool,
}

impl Connection {
    /// Create an actor using real WebSocket transports and the JSON codec
    pub fn new(config: ConnectionConfig, credentials: Option<Credentials>, dispatcher: Arc<Dispatcher>) -> Self {
        let origin = config
            .url_override
            .is_none()
            .then(|| config.environment.origin().to_string());
        let factory = WsTransport::factory(config.connect_timeout, origin);
        // Replaced in `spawn`, where the handle gets the only sender
        let (_, commands) = mpsc::unbounded_channel();

        Self {
            backoff: Backoff::new(config.reconnect.clone()),
            config,
            credentials,
            factory,
            codec: Box::new(JsonCodec::new()),
            transport: None,
            commands,
            shared: SharedState::new(dispatcher),
            last_seqnum: None,
            resyncs: BTreeSet::new(),
            closing: false,
        }
    }

    /// Replace the transport factory
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Replace the wire codec
    pub fn with_codec(mut self, codec: Box<dyn WireCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Record subscriptions to send once the session is ready
    pub fn with_subscriptions(self, subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        {
            let mut registry = self.shared.registry.write();
            for subscription in subscriptions {
                if let (Channel::L2, Some(symbol)) = (subscription.channel, &subscription.symbol) {
                    self.shared.books.track(symbol);
                }
                registry.subscribe(subscription);
            }
        }
        self
    }

    /// Start the actor on the current runtime
    pub fn spawn(mut self) -> ConnectionHandle {
        if self.config.subscribe_heartbeat {
            self.shared.registry.write().subscribe(Subscription::heartbeat());
        }

        let (commands, receiver) = mpsc::unbounded_channel();
        self.commands = receiver;

        let handle = ConnectionHandle {
            commands,
            shared: self.shared.clone(),
            has_credentials: self.credentials.is_some(),
            task: Mutex::new(None),
        };
        let task = tokio::spawn(self.run());
        *handle.task.lock() = Some(task);
        handle
    }

    async fn run(mut self) {
        self.advance(SessionInput::Connect, None).await;

        while !self.closing {
            match self.state() {
                SessionState::Connecting => self.establish().await,
                SessionState::Authenticating | SessionState::Ready | SessionState::Degraded => {
                    self.pump().await
                }
                SessionState::Reconnecting => self.wait_backoff().await,
                SessionState::Disconnected => {
                    let command = self.commands.recv().await;
                    self.on_command(command).await;
                }
            }
        }

        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        info!("Connection actor stopped");
    }

    fn state(&self) -> SessionState {
        *self.shared.session.read()
    }

    /// Dispatch an event; dropped deltas queue their symbol for resync
    fn emit(&mut self, event: impl Into<Event>) {
        let report = self.shared.dispatcher.dispatch(event.into());
        for dropped in report.dropped {
            if let Event::BookDelta(delta) = dropped {
                let message = format!("delta {} dropped by a slow handler", delta.sequence);
                self.resync_book(delta.symbol, message);
            }
        }
    }

    /// Feed an input to the state machine and perform its actions
    async fn advance(&mut self, input: SessionInput, reason: Option<DisconnectReason>) {
        let mut pending = Some((input, reason));

        while let Some((input, reason)) = pending.take() {
            let from = self.state();
            let step = transition(from, input);
            if step.changes(from) {
                *self.shared.session.write() = step.next;
                info!(%from, to = %step.next, ?input, "Session state changed");
                self.emit(Event::ConnectionStateChanged {
                    from,
                    to: step.next,
                    reason: reason.clone(),
                });
            }

            for action in step.actions {
                if let Err(e) = self.perform(action, reason.as_ref()).await {
                    warn!(error = %e, ?action, "Transport failed while performing session action");
                    self.emit(Event::error(ErrorKind::SendError, None, e.to_string()));
                    if e.is_fatal() {
                        pending = Some((
                            SessionInput::TransportLost,
                            Some(DisconnectReason::NetworkError(e.to_string())),
                        ));
                        break;
                    }
                }
            }
        }
    }

    async fn perform(&mut self, action: SessionAction, reason: Option<&DisconnectReason>) -> Result<(), TransportError> {
        match action {
            SessionAction::SendAuth => {
                let Some(credentials) = self.credentials.as_ref() else {
                    return Ok(());
                };
                info!(identity = %credentials.identity(), "Authenticating");
                match self.codec.encode_auth(credentials) {
                    Ok(frame) => {
                        *self.shared.auth.write() = AuthStatus::Pending;
                        self.send_frame(&frame).await?;
                    }
                    Err(e) => error!(error = %e, "Failed to encode auth frame"),
                }
            }
            SessionAction::ReplaySubscriptions => {
                self.backoff.reset();
                let (subscriptions, dropped) = self.shared.registry.write().replay();
                for key in &dropped {
                    self.forget(key);
                }
                info!(count = subscriptions.len(), dropped = dropped.len(), "Replaying subscriptions");
                for subscription in subscriptions {
                    if let (Channel::L2, Some(symbol)) = (subscription.channel, &subscription.symbol) {
                        self.shared.books.track(symbol);
                    }
                    match self.codec.encode_subscribe(&subscription) {
                        Ok(frame) => {
                            debug!(channel = %subscription.channel, symbol = ?subscription.symbol, "Sending subscription");
                            self.send_frame(&frame).await?;
                        }
                        Err(e) => warn!(error = %e, "Failed to encode subscription"),
                    }
                }
            }
            SessionAction::MarkBooksStale => {
                self.shared.books.mark_all_stale();
                self.resyncs.clear();
            }
            SessionAction::CloseTransport => {
                if let Some(mut transport) = self.transport.take() {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "Error closing transport");
                    }
                }
                let mut auth = self.shared.auth.write();
                if !matches!(*auth, AuthStatus::Failed(_)) {
                    *auth = AuthStatus::Unauthenticated;
                }
            }
            SessionAction::ReportAuthFailure => {
                let message = match reason {
                    Some(DisconnectReason::AuthFailed(text)) => text.clone(),
                    _ => "authentication rejected".to_string(),
                };
                error!(reason = %message, "Authentication failed, not retrying");
                self.emit(Event::error(ErrorKind::AuthFailed, None, message));
            }
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        transport.send(frame).await
    }

    /// Report a failed send; a dead socket also ends the session
    async fn send_failed(&mut self, error: TransportError, symbol: Option<String>) {
        warn!(error = %error, "Send failed");
        self.emit(Event::error(ErrorKind::SendError, symbol, error.to_string()));
        if error.is_fatal() {
            self.advance(
                SessionInput::TransportLost,
                Some(DisconnectReason::NetworkError(error.to_string())),
            )
            .await;
        }
    }

    async fn establish(&mut self) {
        let url = self.config.url();
        let mut transport = (self.factory)(&url);
        self.codec.reset();
        self.last_seqnum = None;
        *self.shared.auth.write() = AuthStatus::Unauthenticated;
        info!(%url, attempt = self.backoff.attempts(), "Connecting");

        let connect_timeout = self.config.connect_timeout;
        let result = {
            let connect = timeout(connect_timeout, transport.connect());
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => break result,
                    command = self.commands.recv() => {
                        self.on_command(command).await;
                        if self.closing || self.state() != SessionState::Connecting {
                            return;
                        }
                    }
                }
            }
        };

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(TransportError::Timeout(connect_timeout).to_string()),
        };

        match failure {
            None => {
                info!(%url, "Connected");
                self.transport = Some(transport);
                let authenticate = self.credentials.is_some();
                self.advance(SessionInput::TransportUp { authenticate }, None).await;
            }
            Some(reason) => {
                warn!(%url, %reason, "Connect failed");
                self.emit(Event::error(ErrorKind::ConnectError, None, reason.clone()));
                self.advance(
                    SessionInput::ConnectFailed,
                    Some(DisconnectReason::ConnectFailed(reason)),
                )
                .await;
            }
        }
    }

    /// Drive a connected session until it leaves the connected states
    async fn pump(&mut self) {
        let heartbeat = self.config.heartbeat_timeout;
        let mut last_frame = Instant::now();

        while !self.closing {
            let state = self.state();
            if !state.watches_heartbeat() {
                return;
            }
            let deadline = match state {
                SessionState::Ready => last_frame + heartbeat / 2,
                _ => last_frame + heartbeat,
            };
            if self.transport.is_none() {
                self.advance(
                    SessionInput::TransportLost,
                    Some(DisconnectReason::NetworkError(TransportError::NotConnected.to_string())),
                )
                .await;
                return;
            }
            let Some(transport) = self.transport.as_mut() else {
                return;
            };

            tokio::select! {
                frame = transport.recv() => match frame {
                    Ok(Some(frame)) => {
                        last_frame = Instant::now();
                        self.advance(SessionInput::FrameReceived, None).await;
                        self.handle_frame(&frame).await;
                    }
                    Ok(None) => {
                        info!("Server closed connection");
                        self.advance(SessionInput::TransportLost, Some(DisconnectReason::ServerClosed)).await;
                    }
                    Err(e) if !e.is_fatal() => {
                        warn!(error = %e, "Unreadable frame");
                        self.emit(Event::error(ErrorKind::ProtocolDecodeError, None, e.to_string()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Transport error");
                        self.advance(
                            SessionInput::TransportLost,
                            Some(DisconnectReason::NetworkError(e.to_string())),
                        )
                        .await;
                    }
                },
                command = self.commands.recv() => self.on_command(command).await,
                _ = sleep_until(deadline) => {
                    if state == SessionState::Ready {
                        warn!(silence = ?(heartbeat / 2), "No frames received, session degraded");
                        self.advance(SessionInput::HeartbeatLate, None).await;
                    } else {
                        error!(silence = ?heartbeat, "Heartbeat timeout, reconnecting");
                        self.advance(SessionInput::HeartbeatTimeout, Some(DisconnectReason::HeartbeatTimeout)).await;
                    }
                }
            }

            self.flush_resyncs().await;
        }
    }

    async fn wait_backoff(&mut self) {
        let Some(delay) = self.backoff.next_delay() else {
            error!(attempts = self.backoff.attempts(), "Reconnection attempts exhausted");
            self.advance(SessionInput::RetriesExhausted, Some(DisconnectReason::RetriesExhausted))
                .await;
            return;
        };
        info!(?delay, attempt = self.backoff.attempts(), "Reconnecting after backoff");

        let wait = sleep(delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => {
                    self.advance(SessionInput::BackoffElapsed, None).await;
                    return;
                }
                command = self.commands.recv() => {
                    self.on_command(command).await;
                    if self.closing || self.state() != SessionState::Reconnecting {
                        return;
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: &str) {
        let decoded = match self.codec.decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Failed to decode frame");
                self.emit(Event::error(ErrorKind::ProtocolDecodeError, None, e.to_string()));
                return;
            }
        };

        if let Some(seqnum) = decoded.seqnum {
            match self.last_seqnum {
                Some(last) if seqnum > last + 1 => {
                    warn!(expected = last + 1, received = seqnum, "Frames lost on the connection, reconnecting");
                    self.advance(
                        SessionInput::TransportLost,
                        Some(DisconnectReason::MessageGap {
                            expected: last + 1,
                            received: seqnum,
                        }),
                    )
                    .await;
                    return;
                }
                Some(last) if seqnum <= last => {
                    warn!(last, received = seqnum, "Delayed frame, seqnum went backwards");
                    // Book frames out of order cannot be applied safely
                    if let Event::BookSnapshot(BookSnapshot { symbol, .. })
                    | Event::BookDelta(BookDelta { symbol, .. }) = decoded.event
                    {
                        let message = format!("book frame seqnum {} arrived after {}", seqnum, last);
                        self.resync_book(symbol, message);
                        return;
                    }
                }
                _ => self.last_seqnum = Some(seqnum),
            }
        }

        match decoded.event {
            Event::AuthResult {
                authenticated,
                reason,
            } => {
                self.emit(Event::AuthResult {
                    authenticated,
                    reason: reason.clone(),
                });
                if authenticated {
                    info!("Authenticated");
                    *self.shared.auth.write() = AuthStatus::Authenticated;
                    self.advance(SessionInput::AuthAccepted, None).await;
                } else {
                    let reason = reason.unwrap_or_else(|| "authentication rejected".to_string());
                    *self.shared.auth.write() = AuthStatus::Failed(reason.clone());
                    self.advance(SessionInput::AuthRejected, Some(DisconnectReason::AuthFailed(reason)))
                        .await;
                }
            }
            Event::SubscriptionAck {
                channel,
                symbol,
                status,
            } => {
                self.on_ack(channel, symbol.as_deref(), &status);
                self.emit(Event::SubscriptionAck {
                    channel,
                    symbol,
                    status,
                });
            }
            Event::BookSnapshot(snapshot) => {
                debug!(symbol = %snapshot.symbol, sequence = snapshot.sequence, "Book snapshot");
                self.shared.books.apply_snapshot(&snapshot);
                self.resyncs.remove(&snapshot.symbol);
                self.emit(snapshot);
            }
            Event::BookDelta(delta) => self.on_delta(delta),
            Event::SymbolDetails {
                details,
                is_snapshot,
            } => self.on_symbol_details(details, is_snapshot),
            other => self.emit(other),
        }
    }

    fn on_ack(&mut self, channel: Channel, symbol: Option<&str>, status: &AckStatus) {
        let result = self.shared.registry.write().apply_ack(channel, symbol, status);
        match (status, &result) {
            (AckStatus::Rejected { reason }, _) => {
                warn!(%channel, ?symbol, %reason, "Subscription rejected");
            }
            (_, Some(SubscriptionStatus::Confirmed)) => info!(%channel, ?symbol, "Subscribed"),
            (_, None) => {
                info!(%channel, ?symbol, "Unsubscribed");
                self.forget(&SubscriptionKey::new(channel, symbol.map(str::to_string)));
            }
            _ => {}
        }
    }

    /// Drop per-symbol state kept for a removed subscription
    fn forget(&self, key: &SubscriptionKey) {
        match (key.channel, &key.symbol) {
            (Channel::L2, Some(symbol)) => self.shared.books.remove(symbol),
            (Channel::Symbols, Some(symbol)) => {
                self.shared.symbols.remove(symbol);
            }
            _ => {}
        }
    }

    /// Cache symbol details; updates merge over what is known
    fn on_symbol_details(&mut self, details: SymbolDetails, is_snapshot: bool) {
        let merged = match self.shared.symbols.entry(details.symbol.clone()) {
            Entry::Occupied(mut known) if !is_snapshot => {
                known.get_mut().merge(details);
                known.get().clone()
            }
            entry => {
                entry.insert(details.clone());
                details
            }
        };
        debug!(symbol = %merged.symbol, is_snapshot, "Symbol details");
        self.emit(Event::SymbolDetails {
            details: merged,
            is_snapshot,
        });
    }

    /// Invalidate a book and queue a snapshot request for it
    fn resync_book(&mut self, symbol: String, message: String) {
        if !self.shared.books.invalidate(&symbol) {
            debug!(%symbol, "Book already awaiting a snapshot, frame dropped");
            return;
        }
        warn!(%symbol, %message, "Book out of sequence, resyncing");
        self.emit(Event::error(ErrorKind::SequenceGap, Some(symbol.clone()), message));
        self.resyncs.insert(symbol);
    }

    fn on_delta(&mut self, delta: BookDelta) {
        match self.shared.books.apply_delta(&delta) {
            Ok(DeltaOutcome::Applied) => self.emit(delta),
            Ok(DeltaOutcome::Suppressed(state)) => {
                debug!(symbol = %delta.symbol, sequence = delta.sequence, ?state, "Delta suppressed");
            }
            Err(gap) => {
                warn!(symbol = %gap.symbol, expected = gap.expected, received = gap.received, "Sequence gap, resyncing book");
                self.emit(Event::error(
                    ErrorKind::SequenceGap,
                    Some(gap.symbol.clone()),
                    gap.to_string(),
                ));
                self.resyncs.insert(gap.symbol);
            }
        }
    }

    /// Request fresh snapshots for invalidated books
    async fn flush_resyncs(&mut self) {
        if self.resyncs.is_empty() || !self.state().is_live() {
            return;
        }

        for symbol in std::mem::take(&mut self.resyncs) {
            let key = SubscriptionKey::new(Channel::L2, Some(symbol.clone()));
            let subscription = self.shared.registry.read().get(&key).map(|e| e.subscription.clone());
            let Some(subscription) = subscription else {
                debug!(%symbol, "No l2 subscription for invalid book");
                continue;
            };
            if !self.shared.registry.write().mark_resync(&key) {
                continue;
            }

            let frames = match self.codec.encode_snapshot_request(&subscription) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(%symbol, error = %e, "Failed to encode snapshot request");
                    continue;
                }
            };
            info!(%symbol, "Requesting book snapshot");
            for frame in frames {
                if let Err(e) = self.send_frame(&frame).await {
                    self.send_failed(e, Some(symbol.clone())).await;
                    return;
                }
            }
        }
    }

    async fn on_command(&mut self, command: Option<Command>) {
        let Some(command) = command else {
            // Every handle is gone
            self.close().await;
            return;
        };

        match command {
            Command::Subscribe(subscription) => self.subscribe(subscription).await,
            Command::Unsubscribe(key) => self.unsubscribe(key).await,
            Command::SendOrder { order, reply } => {
                let result = self.send_order(&order).await;
                let _ = reply.send(result);
            }
            Command::Connect => {
                if self.state() == SessionState::Disconnected {
                    self.backoff.reset();
                    self.advance(SessionInput::Connect, None).await;
                }
            }
            Command::Close => self.close().await,
        }
    }

    async fn subscribe(&mut self, subscription: Subscription) {
        if let (Channel::L2, Some(symbol)) = (subscription.channel, &subscription.symbol) {
            self.shared.books.track(symbol);
        }
        let needs_send = self.shared.registry.write().subscribe(subscription.clone());
        if !needs_send || !self.state().is_live() {
            return;
        }

        match self.codec.encode_subscribe(&subscription) {
            Ok(frame) => {
                debug!(channel = %subscription.channel, symbol = ?subscription.symbol, "Subscribing");
                if let Err(e) = self.send_frame(&frame).await {
                    self.send_failed(e, subscription.symbol).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode subscription"),
        }
    }

    async fn unsubscribe(&mut self, key: SubscriptionKey) {
        let removed = self.shared.registry.write().unsubscribe(&key);
        let Some(subscription) = removed else {
            return;
        };
        if !self.state().is_live() {
            // The next replay drops the pending removal
            self.forget(&key);
            return;
        }

        match self.codec.encode_unsubscribe(&subscription) {
            Ok(frame) => {
                debug!(channel = %key.channel, symbol = ?key.symbol, "Unsubscribing");
                if let Err(e) = self.send_frame(&frame).await {
                    self.send_failed(e, key.symbol).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode unsubscribe"),
        }
    }

    async fn send_order(&mut self, order: &OrderRequest) -> BcxResult<()> {
        order.validate()?;
        if self.credentials.is_none() {
            return Err(BcxError::AuthRequired {
                channel: Channel::Trading.to_string(),
            });
        }
        if !self.state().is_live() {
            return Err(BcxError::NotConnected);
        }

        let frame = self.codec.encode_order(order).map_err(|e| BcxError::InvalidMessage {
            message: e.to_string(),
            raw: None,
        })?;
        info!(action = order.action(), client_order_id = ?order.client_order_id(), "Sending order");

        if let Err(e) = self.send_frame(&frame).await {
            let error = BcxError::SendFailed(e.to_string());
            if e.is_fatal() {
                self.advance(
                    SessionInput::TransportLost,
                    Some(DisconnectReason::NetworkError(e.to_string())),
                )
                .await;
            }
            return Err(error);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closing = true;

        let authenticated = self.shared.auth.read().is_authenticated();
        if self.config.cancel_orders_on_close && authenticated && self.state().is_live() {
            match self.codec.encode_order(&OrderRequest::CancelAll) {
                Ok(frame) => match self.send_frame(&frame).await {
                    Ok(()) => info!("Cancelled all open orders before closing"),
                    Err(e) => warn!(error = %e, "Failed to cancel open orders before closing"),
                },
                Err(e) => warn!(error = %e, "Failed to encode bulk cancel"),
            }
        }

        self.advance(SessionInput::Close, Some(DisconnectReason::Shutdown)).await;
    }
}

/// Caller side of a running [`Connection`]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: SharedState,
    has_credentials: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionHandle {
    fn send(&self, command: Command) -> BcxResult<()> {
        self.commands.send(command).map_err(|_| BcxError::ChannelClosed)
    }

    /// Record a subscription and send it when the session is live
    pub fn subscribe(&self, subscription: Subscription) -> BcxResult<()> {
        subscription.validate()?;
        if subscription.channel.is_private() && !self.has_credentials {
            return Err(BcxError::AuthRequired {
                channel: subscription.channel.to_string(),
            });
        }
        self.send(Command::Subscribe(subscription))
    }

    pub fn unsubscribe(&self, key: SubscriptionKey) -> BcxResult<()> {
        self.send(Command::Unsubscribe(key))
    }

    /// Validate and send an order command; resolves once written to the socket
    pub async fn send_order(&self, order: OrderRequest) -> BcxResult<()> {
        order.validate()?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::SendOrder { order, reply })?;
        rx.await.map_err(|_| BcxError::ChannelClosed)?
    }

    /// Connect again after auth failure or exhausted retries
    pub fn reconnect(&self) -> BcxResult<()> {
        self.send(Command::Connect)
    }

    /// Close the session and wait up to `wait` for the actor to stop
    pub async fn close(&self, wait: Duration) -> BcxResult<()> {
        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return Ok(());
        };
        // The actor may already be gone; awaiting the task is enough then
        let _ = self.commands.send(Command::Close);

        match timeout(wait, &mut task).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!(?wait, "Connection actor did not stop in time, aborting");
                task.abort();
                *self.shared.session.write() = SessionState::Disconnected;
                Err(BcxError::ShuttingDown)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.session.read()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.shared.auth.read().clone()
    }

    /// Copy of a symbol's book
    pub fn orderbook(&self, symbol: &str) -> Option<OrderbookSnapshot> {
        self.shared.books.snapshot(symbol)
    }

    pub fn books(&self) -> &BookStore {
        &self.shared.books
    }

    /// Latest details from the `symbols` channel
    pub fn symbol_details(&self, symbol: &str) -> Option<SymbolDetails> {
        self.shared.symbols.get(symbol).map(|details| details.clone())
    }

    /// Registry entries in replay order
    pub fn subscriptions(&self) -> Vec<(SubscriptionKey, SubscriptionStatus)> {
        self.shared.registry.read().entries()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    pub fn has_credentials(&self) -> bool {
        self.has_credentials
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("state", &self.state())
            .field("has_credentials", &self.has_credentials)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCategory;
    use crate::transport::{mock_factory, MockPeer, MockTransport};
    use bcx_book::OrderbookState;
    use bcx_types::Decimal;
    use serde_json::{json, Value};

    const WAIT: Duration = Duration::from_secs(2);

    fn test_config() -> ConnectionConfig {
        ConnectionConfig::new()
            .with_url("wss://mock")
            .with_heartbeat_subscription(false)
            .with_reconnect(
                ReconnectConfig::new()
                    .with_initial_delay(Duration::from_millis(10))
                    .with_jitter(0.0)
                    .with_max_attempts(2),
            )
    }

    async fn next_json(peer: &mut MockPeer) -> Value {
        let frame = peer.next_sent_within(WAIT).await.expect("expected a sent frame");
        serde_json::from_str(&frame).unwrap()
    }

    fn collect(dispatcher: &Dispatcher, category: EventCategory) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.register(
            category,
            Arc::new(move |event: &Event| {
                let _ = tx.send(event.clone());
            }),
        );
        rx
    }

    async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait_for_state(handle: &ConnectionHandle, state: SessionState) {
        let deadline = Instant::now() + WAIT;
        while handle.state() != state {
            assert!(Instant::now() < deadline, "state stayed {:?}, wanted {:?}", handle.state(), state);
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_public_session_replays_and_builds_book() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut gaps = collect(&dispatcher, EventCategory::Error);
        let (transport, mut peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .with_subscriptions([Subscription::l2("BTC-USD")])
            .spawn();

        let sub = next_json(&mut peer).await;
        assert_eq!(sub, json!({"action": "subscribe", "channel": "l2", "symbol": "BTC-USD"}));
        assert_eq!(handle.state(), SessionState::Ready);

        peer.push_json(json!({"seqnum": 0, "event": "subscribed", "channel": "l2", "symbol": "BTC-USD"}));
        peer.push_json(json!({
            "seqnum": 1, "event": "snapshot", "channel": "l2", "symbol": "BTC-USD",
            "bids": [{"px": 100.0, "qty": 2, "num": 1}], "asks": [{"px": 100.1, "qty": 3, "num": 1}]
        }));
        peer.push_json(json!({
            "seqnum": 2, "event": "updated", "channel": "l2", "symbol": "BTC-USD",
            "bids": [{"px": 100.0, "qty": 0, "num": 0}], "asks": []
        }));

        let deadline = Instant::now() + WAIT;
        loop {
            if let Some(book) = handle.orderbook("BTC-USD") {
                if book.state == OrderbookState::Synced && book.bids.is_empty() {
                    assert_eq!(book.asks.len(), 1);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "book never reached the expected state");
            sleep(Duration::from_millis(5)).await;
        }
        assert!(gaps.try_recv().is_err());

        handle.close(WAIT).await.unwrap();
        assert_eq!(handle.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_gap_requests_snapshot_for_symbol_only() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut errors = collect(&dispatcher, EventCategory::Error);
        let mut deltas = collect(&dispatcher, EventCategory::BookDelta);
        let (transport, mut peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .with_subscriptions([Subscription::l2("BTC-USD"), Subscription::l2("ETH-USD")])
            .spawn();
        next_json(&mut peer).await;
        next_json(&mut peer).await;

        for (symbol, seq) in [("BTC-USD", 10), ("ETH-USD", 20)] {
            peer.push_json(json!({
                "event": "snapshot", "channel": "l2", "symbol": symbol, "seq": seq,
                "bids": [{"px": 1, "qty": 1, "num": 1}], "asks": []
            }));
        }
        peer.push_json(json!({
            "event": "updated", "channel": "l2", "symbol": "BTC-USD", "seq": 13,
            "bids": [{"px": 2, "qty": 1, "num": 1}], "asks": []
        }));

        let unsub = next_json(&mut peer).await;
        assert_eq!(unsub["action"], "unsubscribe");
        assert_eq!(unsub["symbol"], "BTC-USD");
        let resub = next_json(&mut peer).await;
        assert_eq!(resub["action"], "subscribe");
        assert_eq!(resub["symbol"], "BTC-USD");

        let error = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(
            error,
            Event::Error { kind: ErrorKind::SequenceGap, symbol: Some(ref s), .. } if s == "BTC-USD"
        ));
        assert_eq!(handle.books().state("BTC-USD"), Some(OrderbookState::Invalid));
        assert_eq!(handle.books().state("ETH-USD"), Some(OrderbookState::Synced));

        // BTC-USD stays silent until its new snapshot, ETH-USD keeps flowing
        let delta = |symbol: &str, seq: u64| {
            json!({
                "event": "updated", "channel": "l2", "symbol": symbol, "seq": seq,
                "bids": [{"px": 3, "qty": 1, "num": 1}], "asks": []
            })
        };
        peer.push_json(delta("BTC-USD", 14));
        peer.push_json(delta("ETH-USD", 21));
        peer.push_json(json!({
            "event": "snapshot", "channel": "l2", "symbol": "BTC-USD", "seq": 30,
            "bids": [{"px": 1, "qty": 1, "num": 1}], "asks": []
        }));
        peer.push_json(delta("BTC-USD", 31));

        let mut delivered = Vec::new();
        while delivered.len() < 2 {
            match tokio::time::timeout(WAIT, deltas.recv()).await.unwrap().unwrap() {
                Event::BookDelta(delta) => delivered.push((delta.symbol, delta.sequence)),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(
            delivered,
            vec![("ETH-USD".to_string(), 21), ("BTC-USD".to_string(), 31)]
        );
        assert_eq!(handle.books().state("BTC-USD"), Some(OrderbookState::Synced));
        assert!(deltas.try_recv().is_err());

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_late_book_frame_resyncs_instead_of_applying() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut errors = collect(&dispatcher, EventCategory::Error);
        let mut deltas = collect(&dispatcher, EventCategory::BookDelta);
        let (transport, mut peer) = MockTransport::pair("wss://mock");
        let (factory, calls) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .with_subscriptions([Subscription::l2("BTC-USD")])
            .spawn();
        next_json(&mut peer).await;

        let frame = |seqnum: u64, event: &str, qty: u32| {
            json!({
                "seqnum": seqnum, "event": event, "channel": "l2", "symbol": "BTC-USD",
                "bids": [{"px": 100, "qty": qty, "num": 1}], "asks": []
            })
        };
        peer.push_json(frame(1, "snapshot", 1));
        peer.push_json(frame(2, "updated", 5));
        // Replayed seqnum, older than the update already applied
        peer.push_json(frame(1, "updated", 2));

        let unsub = next_json(&mut peer).await;
        assert_eq!(unsub["action"], "unsubscribe");
        assert_eq!(unsub["symbol"], "BTC-USD");
        let resub = next_json(&mut peer).await;
        assert_eq!(resub["action"], "subscribe");

        let error = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(
            error,
            Event::Error { kind: ErrorKind::SequenceGap, symbol: Some(ref s), .. } if s == "BTC-USD"
        ));

        let applied = tokio::time::timeout(WAIT, deltas.recv()).await.unwrap().unwrap();
        assert!(matches!(applied, Event::BookDelta(BookDelta { sequence: 2, .. })));
        assert!(deltas.try_recv().is_err());

        let book = handle.orderbook("BTC-USD").unwrap();
        assert_eq!(book.state, OrderbookState::Invalid);
        assert_eq!(book.sequence, Some(2));
        assert_eq!(book.bids[0].qty, Decimal::from(5));

        // Only the book resyncs; the connection stays up
        assert_eq!(handle.state(), SessionState::Ready);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_frame_keeps_session() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut errors = collect(&dispatcher, EventCategory::Error);
        let mut trades = collect(&dispatcher, EventCategory::Trade);
        let (transport, peer) = MockTransport::pair("wss://mock");
        let (factory, calls) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .spawn();
        wait_for_state(&handle, SessionState::Ready).await;

        peer.push_error(TransportError::Protocol("invalid utf-8 in binary frame".into()));
        peer.push_json(json!({
            "event": "updated", "channel": "trades", "symbol": "ETH-USD",
            "price": 2000, "qty": 1, "side": "sell", "trade_id": "7"
        }));

        let error = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(error, Event::Error { kind: ErrorKind::ProtocolDecodeError, .. }));
        let trade = tokio::time::timeout(WAIT, trades.recv()).await.unwrap().unwrap();
        assert_eq!(trade.symbol(), Some("ETH-USD"));

        assert_eq!(handle.state(), SessionState::Ready);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_symbol_details_are_cached_and_merged() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut details = collect(&dispatcher, EventCategory::SymbolDetails);
        let (transport, mut peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .with_subscriptions([Subscription::symbols("BTC-USD")])
            .spawn();
        let sub = next_json(&mut peer).await;
        assert_eq!(sub, json!({"action": "subscribe", "channel": "symbols", "symbol": "BTC-USD"}));

        peer.push_json(json!({"seqnum": 0, "event": "subscribed", "channel": "symbols", "symbol": "BTC-USD"}));
        peer.push_json(json!({
            "seqnum": 1, "event": "snapshot", "channel": "symbols", "symbol": "BTC-USD",
            "base_currency": "BTC", "counter_currency": "USD", "status": "open",
            "min_price_increment": 10, "min_price_increment_scale": 2
        }));
        peer.push_json(json!({"seqnum": 2, "event": "updated", "channel": "symbols", "symbol": "BTC-USD", "status": "halt"}));

        let first = tokio::time::timeout(WAIT, details.recv()).await.unwrap().unwrap();
        assert!(matches!(first, Event::SymbolDetails { is_snapshot: true, .. }));
        let Event::SymbolDetails { details: merged, is_snapshot } =
            tokio::time::timeout(WAIT, details.recv()).await.unwrap().unwrap()
        else {
            panic!("expected symbol details");
        };
        assert!(!is_snapshot);
        assert_eq!(merged.status(), Some("halt"));
        assert_eq!(merged.base_currency(), Some("BTC"));

        let cached = handle.symbol_details("BTC-USD").unwrap();
        assert_eq!(cached, merged);
        assert_eq!(cached.tick_size(), Some(Decimal::new(10, 2)));

        handle
            .unsubscribe(SubscriptionKey::new(Channel::Symbols, Some("BTC-USD".into())))
            .unwrap();
        assert_eq!(next_json(&mut peer).await["action"], "unsubscribe");
        peer.push_json(json!({"seqnum": 3, "event": "unsubscribed", "channel": "symbols", "symbol": "BTC-USD"}));
        eventually("symbol details to be dropped", || handle.symbol_details("BTC-USD").is_none()).await;

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_drops_books_of_removed_subscriptions() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let (first, mut first_peer) = MockTransport::pair("wss://mock");
        let (second, mut second_peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![first, second]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .with_subscriptions([Subscription::l2("BTC-USD"), Subscription::l2("ETH-USD")])
            .spawn();
        next_json(&mut first_peer).await;
        next_json(&mut first_peer).await;

        first_peer.push_json(json!({
            "event": "snapshot", "channel": "l2", "symbol": "BTC-USD", "seq": 1,
            "bids": [{"px": 1, "qty": 1, "num": 1}], "asks": []
        }));
        eventually("BTC-USD book to sync", || {
            handle.books().state("BTC-USD") == Some(OrderbookState::Synced)
        })
        .await;

        // Unsubscribe is sent but the connection drops before the ack
        handle
            .unsubscribe(SubscriptionKey::new(Channel::L2, Some("BTC-USD".into())))
            .unwrap();
        assert_eq!(next_json(&mut first_peer).await["action"], "unsubscribe");
        first_peer.close();

        let replayed = next_json(&mut second_peer).await;
        assert_eq!(replayed["symbol"], "ETH-USD");
        assert!(handle.orderbook("BTC-USD").is_none());
        assert!(handle.orderbook("ETH-USD").is_some());
        assert_eq!(handle.books().symbols(), vec!["ETH-USD".to_string()]);
        assert_eq!(
            handle.subscriptions(),
            vec![(
                SubscriptionKey::new(Channel::L2, Some("ETH-USD".into())),
                SubscriptionStatus::Pending
            )]
        );

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_error_keeps_stream_alive() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut errors = collect(&dispatcher, EventCategory::Error);
        let mut trades = collect(&dispatcher, EventCategory::Trade);
        let (transport, peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .spawn();
        wait_for_state(&handle, SessionState::Ready).await;

        peer.push("not json");
        peer.push_json(json!({
            "event": "updated", "channel": "trades", "symbol": "BTC-USD",
            "price": 100.5, "qty": 1, "side": "buy", "trade_id": "1"
        }));

        let error = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(error, Event::Error { kind: ErrorKind::ProtocolDecodeError, .. }));
        let trade = tokio::time::timeout(WAIT, trades.recv()).await.unwrap().unwrap();
        assert_eq!(trade.symbol(), Some("BTC-USD"));
        assert_eq!(handle.state(), SessionState::Ready);

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_exhausted_then_close() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut errors = collect(&dispatcher, EventCategory::Error);
        let mut states = collect(&dispatcher, EventCategory::ConnectionStateChanged);
        let (factory, calls) = mock_factory(vec![]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .spawn();

        loop {
            let event = tokio::time::timeout(WAIT, states.recv()).await.unwrap().unwrap();
            if let Event::ConnectionStateChanged { to: SessionState::Disconnected, reason, .. } = event {
                assert_eq!(reason, Some(DisconnectReason::RetriesExhausted));
                break;
            }
        }
        // One initial attempt plus two retries
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(handle.state(), SessionState::Disconnected);

        let first = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
        assert!(matches!(first, Event::Error { kind: ErrorKind::ConnectError, .. }));

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_silence_degrades_then_reconnects() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let mut states = collect(&dispatcher, EventCategory::ConnectionStateChanged);
        let (first, _first_peer) = MockTransport::pair("wss://mock");
        let (second, _second_peer) = MockTransport::pair("wss://mock");
        let (factory, calls) = mock_factory(vec![first, second]);

        let config = test_config().with_heartbeat_timeout(Duration::from_millis(80));
        let handle = Connection::new(config, None, dispatcher)
            .with_transport_factory(factory)
            .spawn();

        let mut seen = Vec::new();
        while seen.len() < 5 {
            match tokio::time::timeout(WAIT, states.recv()).await.unwrap().unwrap() {
                Event::ConnectionStateChanged { to, .. } => seen.push(to),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(
            seen,
            vec![
                SessionState::Connecting,
                SessionState::Ready,
                SessionState::Degraded,
                SessionState::Reconnecting,
                SessionState::Connecting,
            ]
        );
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);

        handle.close(WAIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_order_rules() {
        let dispatcher = Arc::new(Dispatcher::new(64));
        let (transport, _peer) = MockTransport::pair("wss://mock");
        let (factory, _) = mock_factory(vec![transport]);

        let handle = Connection::new(test_config(), None, dispatcher)
            .with_transport_factory(factory)
            .spawn();
        wait_for_state(&handle, SessionState::Ready).await;

        let result = handle.send_order(OrderRequest::CancelAll).await;
        assert!(matches!(result, Err(BcxError::AuthRequired { .. })));

        let invalid = OrderRequest::Cancel { order_id: " ".into() };
        assert!(matches!(handle.send_order(invalid).await, Err(BcxError::InvalidOrder(_))));

        assert!(matches!(
            handle.subscribe(Subscription::balances()),
            Err(BcxError::AuthRequired { .. })
        ));
        assert!(matches!(
            handle.subscribe(Subscription::prices("BTC-USD", 7)),
            Err(BcxError::InvalidSubscription(_))
        ));
        assert!(matches!(
            handle.subscribe(Subscription::trades("BTCUSD")),
            Err(BcxError::InvalidSubscription(_))
        ));

        handle.close(WAIT).await.unwrap();
        assert!(matches!(
            handle.subscribe(Subscription::trades("BTC-USD")),
            Err(BcxError::ChannelClosed)
        ));
    }
}
