//! Common test utilities and fixtures for integration tests
//!
//! Frames follow the mercury gateway format as sent by the exchange.

#![allow(dead_code)]

use bcx_sdk::prelude::*;
use bcx_ws::{mock_factory, MockPeer, MockTransport};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

pub const WAIT: Duration = Duration::from_secs(2);
pub const MOCK_URL: &str = "wss://mock.exchange";

/// Client settings for scripted sessions: fast retries, no heartbeat channel
pub fn test_config() -> ClientConfig {
    ClientConfig::new()
        .with_url(MOCK_URL)
        .with_heartbeat_subscription(false)
        .with_close_timeout(WAIT)
        .with_reconnect(
            ReconnectConfig::new()
                .with_initial_delay(Duration::from_millis(10))
                .with_jitter(0.0)
                .with_max_attempts(3),
        )
}

pub fn credentials() -> Credentials {
    Credentials::new("test-secret").unwrap()
}

/// Scripted transports plus their peers, handed out in connect order
pub struct Script {
    pub peers: Vec<MockPeer>,
    pub calls: Arc<AtomicUsize>,
}

impl Script {
    pub fn connects(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Log to the test writer; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder wired to `connections` scripted transports
pub fn scripted(connections: usize) -> (BcxClientBuilder, Script) {
    init_tracing();
    let (transports, peers): (Vec<_>, Vec<_>) =
        (0..connections).map(|_| MockTransport::pair(MOCK_URL)).unzip();
    let (factory, calls) = mock_factory(transports);
    let builder = BcxClient::builder()
        .with_config(test_config())
        .with_transport_factory(factory);
    (builder, Script { peers, calls })
}

/// Register a handler forwarding events of `category` into a channel
pub fn collect(
    builder: BcxClientBuilder,
    category: EventCategory,
) -> (BcxClientBuilder, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let builder = builder.on(category, move |event| {
        let _ = tx.send(event.clone());
    });
    (builder, rx)
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until one matches
pub async fn wait_event<F>(events: &mut mpsc::UnboundedReceiver<Event>, mut matches: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Next frame the client wrote, parsed as JSON
pub async fn next_sent(peer: &mut MockPeer) -> Value {
    let frame = peer
        .next_sent_within(WAIT)
        .await
        .expect("expected the client to send a frame");
    serde_json::from_str(&frame).expect("client sent invalid JSON")
}

/// Poll until `condition` holds or fail after [`WAIT`]
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(client: &BcxClient, state: SessionState) {
    eventually(&format!("state {:?}", state), || client.state() == state).await;
}

// =============================================================================
// Exchange frames
// =============================================================================

pub fn subscribed(seqnum: u64, channel: &str, symbol: Option<&str>) -> Value {
    let mut frame = json!({"seqnum": seqnum, "event": "subscribed", "channel": channel});
    if let Some(symbol) = symbol {
        frame["symbol"] = json!(symbol);
    }
    frame
}

pub fn auth_accepted(seqnum: u64) -> Value {
    json!({"seqnum": seqnum, "event": "subscribed", "channel": "auth"})
}

pub fn auth_rejected(seqnum: u64, text: &str) -> Value {
    json!({"seqnum": seqnum, "event": "rejected", "channel": "auth", "text": text})
}

pub fn heartbeat(seqnum: u64) -> Value {
    json!({
        "seqnum": seqnum, "event": "updated", "channel": "heartbeat",
        "timestamp": "2024-03-01T12:00:00.000Z"
    })
}

/// L2 snapshot with `[price, qty]` pairs and an explicit book sequence
pub fn l2_snapshot(symbol: &str, seq: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> Value {
    json!({
        "event": "snapshot", "channel": "l2", "symbol": symbol, "seq": seq,
        "bids": levels(bids), "asks": levels(asks)
    })
}

pub fn l2_update(symbol: &str, seq: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> Value {
    json!({
        "event": "updated", "channel": "l2", "symbol": symbol, "seq": seq,
        "bids": levels(bids), "asks": levels(asks)
    })
}

fn levels(levels: &[(f64, f64)]) -> Vec<Value> {
    levels
        .iter()
        .map(|(px, qty)| json!({"px": px, "qty": qty, "num": if *qty == 0.0 { 0 } else { 1 }}))
        .collect()
}

/// Bring an authenticated session to `Ready`; returns the auth frame sent
pub async fn authenticate(client: &BcxClient, peer: &mut MockPeer) -> Value {
    let auth = next_sent(peer).await;
    peer.push_json(auth_accepted(1));
    wait_for_state(client, SessionState::Ready).await;
    auth
}
