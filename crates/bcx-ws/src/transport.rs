//! WebSocket transport abstraction
//!
//! The connection actor only talks to a [`Transport`], so the whole session
//! lifecycle can be exercised against [`MockTransport`] without a network.
//!
//! # Example
//!
//! ```no_run
//! use bcx_ws::transport::{Transport, TransportError, WsTransport};
//! use bcx_ws::Environment;
//!
//! async fn example() -> Result<(), TransportError> {
//!     let env = Environment::Staging;
//!     let mut transport = WsTransport::new(env.url()).with_origin(env.origin());
//!     transport.connect().await?;
//!     transport
//!         .send(r#"{"action":"subscribe","channel":"heartbeat"}"#)
//!         .await?;
//!     if let Some(frame) = transport.recv().await? {
//!         println!("Received: {}", frame);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Transport layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Not connected
    #[error("not connected")]
    NotConnected,

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Returns true if the socket can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::NotConnected | Self::ReceiveFailed(_) | Self::SendFailed(_)
        )
    }
}

/// Lazy, ordered sequence of inbound text frames plus an outbound sink
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the WebSocket endpoint
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send a text frame
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next text frame
    ///
    /// Returns `None` if the connection was closed gracefully.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection; closing twice is a no-op
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Get the endpoint URL
    fn endpoint(&self) -> &str;
}

/// Builds a fresh transport for each connect attempt
pub type TransportFactory = Arc<dyn Fn(&str) -> Box<dyn Transport> + Send + Sync>;

/// Real WebSocket transport using tokio-tungstenite
pub struct WsTransport {
    url: String,
    origin: Option<String>,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a new WebSocket transport
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
            stream: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Send an `Origin` header with the upgrade request
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Factory producing real transports with the given timeout and origin
    pub fn factory(connect_timeout: Duration, origin: Option<String>) -> TransportFactory {
        Arc::new(move |url: &str| {
            let mut transport = WsTransport::new(url).with_timeout(connect_timeout);
            if let Some(origin) = &origin {
                transport = transport.with_origin(origin.clone());
            }
            Box::new(transport) as Box<dyn Transport>
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Connecting to WebSocket");

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            request.headers_mut().insert("Origin", value);
        }

        let (ws_stream, _response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        self.stream = Some(ws_stream);
        debug!("WebSocket connected");
        Ok(())
    }

    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Close(_))) => {
                    self.stream = None;
                    return Ok(None);
                }
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    self.stream = None;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .close(None)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{mock_factory, MockPeer, MockTransport};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    enum Scripted {
        Frame(String),
        Close,
        Error(TransportError),
    }

    /// In-memory transport driven by a [`MockPeer`]
    ///
    /// `recv` waits for the peer to script the next frame and yields
    /// `Ok(None)` once the peer is dropped or calls [`MockPeer::close`].
    pub struct MockTransport {
        url: String,
        connected: bool,
        /// Simulate connection failure
        pub fail_connect: bool,
        inbound: mpsc::UnboundedReceiver<Scripted>,
        outbound: mpsc::UnboundedSender<String>,
    }

    /// Test-side handle of a [`MockTransport`]
    pub struct MockPeer {
        inbound: mpsc::UnboundedSender<Scripted>,
        outbound: mpsc::UnboundedReceiver<String>,
    }

    impl MockTransport {
        /// Create a connected pair of transport and peer
        pub fn pair(url: impl Into<String>) -> (MockTransport, MockPeer) {
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let transport = MockTransport {
                url: url.into(),
                connected: false,
                fail_connect: false,
                inbound: in_rx,
                outbound: out_tx,
            };
            let peer = MockPeer {
                inbound: in_tx,
                outbound: out_rx,
            };
            (transport, peer)
        }

        /// A transport whose connect always fails
        pub fn refusing(url: impl Into<String>) -> MockTransport {
            let (mut transport, _peer) = Self::pair(url);
            transport.fail_connect = true;
            transport
        }
    }

    impl MockPeer {
        /// Script an inbound text frame
        pub fn push(&self, frame: impl Into<String>) {
            let _ = self.inbound.send(Scripted::Frame(frame.into()));
        }

        /// Script an inbound JSON frame
        pub fn push_json(&self, frame: serde_json::Value) {
            self.push(frame.to_string());
        }

        /// Script a graceful close
        pub fn close(&self) {
            let _ = self.inbound.send(Scripted::Close);
        }

        /// Script a receive error
        pub fn push_error(&self, error: TransportError) {
            let _ = self.inbound.send(Scripted::Error(error));
        }

        /// Wait for the next frame the client sends
        pub async fn next_sent(&mut self) -> Option<String> {
            self.outbound.recv().await
        }

        /// Wait up to `wait` for the next sent frame
        pub async fn next_sent_within(&mut self, wait: Duration) -> Option<String> {
            timeout(wait, self.outbound.recv()).await.ok().flatten()
        }

        /// Frames sent so far that have not been read yet
        pub fn drain_sent(&mut self) -> Vec<String> {
            let mut sent = Vec::new();
            while let Ok(frame) = self.outbound.try_recv() {
                sent.push(frame);
            }
            sent
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            if self.fail_connect {
                return Err(TransportError::ConnectionFailed(
                    "mock connection failure".into(),
                ));
            }
            self.connected = true;
            Ok(())
        }

        async fn send(&mut self, message: &str) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.outbound
                .send(message.to_string())
                .map_err(|_| TransportError::SendFailed("mock peer dropped".into()))
        }

        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            match self.inbound.recv().await {
                Some(Scripted::Frame(frame)) => Ok(Some(frame)),
                Some(Scripted::Error(error)) => {
                    if error.is_fatal() {
                        self.connected = false;
                    }
                    Err(error)
                }
                Some(Scripted::Close) | None => {
                    self.connected = false;
                    Ok(None)
                }
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn endpoint(&self) -> &str {
            &self.url
        }
    }

    /// Factory handing out scripted transports in order
    ///
    /// Once the script is exhausted every further attempt gets a refusing
    /// transport. The counter reports how many transports were requested.
    pub fn mock_factory(transports: Vec<MockTransport>) -> (TransportFactory, Arc<AtomicUsize>) {
        let queue = Arc::new(Mutex::new(VecDeque::from(transports)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory: TransportFactory = Arc::new(move |url: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            let next = queue.lock().pop_front();
            Box::new(next.unwrap_or_else(|| MockTransport::refusing(url))) as Box<dyn Transport>
        });
        (factory, calls)
    }
}
