//! Session / auth state machine
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Ready ⇄ Degraded
//!                    ↑              │            │        │
//!                    └─ Reconnecting ←───────────┴────────┘
//! ```
//!
//! [`transition`] is pure: it maps a state and an input to the next state and
//! the side effects the connection actor must perform. Inputs that make no
//! sense in the current state leave it unchanged with no actions.

use std::fmt;

/// Lifecycle state of the client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No connection and none wanted
    #[default]
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Auth frame sent, waiting for the exchange
    Authenticating,
    /// Frames are flowing
    Ready,
    /// Frames stopped for more than half the heartbeat timeout
    Degraded,
    /// Waiting out the backoff delay
    Reconnecting,
}

impl SessionState {
    /// True while a transport is open
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Authenticating | Self::Ready | Self::Degraded)
    }

    /// True when subscriptions and orders can be sent
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// States in which the heartbeat deadline applies
    pub fn watches_heartbeat(&self) -> bool {
        self.is_connected()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Things that happen to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Caller asked to connect
    Connect,
    /// Transport connected; `authenticate` when credentials are present
    TransportUp { authenticate: bool },
    /// Transport connect failed or timed out
    ConnectFailed,
    /// Exchange accepted the credentials
    AuthAccepted,
    /// Exchange rejected the credentials
    AuthRejected,
    /// Any inbound frame
    FrameReceived,
    /// Half the heartbeat timeout elapsed without a frame
    HeartbeatLate,
    /// The full heartbeat timeout elapsed without a frame
    HeartbeatTimeout,
    /// Transport closed or failed
    TransportLost,
    /// Backoff delay is over
    BackoffElapsed,
    /// Backoff gave up
    RetriesExhausted,
    /// Caller asked to close
    Close,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Send the auth frame
    SendAuth,
    /// Resend every recorded subscription
    ReplaySubscriptions,
    /// Flag every book as stale
    MarkBooksStale,
    /// Close the current transport
    CloseTransport,
    /// Emit `Error{AuthFailed}`
    ReportAuthFailure,
}

/// Result of [`transition`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub actions: Vec<SessionAction>,
}

impl Transition {
    fn to(next: SessionState, actions: &[SessionAction]) -> Self {
        Self {
            next,
            actions: actions.to_vec(),
        }
    }

    fn stay(state: SessionState) -> Self {
        Self::to(state, &[])
    }

    /// True if the state differs from `from`
    pub fn changes(&self, from: SessionState) -> bool {
        self.next != from
    }
}

/// Compute the next state and actions
pub fn transition(state: SessionState, input: SessionInput) -> Transition {
    use SessionAction::*;
    use SessionInput as I;
    use SessionState as S;

    match (state, input) {
        (_, I::Close) => Transition::to(S::Disconnected, &[CloseTransport]),

        (S::Disconnected, I::Connect) => Transition::to(S::Connecting, &[]),

        (S::Connecting, I::TransportUp { authenticate: true }) => {
            Transition::to(S::Authenticating, &[SendAuth])
        }
        (S::Connecting, I::TransportUp { authenticate: false }) => {
            Transition::to(S::Ready, &[ReplaySubscriptions])
        }
        (S::Connecting, I::ConnectFailed) => Transition::to(S::Reconnecting, &[]),

        (S::Authenticating, I::AuthAccepted) => Transition::to(S::Ready, &[ReplaySubscriptions]),
        (S::Authenticating, I::AuthRejected) => {
            Transition::to(S::Disconnected, &[CloseTransport, ReportAuthFailure])
        }

        (S::Ready, I::HeartbeatLate) => Transition::to(S::Degraded, &[]),
        (S::Degraded, I::FrameReceived) => Transition::to(S::Ready, &[]),

        (S::Authenticating | S::Ready | S::Degraded, I::TransportLost | I::HeartbeatTimeout) => {
            Transition::to(S::Reconnecting, &[CloseTransport, MarkBooksStale])
        }

        (S::Reconnecting, I::BackoffElapsed) => Transition::to(S::Connecting, &[]),
        (S::Reconnecting, I::RetriesExhausted) => Transition::to(S::Disconnected, &[]),

        (state, _) => Transition::stay(state),
    }
}
