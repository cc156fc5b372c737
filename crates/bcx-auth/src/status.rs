//! Per-connection authentication status

use crate::error::AuthError;

/// Authentication status of the current session
///
/// A session belongs to exactly one connection; every reconnect starts again
/// from [`AuthStatus::Unauthenticated`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthStatus {
    /// No auth frame acknowledged on this connection
    #[default]
    Unauthenticated,
    /// Auth frame sent, waiting for the exchange
    Pending,
    /// Exchange accepted the secret
    Authenticated,
    /// Exchange rejected the secret
    Failed(String),
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Error describing a failed status
    pub fn error(&self) -> Option<AuthError> {
        match self {
            Self::Failed(reason) => Some(AuthError::Rejected(reason.clone())),
            _ => None,
        }
    }
}
