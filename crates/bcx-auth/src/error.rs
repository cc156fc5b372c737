//! Error types for authentication operations

/// Errors that can occur during authentication
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Invalid API credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The exchange rejected the session
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    /// A private channel was requested without credentials
    #[error("Channel {0} requires credentials")]
    CredentialsRequired(String),
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
