//! API credentials for the private channels
//!
//! The exchange authenticates a WebSocket session with the API secret itself,
//! sent once per connection on the `auth` channel.
//!
//! # Security
//!
//! The secret is stored using the `secrecy` crate which:
//! - Zeroizes memory on drop
//! - Prevents accidental logging via Debug impl
//! - Requires explicit access via [`Credentials::expose_token`]

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// API secret plus an optional key id used only for identification in logs
pub struct Credentials {
    /// API key id (public)
    api_key: Option<String>,
    /// API secret (zeroized on drop)
    secret: SecretString,
}

impl Credentials {
    /// Create credentials from an API secret
    ///
    /// Fails if the secret is empty or only whitespace.
    pub fn new(secret: impl Into<String>) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(AuthError::InvalidCredentials(
                "API secret must not be empty".to_string(),
            ));
        }

        debug!("API credentials loaded");
        Ok(Self {
            api_key: None,
            secret: SecretString::from(secret),
        })
    }

    /// Attach the public API key id
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Public API key id, if known
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Shortened key id safe for logs
    pub fn identity(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}...", key.chars().take(8).collect::<String>()),
            None => "anonymous".to_string(),
        }
    }

    /// The token to send in the auth frame
    ///
    /// Callers must not log or persist the returned value.
    pub fn expose_token(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            secret: SecretString::from(self.secret.expose_secret().to_string()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.identity())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
