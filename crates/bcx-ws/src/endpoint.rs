//! Gateway endpoints per environment

use std::fmt;

/// Exchange environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live trading
    #[default]
    Production,
    /// Staging sandbox
    Staging,
}

impl Environment {
    /// WebSocket URL of the mercury gateway
    pub fn url(&self) -> &'static str {
        match self {
            Self::Production => "wss://ws.prod.blockchain.info/mercury-gateway/v1/ws",
            Self::Staging => "wss://ws.staging.blockchain.info/mercury-gateway/v1/ws",
        }
    }

    /// `Origin` header the gateway expects
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Production => "https://exchange.blockchain.com",
            Self::Staging => "https://pit.staging.blockchain.info",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
