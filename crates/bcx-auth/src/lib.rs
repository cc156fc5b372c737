//! Credentials and session auth status for the Blockchain.com Exchange
//!
//! Private channels (`balances`, `trading`) need an authenticated session.
//! The session is authenticated by sending the API secret on the `auth`
//! channel right after every connect.
//!
//! # Example
//!
//! ```
//! use bcx_auth::Credentials;
//!
//! let creds = Credentials::new("my-api-secret").unwrap().with_api_key("key-id");
//! assert_eq!(creds.api_key(), Some("key-id"));
//! assert!(!format!("{:?}", creds).contains("my-api-secret"));
//! ```

mod credentials;
mod error;
mod status;

pub use credentials::Credentials;
pub use error::{AuthError, AuthResult};
pub use status::AuthStatus;
