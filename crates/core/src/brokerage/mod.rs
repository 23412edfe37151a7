pub mod http;
pub mod types;

pub use http::HttpBrokerageClient;
pub use types::{Account, Balance, Position, Quote};

use anyhow::Result;
use std::fmt;

/// Account and position data for a pre-authorized brokerage session.
#[async_trait::async_trait]
pub trait AccountsClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Positions across every portfolio of the account. Empty when the account holds nothing.
    async fn portfolio(&self, account_id_key: &str) -> Result<Vec<Position>>;

    async fn balance(&self, account_id_key: &str) -> Result<Balance>;
}

#[async_trait::async_trait]
pub trait MarketClient: Send + Sync {
    /// Latest quotes for `symbols`. Unknown symbols are simply absent from the result.
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>>;
}

/// An account id key that is not a plain token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAccountKey {
    pub key: String,
}

impl fmt::Display for InvalidAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid account id key {:?}: expected letters, digits, '-' or '_'",
            self.key
        )
    }
}

impl std::error::Error for InvalidAccountKey {}

/// Account id keys are opaque brokerage tokens made of `[A-Za-z0-9_-]`.
pub fn validate_account_id_key(key: &str) -> Result<&str, InvalidAccountKey> {
    let trimmed = key.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(trimmed)
    } else {
        Err(InvalidAccountKey {
            key: key.to_string(),
        })
    }
}
