use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub account_id_key: String,
    pub account_id: Option<String>,
    pub description: Option<String>,
    pub institution_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: Option<String>,
    pub symbol_description: Option<String>,
    pub security_type: Option<String>,
    pub quantity: Option<f64>,
    pub market_value: Option<f64>,
    pub price_paid: Option<f64>,
    pub total_gain: Option<f64>,
    pub last_trade: Option<f64>,
}

impl Position {
    /// `Product.symbol` when present, otherwise the description, which the brokerage fills
    /// with the ticker for plain equities.
    pub fn resolved_symbol(&self) -> Option<&str> {
        self.symbol
            .as_deref()
            .or(self.symbol_description.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub last_trade: Option<f64>,
    pub quoted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub account_id: Option<String>,
    pub account_description: Option<String>,
    pub total_account_value: Option<f64>,
    pub cash_available_for_investment: Option<f64>,
    pub cash_buying_power: Option<f64>,
    pub margin_buying_power: Option<f64>,
}

impl Balance {
    /// Cash that can fund purchases without margin: the brokerage's cash available for
    /// investment, else its cash buying power. Negative balances count as zero.
    pub fn investable_cash(&self) -> Option<f64> {
        self.cash_available_for_investment
            .filter(|v| v.is_finite())
            .or(self.cash_buying_power.filter(|v| v.is_finite()))
            .map(|v| v.max(0.0))
    }
}

// Wire shapes. The brokerage collapses single-element arrays into a bare object, so every
// list goes through `OneOrMany`.

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(v) => vec![v],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountListEnvelope {
    #[serde(rename = "AccountListResponse")]
    pub response: AccountListResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountListResponse {
    #[serde(rename = "Accounts", default)]
    pub accounts: Option<AccountsWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountsWire {
    #[serde(rename = "Account", default)]
    pub account: OneOrMany<AccountWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountWire {
    pub account_id_key: String,
    pub account_id: Option<String>,
    pub account_desc: Option<String>,
    pub institution_type: Option<String>,
    pub account_status: Option<String>,
}

impl AccountListEnvelope {
    pub(crate) fn into_accounts(self) -> Vec<Account> {
        self.response
            .accounts
            .map(|a| a.account.into_vec())
            .unwrap_or_default()
            .into_iter()
            .map(|a| Account {
                account_id_key: a.account_id_key,
                account_id: a.account_id,
                description: a.account_desc,
                institution_type: a.institution_type,
                status: a.account_status,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortfolioEnvelope {
    #[serde(rename = "PortfolioResponse")]
    pub response: PortfolioResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortfolioResponse {
    #[serde(rename = "AccountPortfolio", default)]
    pub account_portfolio: OneOrMany<AccountPortfolioWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountPortfolioWire {
    #[serde(rename = "Position", default)]
    pub position: OneOrMany<PositionWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PositionWire {
    pub symbol_description: Option<String>,
    pub quantity: Option<f64>,
    pub market_value: Option<f64>,
    pub price_paid: Option<f64>,
    pub total_gain: Option<f64>,
    #[serde(rename = "Product")]
    pub product: Option<ProductWire>,
    #[serde(rename = "Quick")]
    pub quick: Option<QuickWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductWire {
    pub symbol: Option<String>,
    pub security_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuickWire {
    pub last_trade: Option<f64>,
}

impl PortfolioEnvelope {
    pub(crate) fn into_positions(self) -> Vec<Position> {
        self.response
            .account_portfolio
            .into_vec()
            .into_iter()
            .flat_map(|p| p.position.into_vec())
            .map(|p| {
                let (symbol, security_type) = match p.product {
                    Some(product) => (product.symbol, product.security_type),
                    None => (None, None),
                };
                Position {
                    symbol,
                    symbol_description: p.symbol_description,
                    security_type,
                    quantity: p.quantity,
                    market_value: p.market_value,
                    price_paid: p.price_paid,
                    total_gain: p.total_gain,
                    last_trade: p.quick.and_then(|q| q.last_trade),
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteEnvelope {
    #[serde(rename = "QuoteResponse")]
    pub response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteResponse {
    #[serde(rename = "QuoteData", default)]
    pub quote_data: OneOrMany<QuoteDataWire>,
    #[serde(rename = "Messages")]
    pub messages: Option<MessagesWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesWire {
    #[serde(rename = "Message", default)]
    pub message: OneOrMany<MessageWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageWire {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteDataWire {
    #[serde(rename = "dateTimeUTC")]
    pub date_time_utc: Option<i64>,
    #[serde(rename = "Product")]
    pub product: Option<ProductWire>,
    #[serde(rename = "All")]
    pub all: Option<AllWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AllWire {
    pub last_trade: Option<f64>,
}

impl QuoteEnvelope {
    /// Quotes plus the descriptions of any messages the brokerage attached (unknown symbols and
    /// the like).
    pub(crate) fn into_quotes(self) -> (Vec<Quote>, Vec<String>) {
        let messages = self
            .response
            .messages
            .map(|m| m.message.into_vec())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.description)
            .collect();

        let quotes = self
            .response
            .quote_data
            .into_vec()
            .into_iter()
            .filter_map(|q| {
                let symbol = q.product.and_then(|p| p.symbol)?;
                Some(Quote {
                    symbol: symbol.trim().to_string(),
                    last_trade: q.all.and_then(|a| a.last_trade),
                    quoted_at: q
                        .date_time_utc
                        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                })
            })
            .collect();

        (quotes, messages)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceEnvelope {
    #[serde(rename = "BalanceResponse")]
    pub response: BalanceResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BalanceResponse {
    pub account_id: Option<String>,
    pub account_description: Option<String>,
    #[serde(rename = "Computed")]
    pub computed: Option<ComputedWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ComputedWire {
    pub cash_available_for_investment: Option<f64>,
    pub cash_buying_power: Option<f64>,
    pub margin_buying_power: Option<f64>,
    #[serde(rename = "RealTimeValues")]
    pub real_time_values: Option<RealTimeValuesWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RealTimeValuesWire {
    pub total_account_value: Option<f64>,
}

impl BalanceEnvelope {
    pub(crate) fn into_balance(self) -> Balance {
        let BalanceResponse {
            account_id,
            account_description,
            computed,
        } = self.response;

        match computed {
            Some(c) => Balance {
                account_id,
                account_description,
                total_account_value: c.real_time_values.and_then(|r| r.total_account_value),
                cash_available_for_investment: c.cash_available_for_investment,
                cash_buying_power: c.cash_buying_power,
                margin_buying_power: c.margin_buying_power,
            },
            None => Balance {
                account_id,
                account_description,
                total_account_value: None,
                cash_available_for_investment: None,
                cash_buying_power: None,
                margin_buying_power: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(rename = "Error")]
    pub error: ErrorWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorWire {
    pub message: Option<String>,
}

/// `Error.message` from a brokerage error body, if the body has that shape.
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
}
