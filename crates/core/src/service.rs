use crate::allocation::{allocate, AllocationError, ValidationError};
use crate::brokerage::{
    Account, AccountsClient, Balance, HttpBrokerageClient, MarketClient, Position, Quote,
};
use crate::config::Settings;
use crate::domain::allocation::{
    normalize_symbol, AllocationReport, InvestmentAmount, PortfolioSnapshot, PriceTable,
    TargetAllocation,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A collaborator call did not finish within the service bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorTimeout {
    pub operation: &'static str,
    pub timeout: Duration,
}

impl fmt::Display for CollaboratorTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} timed out after {:?}", self.operation, self.timeout)
    }
}

impl std::error::Error for CollaboratorTimeout {}

/// Position statistics for an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_positions: usize,
    pub total_market_value: f64,
    pub total_gain_loss: f64,
    pub positions_with_gains: usize,
    pub positions_with_losses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account_id_key: String,
    pub balance: Balance,
    pub portfolio_summary: PortfolioSummary,
    pub positions: Vec<Position>,
}

/// Gathers holdings and prices for an account and runs the allocation pipeline over them.
///
/// Holds no per-account state; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct AllocationService {
    accounts: Arc<dyn AccountsClient>,
    market: Arc<dyn MarketClient>,
    collaborator_timeout: Duration,
    quote_max_age: Option<Duration>,
}

impl AllocationService {
    pub fn new(accounts: Arc<dyn AccountsClient>, market: Arc<dyn MarketClient>) -> Self {
        let defaults = Settings::default();
        Self {
            accounts,
            market,
            collaborator_timeout: defaults.collaborator_timeout,
            quote_max_age: defaults.quote_max_age,
        }
    }

    /// One HTTP client serves as both collaborators.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Arc::new(HttpBrokerageClient::from_settings(settings)?);
        Ok(Self::new(client.clone(), client)
            .with_collaborator_timeout(settings.collaborator_timeout)
            .with_quote_max_age(settings.quote_max_age))
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_quote_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.quote_max_age = max_age;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.accounts.provider_name()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.bounded("list accounts", self.accounts.list_accounts())
            .await
            .context("failed to list brokerage accounts")
    }

    pub async fn balance(&self, account_id_key: &str) -> Result<Balance> {
        self.bounded("balance", self.accounts.balance(account_id_key))
            .await
            .with_context(|| format!("failed to fetch balance for account {account_id_key}"))
    }

    pub async fn account_summary(&self, account_id_key: &str) -> Result<AccountSummary> {
        let (balance, positions) =
            tokio::try_join!(self.balance(account_id_key), self.positions(account_id_key))?;

        Ok(AccountSummary {
            account_id_key: account_id_key.to_string(),
            balance,
            portfolio_summary: summarize_positions(&positions),
            positions,
        })
    }

    pub async fn portfolio_snapshot(
        &self,
        account_id_key: &str,
    ) -> Result<(PortfolioSnapshot, Vec<Position>)> {
        let positions = self.positions(account_id_key).await?;
        let snapshot = snapshot_from_positions(&positions)?;
        Ok((snapshot, positions))
    }

    /// Prices for `symbols` that the market returned with a usable, fresh last trade. Symbols
    /// without one are absent from the table.
    pub async fn price_table(&self, symbols: &[String]) -> Result<(PriceTable, Vec<Quote>)> {
        let quotes = self
            .bounded("quotes", self.market.quotes(symbols))
            .await
            .context("failed to fetch quotes")?;

        let table = price_table_from_quotes(symbols, &quotes, self.quote_max_age, Utc::now())?;
        Ok((table, quotes))
    }

    /// Allocation against the account's holdings and live quotes.
    ///
    /// Without an `amount` the account's investable cash is invested; an explicit amount may not
    /// exceed it.
    pub async fn calculate_allocation(
        &self,
        account_id_key: &str,
        target: &TargetAllocation,
        amount: Option<InvestmentAmount>,
    ) -> Result<AllocationReport> {
        let symbols: Vec<String> = target.symbols().map(str::to_string).collect();

        let ((snapshot, positions), (prices, _), balance) = tokio::try_join!(
            self.portfolio_snapshot(account_id_key),
            self.price_table(&symbols),
            self.balance(account_id_key),
        )?;

        let amount = resolve_investment_amount(amount, &balance).map_err(AllocationError::from)?;

        if prices.is_empty() {
            tracing::warn!(account_id_key, symbols = symbols.len(), "no usable quotes for target");
        }
        tracing::info!(
            account_id_key,
            positions = positions.len(),
            priced = prices.len(),
            symbols = symbols.len(),
            amount = amount.value(),
            "allocation inputs gathered"
        );

        let report = allocate(target, amount, &snapshot, &prices)?;
        Ok(report)
    }

    async fn positions(&self, account_id_key: &str) -> Result<Vec<Position>> {
        self.bounded("portfolio", self.accounts.portfolio(account_id_key))
            .await
            .with_context(|| format!("failed to fetch portfolio for account {account_id_key}"))
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.collaborator_timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout = ?self.collaborator_timeout,
                    "collaborator call timed out"
                );
                Err(CollaboratorTimeout {
                    operation,
                    timeout: self.collaborator_timeout,
                }
                .into())
            }
        }
    }
}

/// The requested amount, checked against the account's investable cash, or that cash when no
/// amount was requested. An account that reports no cash figure leaves an explicit amount
/// unchecked.
pub fn resolve_investment_amount(
    requested: Option<InvestmentAmount>,
    balance: &Balance,
) -> Result<InvestmentAmount, ValidationError> {
    let available = balance.investable_cash();
    match (requested, available) {
        (Some(amount), Some(available)) if amount.value() > available => {
            Err(ValidationError::ExceedsAvailableCash {
                amount: amount.value(),
                available,
            })
        }
        (Some(amount), _) => Ok(amount),
        (None, Some(available)) => InvestmentAmount::new(available),
        (None, None) => Err(ValidationError::AmountRequired),
    }
}

pub fn summarize_positions(positions: &[Position]) -> PortfolioSummary {
    let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
    PortfolioSummary {
        total_positions: positions.len(),
        total_market_value: positions.iter().filter_map(|p| finite(p.market_value)).sum(),
        total_gain_loss: positions.iter().filter_map(|p| finite(p.total_gain)).sum(),
        positions_with_gains: positions
            .iter()
            .filter(|p| finite(p.total_gain).is_some_and(|g| g > 0.0))
            .count(),
        positions_with_losses: positions
            .iter()
            .filter(|p| finite(p.total_gain).is_some_and(|g| g < 0.0))
            .count(),
    }
}

/// Dollar value per symbol across positions, keyed by the normalized symbol.
///
/// Duplicate symbols (the same holding in several account portfolios) are summed. Positions
/// without a symbol or market value are skipped; short positions count as zero.
pub fn snapshot_from_positions(positions: &[Position]) -> Result<PortfolioSnapshot> {
    let mut values: BTreeMap<String, f64> = BTreeMap::new();

    for position in positions {
        let Some(symbol) = position.resolved_symbol() else {
            tracing::warn!(
                security_type = ?position.security_type,
                "position without symbol; skipping"
            );
            continue;
        };
        let Some(mut value) = position.market_value.filter(|v| v.is_finite()) else {
            tracing::warn!(symbol, "position without market value; skipping");
            continue;
        };
        if value < 0.0 {
            tracing::warn!(symbol, market_value = value, "short position counted as zero");
            value = 0.0;
        }

        *values.entry(normalize_symbol(symbol)).or_insert(0.0) += value;
    }

    PortfolioSnapshot::new(values).context("brokerage positions do not form a valid snapshot")
}

/// Last-trade prices for `symbols`, keyed by the normalized symbol.
///
/// Quote symbols match after the same normalization. Quotes without a positive finite last trade are
/// dropped, as are quotes older than `max_age` when one is set (a quote without a timestamp is
/// then treated as stale too).
pub fn price_table_from_quotes(
    symbols: &[String],
    quotes: &[Quote],
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<PriceTable> {
    let mut prices: BTreeMap<String, f64> = BTreeMap::new();

    for symbol in symbols {
        let symbol = normalize_symbol(symbol);
        let Some(quote) = quotes.iter().find(|q| normalize_symbol(&q.symbol) == symbol) else {
            continue;
        };

        let Some(price) = quote.last_trade.filter(|p| p.is_finite() && *p > 0.0) else {
            tracing::warn!(
                symbol = %symbol,
                last_trade = ?quote.last_trade,
                "quote without usable price; skipping"
            );
            continue;
        };

        if let Some(max_age) = max_age {
            if is_stale(quote.quoted_at, max_age, now) {
                tracing::warn!(
                    symbol = %symbol,
                    quoted_at = ?quote.quoted_at,
                    ?max_age,
                    "stale quote; skipping"
                );
                continue;
            }
        }

        prices.insert(symbol, price);
    }

    PriceTable::new(prices).context("brokerage quotes do not form a valid price table")
}

fn is_stale(quoted_at: Option<DateTime<Utc>>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some(quoted_at) = quoted_at else {
        return true;
    };
    match chrono::Duration::from_std(max_age) {
        Ok(max_age) => now.signed_duration_since(quoted_at) > max_age,
        Err(_) => false,
    }
}
