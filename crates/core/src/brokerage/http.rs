use crate::brokerage::types::{
    error_message, AccountListEnvelope, BalanceEnvelope, PortfolioEnvelope, QuoteEnvelope,
};
use crate::brokerage::{
    validate_account_id_key, Account, AccountsClient, Balance, MarketClient, Position, Quote,
};
use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

// Header names are case-insensitive on the wire; `HeaderName` requires lowercase.
const CONSUMER_KEY: HeaderName = HeaderName::from_static("consumerkey");

/// The quote endpoint accepts at most this many comma-separated symbols.
pub const MAX_SYMBOLS_PER_QUOTE: usize = 25;

const INSTITUTION_TYPE: &str = "BROKERAGE";

#[derive(Debug, Clone)]
pub struct HttpBrokerageClient {
    http: reqwest::Client,
    base_url: Url,
    headers: HeaderMap,
    retries: u32,
}

impl HttpBrokerageClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let raw_base_url = settings.require_brokerage_base_url()?;
        let base_url = Url::parse(raw_base_url)
            .with_context(|| format!("BROKERAGE_BASE_URL is not a valid URL: {raw_base_url}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "BROKERAGE_BASE_URL must be an http(s) base URL"
        );
        let authorization = settings.require_brokerage_authorization()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(authorization)
                .context("BROKERAGE_AUTHORIZATION is not a valid header value")?,
        );
        if let Some(consumer_key) = &settings.brokerage_consumer_key {
            headers.insert(
                CONSUMER_KEY,
                HeaderValue::from_str(consumer_key)
                    .context("BROKERAGE_CONSUMER_KEY is not a valid header value")?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(settings.brokerage_timeout)
            .build()
            .context("failed to build brokerage http client")?;

        Ok(Self {
            http,
            base_url,
            headers,
            retries: settings.brokerage_retries.max(1),
        })
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment so caller data
    /// can never change which endpoint is addressed.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("brokerage base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET with bounded retries on transport errors, 429 and 5xx. `Ok(None)` means 204.
    ///
    /// Response bodies stay out of the returned error (only the brokerage's `Error.message`
    /// is kept); the body is logged at debug level.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        what: &'static str,
    ) -> Result<Option<T>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let res = self
                .http
                .get(url.clone())
                .headers(self.headers.clone())
                .query(query)
                .send()
                .await;

            let res = match res {
                Ok(r) => r,
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err)
                            .with_context(|| format!("brokerage {what} request failed"));
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        what,
                        error = %err,
                        "brokerage request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let status = res.status();
            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let text = res
                .text()
                .await
                .with_context(|| format!("failed to read brokerage {what} response"))?;

            if !status.is_success() {
                let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if retryable && attempt < self.retries {
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        what,
                        http_status = %status,
                        "brokerage HTTP error; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                tracing::debug!(what, http_status = %status, body = %text, "brokerage error body");
                match error_message(&text) {
                    Some(message) => anyhow::bail!("brokerage {what} HTTP {status}: {message}"),
                    None => anyhow::bail!("brokerage {what} HTTP {status}"),
                }
            }

            return match serde_json::from_str::<T>(&text) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(err) => {
                    tracing::debug!(what, body = %text, "unparseable brokerage response");
                    Err(err).with_context(|| format!("failed to parse brokerage {what} response"))
                }
            };
        }
    }
}

fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Upper-cased, de-duplicated symbols in request-sized batches, first-seen order kept.
fn quote_batches(symbols: &[String]) -> Vec<Vec<String>> {
    let mut unique: Vec<String> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !unique.contains(&symbol) {
            unique.push(symbol);
        }
    }
    unique
        .chunks(MAX_SYMBOLS_PER_QUOTE)
        .map(<[String]>::to_vec)
        .collect()
}

#[async_trait::async_trait]
impl AccountsClient for HttpBrokerageClient {
    fn provider_name(&self) -> &'static str {
        "etrade_http_json"
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let url = self.endpoint(&["v1", "accounts", "list.json"])?;
        let body = self
            .get_json::<AccountListEnvelope>(url, &[], "account list")
            .await?;
        Ok(body.map(AccountListEnvelope::into_accounts).unwrap_or_default())
    }

    async fn portfolio(&self, account_id_key: &str) -> Result<Vec<Position>> {
        let key = validate_account_id_key(account_id_key)?;

        let url = self.endpoint(&["v1", "accounts", key, "portfolio.json"])?;
        let body = self.get_json::<PortfolioEnvelope>(url, &[], "portfolio").await?;
        let positions = body.map(PortfolioEnvelope::into_positions).unwrap_or_default();

        tracing::debug!(account_id_key = key, positions = positions.len(), "portfolio fetched");
        Ok(positions)
    }

    async fn balance(&self, account_id_key: &str) -> Result<Balance> {
        let key = validate_account_id_key(account_id_key)?;

        let url = self.endpoint(&["v1", "accounts", key, "balance.json"])?;
        let body = self
            .get_json::<BalanceEnvelope>(
                url,
                &[("instType", INSTITUTION_TYPE), ("realTimeNAV", "true")],
                "balance",
            )
            .await?
            .context("brokerage returned no balance")?;
        Ok(body.into_balance())
    }
}

#[async_trait::async_trait]
impl MarketClient for HttpBrokerageClient {
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>> {
        let mut out = Vec::new();
        for batch in quote_batches(symbols) {
            let segment = format!("{}.json", batch.join(","));
            let url = self.endpoint(&["v1", "market", "quote", &segment])?;
            let body = self.get_json::<QuoteEnvelope>(url, &[], "quote").await?;
            let Some(body) = body else { continue };

            let (quotes, messages) = body.into_quotes();
            for message in messages {
                tracing::warn!(message = %message, "brokerage quote message");
            }
            out.extend(quotes);
        }
        Ok(out)
    }
}
