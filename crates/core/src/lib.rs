pub mod allocation;
pub mod brokerage;
pub mod domain;
pub mod service;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_BROKERAGE_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_BROKERAGE_RETRIES: u32 = 3;
    const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 45;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub brokerage_base_url: Option<String>,
        pub brokerage_authorization: Option<String>,
        pub brokerage_consumer_key: Option<String>,
        pub brokerage_timeout: Duration,
        pub brokerage_retries: u32,
        pub quote_max_age: Option<Duration>,
        pub collaborator_timeout: Duration,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                sentry_dsn: None,
                brokerage_base_url: None,
                brokerage_authorization: None,
                brokerage_consumer_key: None,
                brokerage_timeout: Duration::from_secs(DEFAULT_BROKERAGE_TIMEOUT_SECS),
                brokerage_retries: DEFAULT_BROKERAGE_RETRIES,
                quote_max_age: None,
                collaborator_timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let brokerage_timeout_secs = parse_env::<u64>("BROKERAGE_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_BROKERAGE_TIMEOUT_SECS);
            let brokerage_retries =
                parse_env::<u32>("BROKERAGE_RETRIES")?.unwrap_or(DEFAULT_BROKERAGE_RETRIES);
            anyhow::ensure!(brokerage_retries >= 1, "BROKERAGE_RETRIES must be >= 1");

            let collaborator_timeout_secs = parse_env::<u64>("COLLABORATOR_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_SECS);

            Ok(Self {
                sentry_dsn: non_empty_env("SENTRY_DSN"),
                brokerage_base_url: non_empty_env("BROKERAGE_BASE_URL"),
                brokerage_authorization: non_empty_env("BROKERAGE_AUTHORIZATION"),
                brokerage_consumer_key: non_empty_env("BROKERAGE_CONSUMER_KEY"),
                brokerage_timeout: Duration::from_secs(brokerage_timeout_secs),
                brokerage_retries,
                quote_max_age: parse_env::<u64>("QUOTE_MAX_AGE_SECS")?.map(Duration::from_secs),
                collaborator_timeout: Duration::from_secs(collaborator_timeout_secs),
            })
        }

        pub fn brokerage_configured(&self) -> bool {
            self.brokerage_base_url.is_some()
        }

        pub fn require_brokerage_base_url(&self) -> anyhow::Result<&str> {
            self.brokerage_base_url
                .as_deref()
                .context("BROKERAGE_BASE_URL is required")
        }

        pub fn require_brokerage_authorization(&self) -> anyhow::Result<&str> {
            self.brokerage_authorization
                .as_deref()
                .context("BROKERAGE_AUTHORIZATION is required")
        }
    }

    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    // A present but malformed value is an error rather than a silent fallback to the default.
    fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match non_empty_env(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} is not valid: {raw}")),
            None => Ok(None),
        }
    }
}
