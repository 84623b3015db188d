//! Runtime configuration.

use crate::backend::inmemory::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use crate::reconcile::{ReconcileConfig, WriteStrategy};
use std::time::Duration;

/// Default number of compare-and-swap retries per reconciliation.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default base backoff between retries (doubled per attempt).
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Process-wide settings.
///
/// Built from defaults, optionally overridden by environment variables:
///
/// | Variable | Meaning | Default |
/// |---|---|---|
/// | `BIZOPS_WRITE_STRATEGY` | `cas` or `last-writer-wins` | `cas` |
/// | `BIZOPS_RETRY_COUNT` | conflict retries | `3` |
/// | `BIZOPS_RETRY_BACKOFF_MS` | base backoff | `25` |
/// | `BIZOPS_LIVE_QUERY_CAPACITY` | change buffer per collection | `256` |
#[derive(Clone, Debug, PartialEq)]
pub struct OpsConfig {
    pub write_strategy: WriteStrategy,
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub live_query_capacity: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        OpsConfig {
            write_strategy: WriteStrategy::default(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            live_query_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl OpsConfig {
    /// Defaults overridden by `BIZOPS_*` environment variables.
    ///
    /// # Errors
    ///
    /// `Error::ConfigError` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = OpsConfig::default();

        if let Some(raw) = lookup("BIZOPS_WRITE_STRATEGY") {
            config.write_strategy = raw.parse()?;
        }
        if let Some(raw) = lookup("BIZOPS_RETRY_COUNT") {
            config.retry_count = parse_number("BIZOPS_RETRY_COUNT", &raw)?;
        }
        if let Some(raw) = lookup("BIZOPS_RETRY_BACKOFF_MS") {
            config.retry_backoff =
                Duration::from_millis(parse_number("BIZOPS_RETRY_BACKOFF_MS", &raw)?);
        }
        if let Some(raw) = lookup("BIZOPS_LIVE_QUERY_CAPACITY") {
            let capacity: usize = parse_number("BIZOPS_LIVE_QUERY_CAPACITY", &raw)?;
            if capacity == 0 {
                return Err(Error::ConfigError(
                    "BIZOPS_LIVE_QUERY_CAPACITY must be at least 1".to_string(),
                ));
            }
            config.live_query_capacity = capacity;
        }

        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    /// Reconciler settings derived from this config.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig::default()
            .with_strategy(self.write_strategy)
            .with_retry(self.retry_count)
            .with_backoff(self.retry_backoff)
    }
}

fn parse_number<N: std::str::FromStr>(key: &str, raw: &str) -> Result<N> {
    raw.trim()
        .parse()
        .map_err(|_| Error::ConfigError(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}
