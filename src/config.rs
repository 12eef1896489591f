//! Feed configuration.

use crate::error::{FeedError, Result};
use std::time::Duration;

/// Environment variable overriding [`FeedConfig::stream_limit`].
pub const ENV_STREAM_LIMIT: &str = "CHANGEFEED_STREAM_LIMIT";

/// Environment variable overriding [`FeedConfig::subscribe_timeout`], in seconds.
pub const ENV_SUBSCRIBE_TIMEOUT: &str = "CHANGEFEED_SUBSCRIBE_TIMEOUT_SECS";

/// Limits and deadlines applied to subscriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedConfig {
    /// Max items delivered over a streaming connection.
    /// Default: 100
    pub stream_limit: usize,

    /// Max items delivered by a single-response request.
    /// Default: 1
    pub single_limit: usize,

    /// How long a subscription may wait for changes.
    /// Default: 5 minutes
    pub subscribe_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            stream_limit: 100,
            single_limit: 1,
            subscribe_timeout: Duration::from_secs(300),
        }
    }
}

impl FeedConfig {
    /// Defaults overridden by the `CHANGEFEED_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_STREAM_LIMIT) {
            config.stream_limit = parse_positive(ENV_STREAM_LIMIT, &raw)? as usize;
        }
        if let Some(raw) = lookup(ENV_SUBSCRIBE_TIMEOUT) {
            config.subscribe_timeout = Duration::from_secs(parse_positive(ENV_SUBSCRIBE_TIMEOUT, &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject limits or timeouts that could never deliver anything.
    pub fn validate(&self) -> Result<()> {
        if self.stream_limit == 0 || self.single_limit == 0 {
            return Err(FeedError::Config("delivery limits must be positive".into()));
        }
        if self.subscribe_timeout.is_zero() {
            return Err(FeedError::Config("subscribe timeout must be positive".into()));
        }
        Ok(())
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(FeedError::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
