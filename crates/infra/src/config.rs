//! Broker configuration.

use std::time::Duration;

use tracing::warn;

use crate::workers::StopPolicy;

pub const ENV_TIMEOUT_MS: &str = "FOLIO_BROKER_TIMEOUT_MS";
pub const ENV_LIMIT: &str = "FOLIO_BROKER_LIMIT";
pub const ENV_THROTTLE_MS: &str = "FOLIO_BROKER_THROTTLE_MS";

/// Broker polling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Lease lifetime granted on each poll
    pub timeout: Duration,
    /// Maximum events delivered per poll
    pub limit: usize,
    /// Back-off before re-polling an idle consumer
    pub throttle: Duration,
    /// Bounded wait applied when stopping consumer loops
    pub stop: StopPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            limit: 100,
            throttle: Duration::from_millis(500),
            stop: StopPolicy::default(),
        }
    }
}

impl BrokerConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_stop_policy(mut self, ticks: u32, tick: Duration) -> Self {
        self.stop = StopPolicy { ticks, tick };
        self
    }

    /// Defaults overridden by `FOLIO_BROKER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`BrokerConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse(&lookup, ENV_TIMEOUT_MS) {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = parse(&lookup, ENV_LIMIT) {
            config.limit = limit;
        }
        if let Some(ms) = parse(&lookup, ENV_THROTTLE_MS) {
            config.throttle = Duration::from_millis(ms);
        }
        config
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring invalid broker setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.limit, 100);
        assert_eq!(config.throttle, Duration::from_millis(500));
        assert_eq!(config.stop.ticks, 30);
        assert_eq!(config.stop.tick, Duration::from_secs(1));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = BrokerConfig::from_lookup(env(&[
            (ENV_TIMEOUT_MS, "250"),
            (ENV_LIMIT, "7"),
            (ENV_THROTTLE_MS, " 20 "),
        ]));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.limit, 7);
        assert_eq!(config.throttle, Duration::from_millis(20));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = BrokerConfig::from_lookup(env(&[(ENV_LIMIT, "lots"), (ENV_TIMEOUT_MS, "-1")]));
        assert_eq!(config, BrokerConfig::default());
    }
}
