use crate::core::{ExpiryError, Result};
use crate::policy::PolicyTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Resubscription backoff for the change-feed consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum consecutive resubscription attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the exponential delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Settings for the change-event consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum deadline writes in flight across all records.
    pub max_inflight: usize,
    pub retry: RetryPolicy,
    /// How long shutdown waits for in-flight writes; `None` waits indefinitely.
    pub drain_timeout_ms: Option<u64>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_inflight: 64,
            retry: RetryPolicy::default(),
            drain_timeout_ms: None,
        }
    }
}

/// Settings for the in-memory store's expiration sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_ms: 1_000 }
    }
}

/// Complete configuration: which collection, which policy, how to run.
///
/// # Examples
///
/// ```
/// use ttlpolicy::ExpiryConfig;
///
/// let config = ExpiryConfig::from_json_str(r#"{
///     "collection": "connections",
///     "policy": { "Temporary": { "expire_after_secs": 864000 }, "Active": "clear" }
/// }"#).unwrap();
/// assert_eq!(config.consumer.max_inflight, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub collection: String,
    pub policy: PolicyTable,
    pub consumer: ConsumerConfig,
    pub sweeper: SweeperConfig,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            collection: "connections".to_string(),
            policy: PolicyTable::default(),
            consumer: ConsumerConfig::default(),
            sweeper: SweeperConfig::default(),
        }
    }
}

impl ExpiryConfig {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Self::default()
        }
    }

    pub fn policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    pub fn max_inflight(mut self, max: usize) -> Self {
        self.consumer.max_inflight = max;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.consumer.retry = retry;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweeper.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(ExpiryError::InvalidConfig(
                "collection cannot be empty".to_string(),
            ));
        }

        if self.consumer.max_inflight == 0 {
            return Err(ExpiryError::InvalidConfig(
                "consumer.max_inflight must be > 0".to_string(),
            ));
        }

        let retry = &self.consumer.retry;
        if retry.max_attempts == 0 {
            return Err(ExpiryError::InvalidConfig(
                "consumer.retry.max_attempts must be > 0".to_string(),
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ExpiryError::InvalidConfig(
                "consumer.retry.initial_backoff_ms cannot exceed max_backoff_ms".to_string(),
            ));
        }

        if self.sweeper.interval_ms < 10 {
            return Err(ExpiryError::InvalidConfig(
                "sweeper.interval_ms must be >= 10".to_string(),
            ));
        }

        self.policy.validate()
    }
}
