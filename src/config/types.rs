use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub listen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How long a batch request waits for its aggregated report
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Age after which an incomplete aggregation group is evicted
    #[serde(with = "humantime_serde", default = "default_aggregation_timeout")]
    pub aggregation_timeout: Duration,

    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// Number of tasks consuming the result queue
    #[serde(default = "default_consumers")]
    pub consumers: usize,

    #[serde(default = "default_shards")]
    pub shards: usize,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_aggregation_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_consumers() -> usize {
    4
}

fn default_shards() -> usize {
    crate::shard::DEFAULT_SHARDS
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            aggregation_timeout: default_aggregation_timeout(),
            sweep_interval: default_sweep_interval(),
            consumers: default_consumers(),
            shards: default_shards(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

/// What the collector does with a second result for a unit it already has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Every delivery counts toward completion. Only correct when results are
    /// delivered at most once.
    Count,
    /// Drop results whose (unit key, unit index) was already received.
    #[default]
    Deduplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay applied before every provider call
    #[serde(with = "humantime_serde", default = "default_pacing_delay")]
    pub pacing_delay: Duration,

    pub provider: ProviderConfig,
}

fn default_concurrency() -> usize {
    4
}

fn default_pacing_delay() -> Duration {
    Duration::from_millis(1000)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub timeout: Duration,
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bound of each in-process queue
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1024
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}
