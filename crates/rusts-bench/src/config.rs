//! Configuration structs for the load-testing harness.
//!
//! Loaded from YAML (every section optional, missing keys take defaults)
//! and then overridden by command-line flags.

use crate::entity::UseCase;
use crate::ingest::{BackoffConfig, BackpressureDetector, CompressionConfig};
use crate::simulator::SimulatorConfig;
use crate::transport::QueryApi;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid {field} time '{value}': {source}")]
    InvalidTime {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration for a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server URL (e.g., "http://localhost:8086")
    pub server_url: String,

    /// Target database name
    pub database: String,

    /// How queries are submitted
    pub query_api: QueryApi,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Wall-clock limit for the run in seconds (0 = until the dataset is exhausted)
    pub duration_secs: u64,

    /// What to generate
    pub simulation: SimulationConfig,

    /// Write workload
    pub write: WriteConfig,

    /// Query workload
    pub query: QueryConfig,

    /// Output file for the report (optional)
    pub output_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8086".to_string(),
            database: "benchmark".to_string(),
            query_api: QueryApi::default(),
            request_timeout_secs: 30,
            duration_secs: 0,
            simulation: SimulationConfig::default(),
            write: WriteConfig::default(),
            query: QueryConfig::default(),
            output_file: None,
        }
    }
}

/// Dataset shape: which entities, how many, over which window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub use_case: UseCase,

    /// Start of the simulated window (RFC 3339)
    pub start: String,

    /// End of the simulated window (RFC 3339, exclusive)
    pub end: String,

    /// Sampling interval in milliseconds
    pub interval_ms: u64,

    /// Number of entities to simulate
    pub entity_count: u64,

    /// First entity number, so several generators can split one fleet
    pub entity_offset: u64,

    /// Seed for field values and query variety
    pub seed: u64,

    /// Query templates; empty means the use case defaults
    pub queries: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            use_case: UseCase::Vehicle,
            start: "2018-01-01T00:00:00Z".to_string(),
            end: "2018-01-02T00:00:00Z".to_string(),
            interval_ms: 10_000,
            entity_count: 100,
            entity_offset: 0,
            seed: 12345,
            queries: Vec::new(),
        }
    }
}

/// Configuration for the write workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Number of parallel write workers
    pub workers: usize,

    /// Points per batch
    pub batch_size: usize,

    /// Gzip request bodies
    pub compression: CompressionConfig,

    /// Retry pacing on backpressure
    pub backoff: BackoffConfig,

    /// What counts as backpressure
    pub backpressure: BackpressureDetector,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 5000,
            compression: CompressionConfig::default(),
            backoff: BackoffConfig::default(),
            backpressure: BackpressureDetector::default(),
        }
    }
}

/// Configuration for the query workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of parallel query workers
    pub workers: usize,

    /// Stop after this many queries (0 = no limit)
    pub limit: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            limit: 1000,
        }
    }
}

/// Mode of operation for the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadMode {
    /// Write data only (no queries)
    WriteOnly,
    /// Query existing data only (no writes)
    QueryOnly,
    /// Combined read/write benchmark
    Benchmark,
}

impl WorkloadMode {
    pub fn writes(&self) -> bool {
        *self != WorkloadMode::QueryOnly
    }

    pub fn queries(&self) -> bool {
        *self != WorkloadMode::WriteOnly
    }
}

impl std::fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadMode::WriteOnly => write!(f, "write-only"),
            WorkloadMode::QueryOnly => write!(f, "query-only"),
            WorkloadMode::Benchmark => write!(f, "benchmark"),
        }
    }
}

impl Config {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Wall-clock deadline, if any.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn validate(&self, mode: WorkloadMode) -> Result<(), ConfigError> {
        if mode.writes() && (self.write.workers == 0 || self.write.batch_size == 0) {
            return Err(ConfigError::Invalid(
                "write.workers and write.batch_size must be positive".to_string(),
            ));
        }
        if mode.queries() && self.query.workers == 0 {
            return Err(ConfigError::Invalid(
                "query.workers must be positive".to_string(),
            ));
        }
        if mode == WorkloadMode::QueryOnly && self.query.limit == 0 && self.duration_secs == 0 {
            return Err(ConfigError::Invalid(
                "query-only runs need query.limit or duration_secs".to_string(),
            ));
        }
        if self.write.backoff.base.is_zero() {
            return Err(ConfigError::Invalid(
                "write.backoff.base must be positive".to_string(),
            ));
        }
        self.write
            .compression
            .validate()
            .map_err(ConfigError::Invalid)?;
        Ok(())
    }

    /// Build simulator parameters, filling in default query templates.
    pub fn simulator_config(&self) -> Result<SimulatorConfig, ConfigError> {
        let sim = &self.simulation;
        let queries = if sim.queries.is_empty() {
            default_queries(sim.use_case)
                .iter()
                .map(|q| q.to_string())
                .collect()
        } else {
            sim.queries.clone()
        };

        Ok(SimulatorConfig {
            use_case: sim.use_case,
            start: parse_time("start", &sim.start)?,
            end: parse_time("end", &sim.end)?,
            interval: Duration::from_millis(sim.interval_ms),
            entity_count: sim.entity_count,
            entity_offset: sim.entity_offset,
            seed: sim.seed,
            queries,
        })
    }
}

/// Parse an RFC 3339 time into nanoseconds since the epoch.
fn parse_time(field: &'static str, value: &str) -> Result<i64, ConfigError> {
    let parsed = DateTime::parse_from_rfc3339(value).map_err(|source| {
        ConfigError::InvalidTime {
            field,
            value: value.to_string(),
            source,
        }
    })?;
    parsed.timestamp_nanos_opt().ok_or_else(|| {
        ConfigError::Invalid(format!("{} time '{}' is out of range", field, value))
    })
}

/// Query templates used when none are configured.
pub fn default_queries(use_case: UseCase) -> &'static [&'static str] {
    match use_case {
        UseCase::Vehicle => &[
            "SELECT * FROM vehicle WHERE vin = '{vin}' AND time >= '{start}' AND time < '{now}'",
            "SELECT max(speed) FROM vehicle WHERE province = '{province}' AND time >= '{start}' AND time < '{now}' GROUP BY time(1h)",
            "SELECT last(mileage) FROM vehicle WHERE vin = '{vin}'",
        ],
        UseCase::AirQuality => &[
            "SELECT mean(aqi) FROM air_quality WHERE city = '{city}' AND time >= '{start}' AND time < '{now}' GROUP BY time(1h)",
            "SELECT max(pm25) FROM air_quality WHERE site_id = '{site_id}' AND time < '{now}'",
            "SELECT mean(no2) FROM air_quality WHERE county = '{county}' AND site_type = '{site_type}' AND time >= '{start}' AND time < '{now}'",
        ],
        UseCase::Devops => &[
            "SELECT max(usage_user) FROM cpu WHERE hostname = '{hostname}' AND time >= '{start}' AND time < '{now}' GROUP BY time(1m)",
            "SELECT mean(used_percent) FROM mem WHERE region = '{region}' AND time >= '{start}' AND time < '{now}' GROUP BY hostname",
            "SELECT last(bytes_recv) FROM net WHERE datacenter = '{datacenter}'",
        ],
        UseCase::Device => &[
            "SELECT * FROM device WHERE device_id = '{device_id}' AND time >= '{start}' AND time < '{now}'",
            "SELECT mean(v0), max(v9) FROM device WHERE model = '{model}' AND time < '{now}' GROUP BY time(10m)",
        ],
    }
}
