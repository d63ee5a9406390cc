//! Response-latency collection and statistics.
//!
//! Workers append `(label, latency, success)` samples under one mutex; the
//! report folds over the whole log once the run is over. Percentiles use
//! nearest rank on the sorted successful latencies (`sorted[floor(q * n)]`),
//! without interpolation.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Label used for ingestion samples.
pub const WRITE_LABEL: &str = "write";
/// Label used for query samples.
pub const READ_LABEL: &str = "read";

const NANOS_PER_MILLI: f64 = 1_000_000.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("average latency of {count} samples cannot be represented")]
    AverageOverflow { count: usize },
}

#[derive(Debug, Clone)]
struct Sample {
    label: String,
    latency_ns: i64,
    success: bool,
}

#[derive(Debug, Default)]
struct Window {
    start: Option<Instant>,
    end: Option<Instant>,
}

/// Thread-safe, append-only latency log.
#[derive(Debug, Default)]
pub struct Collector {
    samples: Mutex<Vec<Sample>>,
    window: Mutex<Window>,
}

/// Summary of one group of samples. Latencies are in milliseconds, rounded
/// to one decimal place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RespTimeResult {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub fail: usize,
    pub total: usize,
    pub qps: f64,
    pub run_sec: f64,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&self, label: &str, latency: Duration, success: bool) {
        let latency_ns = i64::try_from(latency.as_nanos()).unwrap_or(i64::MAX);
        self.samples.lock().push(Sample {
            label: label.to_string(),
            latency_ns,
            success,
        });
    }

    pub fn set_start(&self, at: Instant) {
        self.window.lock().start = Some(at);
    }

    pub fn set_end(&self, at: Instant) {
        self.window.lock().end = Some(at);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run window in seconds, or zero when either mark is missing.
    fn run_secs(&self) -> f64 {
        let window = self.window.lock();
        match (window.start, window.end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Statistics over every sample regardless of label.
    pub fn detail(&self) -> Result<RespTimeResult, StatsError> {
        let run_secs = self.run_secs();
        let samples = self.samples.lock();
        summarize(samples.iter(), run_secs)
    }

    /// Statistics partitioned by label.
    pub fn group_detail(&self) -> Result<BTreeMap<String, RespTimeResult>, StatsError> {
        let run_secs = self.run_secs();
        let samples = self.samples.lock();

        let mut groups: BTreeMap<&str, Vec<&Sample>> = BTreeMap::new();
        for sample in samples.iter() {
            groups.entry(sample.label.as_str()).or_default().push(sample);
        }

        groups
            .into_iter()
            .map(|(label, group)| Ok((label.to_string(), summarize(group.into_iter(), run_secs)?)))
            .collect()
    }
}

fn summarize<'a>(
    samples: impl Iterator<Item = &'a Sample>,
    run_secs: f64,
) -> Result<RespTimeResult, StatsError> {
    let mut total = 0;
    let mut latencies = Vec::new();
    for sample in samples {
        total += 1;
        if sample.success {
            latencies.push(sample.latency_ns);
        }
    }
    latencies.sort_unstable();

    let success = latencies.len();
    let mut result = RespTimeResult {
        fail: total - success,
        total,
        run_sec: round1(run_secs),
        ..Default::default()
    };
    if success == 0 {
        return Ok(result);
    }

    result.p50 = to_millis(latencies[nearest_rank(0.50, success)]);
    result.p90 = to_millis(latencies[nearest_rank(0.90, success)]);
    result.p95 = to_millis(latencies[nearest_rank(0.95, success)]);
    result.p99 = to_millis(latencies[nearest_rank(0.99, success)]);
    result.min = to_millis(latencies[0]);
    result.max = to_millis(latencies[success - 1]);
    result.avg = to_millis(safe_average(&latencies)?);
    if run_secs > 0.0 {
        result.qps = round1(success as f64 / run_secs);
    }
    Ok(result)
}

/// Index of the `q` quantile in a sorted list of `n` values.
fn nearest_rank(q: f64, n: usize) -> usize {
    ((q * n as f64).floor() as usize).min(n - 1)
}

fn to_millis(nanos: i64) -> f64 {
    round1(nanos as f64 / NANOS_PER_MILLI)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Mean of non-negative values without overflowing an `i64` accumulator.
///
/// Whenever adding the next value would overflow, `i64::MAX` is folded out
/// of the running total and counted in `high`. The mean is then
/// `high * (i64::MAX / n) + total / n`, which is exact up to integer
/// division error.
pub fn safe_average(values: &[i64]) -> Result<i64, StatsError> {
    if values.is_empty() {
        return Ok(0);
    }
    let count = values.len();

    let mut total: i64 = 0;
    let mut high: i64 = 0;
    for &v in values {
        debug_assert!(v >= 0, "latencies are non-negative");
        if total.checked_add(v).is_none() {
            total -= i64::MAX;
            high += 1;
        }
        total += v;
    }

    let n = count as i64;
    high.checked_mul(i64::MAX / n)
        .and_then(|carried| carried.checked_add(total / n))
        .ok_or(StatsError::AverageOverflow { count })
}

impl RespTimeResult {
    /// Flat `metric(unit) -> value` view for tabular reports.
    pub fn to_string_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("P50(ms)", format!("{:.1}", self.p50));
        map.insert("P90(ms)", format!("{:.1}", self.p90));
        map.insert("P95(ms)", format!("{:.1}", self.p95));
        map.insert("P99(ms)", format!("{:.1}", self.p99));
        map.insert("Min(ms)", format!("{:.1}", self.min));
        map.insert("Max(ms)", format!("{:.1}", self.max));
        map.insert("Avg(ms)", format!("{:.1}", self.avg));
        map.insert("Qps", format!("{:.1}", self.qps));
        map.insert("Fail", self.fail.to_string());
        map.insert("Total", self.total.to_string());
        map.insert("RunSec(s)", format!("{:.1}", self.run_sec));
        map
    }
}
