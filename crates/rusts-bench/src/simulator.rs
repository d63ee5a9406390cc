//! Deterministic, lock-free point and query generator.
//!
//! The only shared mutable state on the hot path is a handful of atomic
//! counters. Every call to [`Simulator::next`] takes a unique point number
//! from `made_points`; everything else (entity, measurement, timestamp and
//! field values) is a pure function of that number. Workers can therefore
//! call `next` concurrently without coordination and still produce exactly
//! the same dataset as a single-threaded run.

use crate::entity::{Entity, UseCase};
use crate::template::{SqlTemplate, TemplateError};
use chrono::{SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusts_bench_core::{Point, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("end time {end} must be after start time {start}")]
    InvalidTimeRange { start: Timestamp, end: Timestamp },

    #[error("time range {start}..{end} is too wide to count in nanoseconds")]
    TimeRangeTooWide { start: Timestamp, end: Timestamp },

    #[error("sampling interval must be positive")]
    ZeroInterval,

    #[error("entity count must be positive")]
    NoEntities,

    #[error("query template {index}: {source}")]
    Template {
        index: usize,
        #[source]
        source: TemplateError,
    },

    #[error("query template {index} uses '{keyword}', which {use_case} entities do not provide")]
    UnknownKeyword {
        index: usize,
        keyword: String,
        use_case: UseCase,
    },
}

/// Keywords every use case understands.
pub const RESERVED_KEYWORDS: &[&str] = &["start", "end", "now"];

/// Parameters for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub use_case: UseCase,
    pub start: Timestamp,
    pub end: Timestamp,
    pub interval: Duration,
    pub entity_count: u64,
    pub entity_offset: u64,
    pub seed: u64,
    pub queries: Vec<String>,
}

/// Where a point number lands in the simulated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointLocation {
    pub entity: usize,
    pub measurement: usize,
    pub timestamp: Timestamp,
}

pub struct Simulator {
    use_case: UseCase,
    entities: Vec<Box<dyn Entity>>,
    measurements: u64,
    start: Timestamp,
    end: Timestamp,
    interval: i64,
    seed: u64,
    templates: Vec<SqlTemplate>,
    max_points: u64,

    made_points: AtomicU64,
    made_values: AtomicU64,
    made_queries: AtomicU64,
    written_points: AtomicU64,

    // Query text only needs variety, so a short lock per query is fine here.
    query_rng: Mutex<StdRng>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        if config.end <= config.start {
            return Err(SimulatorError::InvalidTimeRange {
                start: config.start,
                end: config.end,
            });
        }
        let interval = i64::try_from(config.interval.as_nanos()).unwrap_or(i64::MAX);
        if interval == 0 {
            return Err(SimulatorError::ZeroInterval);
        }
        if config.entity_count == 0 {
            return Err(SimulatorError::NoEntities);
        }

        let templates = config
            .queries
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let template = SqlTemplate::parse(text)
                    .map_err(|source| SimulatorError::Template { index, source })?;
                check_keywords(index, &template, config.use_case)?;
                Ok(template)
            })
            .collect::<Result<Vec<_>, SimulatorError>>()?;

        let entities: Vec<Box<dyn Entity>> = (0..config.entity_count)
            .map(|i| config.use_case.build(i + config.entity_offset))
            .collect();

        let measurements = config.use_case.measurements_per_entity() as u64;
        let span = config
            .end
            .checked_sub(config.start)
            .ok_or(SimulatorError::TimeRangeTooWide {
                start: config.start,
                end: config.end,
            })?;
        let ticks = (span / interval) as u64;
        let max_points = ticks.saturating_mul(config.entity_count.saturating_mul(measurements));

        debug!(
            use_case = %config.use_case,
            entities = config.entity_count,
            ticks,
            max_points,
            templates = templates.len(),
            "simulator ready"
        );

        Ok(Self {
            use_case: config.use_case,
            entities,
            measurements,
            start: config.start,
            end: config.end,
            interval,
            seed: config.seed,
            templates,
            max_points,
            made_points: AtomicU64::new(0),
            made_values: AtomicU64::new(0),
            made_queries: AtomicU64::new(0),
            written_points: AtomicU64::new(0),
            query_rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
        })
    }

    /// Fill `point` with the next sample and return its 1-based number.
    ///
    /// The counter advances unconditionally; callers accept the point only
    /// while [`Simulator::accepts`] holds for the returned number.
    pub fn next(&self, point: &mut Point) -> u64 {
        let number = self.made_points.fetch_add(1, Ordering::Relaxed) + 1;
        let loc = self.locate(number);

        point.reset();
        let mut rng = StdRng::seed_from_u64(mix(self.seed, number));
        let fields =
            self.entities[loc.entity].fill(point, loc.measurement, loc.timestamp, &mut rng);
        point.set_timestamp(loc.timestamp);

        self.made_values.fetch_add(fields as u64, Ordering::Relaxed);
        number
    }

    /// Map a 1-based point number to its entity, measurement and timestamp.
    pub fn locate(&self, number: u64) -> PointLocation {
        let index = number.saturating_sub(1);
        let n = self.entities.len() as u64;
        let per_tick = index / n;
        let tick = per_tick / self.measurements;
        let offset = (tick.min(i64::MAX as u64) as i64).saturating_mul(self.interval);

        PointLocation {
            entity: (index % n) as usize,
            measurement: (per_tick % self.measurements) as usize,
            timestamp: self.start.saturating_add(offset),
        }
    }

    /// Write the next query into `out` and return its 1-based number, or 0
    /// when no templates are configured.
    pub fn next_sql(&self, out: &mut String) -> u64 {
        if self.templates.is_empty() {
            return 0;
        }
        let number = self.made_queries.fetch_add(1, Ordering::Relaxed) + 1;
        let template = &self.templates[((number - 1) % self.templates.len() as u64) as usize];
        let first = self.query_rng.lock().gen_range(0..self.entities.len());

        template.render(out, |keyword, repeat, out| {
            self.resolve(keyword, repeat, first, out)
        });
        number
    }

    fn resolve(&self, keyword: &str, repeat: usize, first: usize, out: &mut String) {
        match keyword {
            "start" => out.push_str(&format_time(self.start)),
            "end" => out.push_str(&format_time(self.end)),
            "now" => out.push_str(&format_time(self.now())),
            _ => {
                let n = self.entities.len();
                for j in 0..repeat {
                    if j > 0 {
                        out.push(',');
                    }
                    let entity = &self.entities[(first + j) % n];
                    out.push_str(entity.tag_value(keyword).unwrap_or_default());
                }
            }
        }
    }

    /// Simulated "now": the tick implied by the written-points watermark.
    pub fn now(&self) -> Timestamp {
        let per_tick = self.entities.len() as u64 * self.measurements;
        let tick = self.written_points() / per_tick;
        let offset = (tick.min(i64::MAX as u64) as i64).saturating_mul(self.interval);
        self.start.saturating_add(offset).min(self.end)
    }

    pub fn accepts(&self, number: u64) -> bool {
        number <= self.max_points
    }

    pub fn finished(&self) -> bool {
        self.made_points() >= self.max_points
    }

    pub fn total(&self) -> u64 {
        self.max_points
    }

    pub fn made_points(&self) -> u64 {
        self.made_points.load(Ordering::Relaxed)
    }

    pub fn made_values(&self) -> u64 {
        self.made_values.load(Ordering::Relaxed)
    }

    pub fn made_queries(&self) -> u64 {
        self.made_queries.load(Ordering::Relaxed)
    }

    pub fn written_points(&self) -> u64 {
        self.written_points.load(Ordering::Relaxed)
    }

    /// Move the written-points watermark forward; smaller values are ignored.
    pub fn set_written_points(&self, n: u64) {
        self.written_points.fetch_max(n, Ordering::Relaxed);
    }

    pub fn has_queries(&self) -> bool {
        !self.templates.is_empty()
    }

    pub fn use_case(&self) -> UseCase {
        self.use_case
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn measurements_per_entity(&self) -> usize {
        self.measurements as usize
    }
}

fn check_keywords(
    index: usize,
    template: &SqlTemplate,
    use_case: UseCase,
) -> Result<(), SimulatorError> {
    for keyword in template.keywords() {
        let known = RESERVED_KEYWORDS.contains(&keyword.as_str())
            || use_case.keywords().contains(&keyword.as_str());
        if !known {
            return Err(SimulatorError::UnknownKeyword {
                index,
                keyword: keyword.clone(),
                use_case,
            });
        }
    }
    Ok(())
}

/// splitmix64 over seed and point number; gives each point its own stream.
fn mix(seed: u64, number: u64) -> u64 {
    let mut z = seed ^ number.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// RFC 3339 in UTC, with sub-second digits only when present.
pub fn format_time(ts: Timestamp) -> String {
    Utc.timestamp_nanos(ts)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const HOUR: i64 = 3_600_000_000_000;
    const START: i64 = 1_514_764_800_000_000_000; // 2018-01-01T00:00:00Z

    fn config(use_case: UseCase, entities: u64) -> SimulatorConfig {
        SimulatorConfig {
            use_case,
            start: START,
            end: START + HOUR,
            interval: Duration::from_secs(10),
            entity_count: entities,
            entity_offset: 0,
            seed: 123,
            queries: Vec::new(),
        }
    }

    #[test]
    fn test_total_matches_formula() {
        let sim = Simulator::new(config(UseCase::Vehicle, 5)).unwrap();
        assert_eq!(sim.total(), 360 * 5);

        let sim = Simulator::new(config(UseCase::Devops, 3)).unwrap();
        assert_eq!(sim.total(), 360 * 3 * 6);
    }

    #[test]
    fn test_partial_final_interval_is_dropped() {
        let mut cfg = config(UseCase::Device, 2);
        cfg.end = START + 25_000_000_000;
        let sim = Simulator::new(cfg).unwrap();
        assert_eq!(sim.total(), 2 * 2);
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut cfg = config(UseCase::Vehicle, 1);
        cfg.end = cfg.start;
        assert!(matches!(
            Simulator::new(cfg),
            Err(SimulatorError::InvalidTimeRange { .. })
        ));

        let mut cfg = config(UseCase::Vehicle, 1);
        cfg.interval = Duration::ZERO;
        assert!(matches!(Simulator::new(cfg), Err(SimulatorError::ZeroInterval)));

        assert!(matches!(
            Simulator::new(config(UseCase::Vehicle, 0)),
            Err(SimulatorError::NoEntities)
        ));

        let mut cfg = config(UseCase::Vehicle, 1);
        cfg.queries = vec!["select {vin".to_string()];
        assert!(matches!(
            Simulator::new(cfg),
            Err(SimulatorError::Template { index: 0, .. })
        ));

        let mut cfg = config(UseCase::Vehicle, 1);
        cfg.queries = vec!["select '{city}'".to_string()];
        assert!(matches!(
            Simulator::new(cfg),
            Err(SimulatorError::UnknownKeyword { .. })
        ));
    }

    #[test]
    fn test_rejects_span_wider_than_i64_nanos() {
        // 1700-01-01 .. 2200-01-01, both valid RFC 3339 times
        let mut cfg = config(UseCase::Vehicle, 1);
        cfg.start = -8_520_336_000_000_000_000;
        cfg.end = 7_258_118_400_000_000_000;
        cfg.interval = Duration::from_secs(3600);
        assert!(matches!(
            Simulator::new(cfg),
            Err(SimulatorError::TimeRangeTooWide { .. })
        ));
    }

    #[test]
    fn test_entity_and_timestamp_mapping() {
        let sim = Simulator::new(config(UseCase::Devops, 4)).unwrap();
        let mut point = Point::new();

        // First tick: 4 hosts x 6 measurements share the start timestamp.
        for expected in 1..=24u64 {
            let number = sim.next(&mut point);
            assert_eq!(number, expected);
            assert_eq!(point.timestamp(), Some(START));
            let host = format!("host_{}", (expected - 1) % 4);
            assert_eq!(point.tag(b"hostname"), Some(host.as_bytes()));
        }

        sim.next(&mut point);
        assert_eq!(point.timestamp(), Some(START + 10_000_000_000));
        assert_eq!(point.measurement(), b"cpu");
    }

    #[test]
    fn test_finished_exactness() {
        let sim = Simulator::new(config(UseCase::Vehicle, 2)).unwrap();
        let mut point = Point::new();
        for _ in 0..sim.total() - 1 {
            let number = sim.next(&mut point);
            assert!(sim.accepts(number));
            assert!(!sim.finished());
        }
        let last = sim.next(&mut point);
        assert_eq!(last, sim.total());
        assert!(sim.accepts(last));
        assert!(sim.finished());

        let overshoot = sim.next(&mut point);
        assert!(!sim.accepts(overshoot));
    }

    #[test]
    fn test_made_values_counts_fields() {
        let sim = Simulator::new(config(UseCase::Device, 3)).unwrap();
        let mut point = Point::new();
        for _ in 0..5 {
            sim.next(&mut point);
        }
        assert_eq!(sim.made_points(), 5);
        assert_eq!(sim.made_values(), 50);
    }

    #[test]
    fn test_same_seed_same_points() {
        let a = Simulator::new(config(UseCase::AirQuality, 3)).unwrap();
        let b = Simulator::new(config(UseCase::AirQuality, 3)).unwrap();
        let (mut pa, mut pb) = (Point::new(), Point::new());
        for _ in 0..20 {
            a.next(&mut pa);
            b.next(&mut pb);
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_written_points_only_moves_forward() {
        let sim = Simulator::new(config(UseCase::Vehicle, 10)).unwrap();
        assert_eq!(sim.now(), START);

        sim.set_written_points(25);
        assert_eq!(sim.written_points(), 25);
        sim.set_written_points(5);
        assert_eq!(sim.written_points(), 25);

        // 25 points over 10 vehicles is two full ticks.
        assert_eq!(sim.now(), START + 20_000_000_000);
    }

    #[test]
    fn test_next_sql_round_robin_and_repeat() {
        let mut cfg = config(UseCase::Vehicle, 4);
        cfg.queries = vec![
            "SELECT * FROM vehicle WHERE vin IN ('{vin*3}')".to_string(),
            "SELECT count(*) FROM vehicle WHERE time >= '{start}' AND time < '{end}'".to_string(),
        ];
        let sim = Simulator::new(cfg).unwrap();

        let mut sql = String::new();
        assert_eq!(sim.next_sql(&mut sql), 1);
        let inner = sql
            .trim_start_matches("SELECT * FROM vehicle WHERE vin IN ('")
            .trim_end_matches("')");
        let vins: Vec<&str> = inner.split(',').collect();
        assert_eq!(vins.len(), 3);
        assert_eq!(vins.iter().collect::<HashSet<_>>().len(), 3);
        assert!(vins.iter().all(|v| v.starts_with("LSVNV2182E2")));

        sql.clear();
        assert_eq!(sim.next_sql(&mut sql), 2);
        assert_eq!(
            sql,
            "SELECT count(*) FROM vehicle WHERE time >= '2018-01-01T00:00:00Z' AND time < '2018-01-01T01:00:00Z'"
        );
        assert_eq!(sim.made_queries(), 2);
    }

    #[test]
    fn test_next_sql_without_templates() {
        let sim = Simulator::new(config(UseCase::Vehicle, 1)).unwrap();
        let mut sql = String::new();
        assert!(!sim.has_queries());
        assert_eq!(sim.next_sql(&mut sql), 0);
        assert!(sql.is_empty());
    }
}
