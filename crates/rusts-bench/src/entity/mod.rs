//! Simulated entities: the tag identity of one vehicle, sensor site, host or
//! device, plus the measurement sources that fill a point's fields.
//!
//! Identity is a pure function of the entity number (`index + offset`). Field
//! values come from the `StdRng` handed to [`Entity::fill`], which the
//! simulator seeds per point index, so the dataset does not depend on which
//! worker produced a given point.

mod air_quality;
mod device;
mod devops;
mod vehicle;

pub use air_quality::AirQualityDevice;
pub use device::Device;
pub use devops::DevopsHost;
pub use vehicle::Vehicle;

use bytes::Bytes;
use rand::rngs::StdRng;
use rusts_bench_core::{Point, Timestamp};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A simulated source of points. Immutable after construction.
pub trait Entity: Send + Sync {
    /// Fill `point` with measurement number `measurement` for this tick.
    /// Returns the number of fields written.
    fn fill(
        &self,
        point: &mut Point,
        measurement: usize,
        timestamp: Timestamp,
        rng: &mut StdRng,
    ) -> usize;

    /// Resolve an identity keyword (e.g. `vin`, `city`) for query templates.
    fn tag_value(&self, keyword: &str) -> Option<&str>;
}

/// Which kind of entity a run simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    Vehicle,
    AirQuality,
    Devops,
    Device,
}

impl UseCase {
    /// Measurements each entity emits per tick.
    pub fn measurements_per_entity(&self) -> usize {
        match self {
            UseCase::Vehicle | UseCase::AirQuality | UseCase::Device => 1,
            UseCase::Devops => devops::MEASUREMENTS.len(),
        }
    }

    /// Identity keywords a query template may reference.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            UseCase::Vehicle => vehicle::TAG_KEYS,
            UseCase::AirQuality => air_quality::TAG_KEYS,
            UseCase::Devops => devops::TAG_KEYS,
            UseCase::Device => device::TAG_KEYS,
        }
    }

    /// Build the entity with the given absolute number.
    pub fn build(&self, id: u64) -> Box<dyn Entity> {
        match self {
            UseCase::Vehicle => Box::new(Vehicle::new(id)),
            UseCase::AirQuality => Box::new(AirQualityDevice::new(id)),
            UseCase::Devops => Box::new(DevopsHost::new(id)),
            UseCase::Device => Box::new(Device::new(id)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Vehicle => "vehicle",
            UseCase::AirQuality => "air_quality",
            UseCase::Devops => "devops",
            UseCase::Device => "device",
        }
    }
}

impl std::fmt::Display for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vehicle" => Ok(UseCase::Vehicle),
            "air_quality" | "air-quality" => Ok(UseCase::AirQuality),
            "devops" => Ok(UseCase::Devops),
            "device" => Ok(UseCase::Device),
            other => Err(format!("unknown use case: {}", other)),
        }
    }
}

/// Identity tags shared by every measurement of one entity.
#[derive(Debug, Clone)]
pub(crate) struct TagSet {
    keys: &'static [&'static str],
    values: Vec<Bytes>,
}

impl TagSet {
    pub(crate) fn new(keys: &'static [&'static str], values: Vec<String>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        Self {
            keys,
            values: values.into_iter().map(Bytes::from).collect(),
        }
    }

    pub(crate) fn append_to(&self, point: &mut Point) {
        for (key, value) in self.keys.iter().zip(&self.values) {
            point.append_tag(*key, value.clone());
        }
    }

    pub(crate) fn get(&self, keyword: &str) -> Option<&str> {
        self.keys
            .iter()
            .position(|k| *k == keyword)
            .and_then(|i| std::str::from_utf8(&self.values[i]).ok())
    }
}

/// Pick a stable element for an entity number.
pub(crate) fn pick<T: Copy>(items: &[T], id: u64, stride: u64) -> T {
    items[((id / stride.max(1)) % items.len() as u64) as usize]
}

/// Returns a multiplier based on simulated time of day: higher during
/// business hours, lower at night.
pub(crate) fn diurnal_factor(timestamp_ns: Timestamp) -> f64 {
    let secs = timestamp_ns.div_euclid(1_000_000_000);
    let hour = (secs.div_euclid(3600) % 24) as f64;

    // Peak at 2pm, lowest at 4am
    let factor = 0.5 + 0.5 * ((hour - 14.0) * std::f64::consts::PI / 12.0).cos().abs();

    if (9.0..18.0).contains(&hour) {
        factor * 1.3
    } else {
        factor * 0.7
    }
}
