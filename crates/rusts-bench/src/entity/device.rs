//! Generic device emitting a fixed row of integer readings.

use super::{pick, Entity, TagSet};
use rand::rngs::StdRng;
use rand::Rng;
use rusts_bench_core::{Point, Timestamp};

pub(crate) const TAG_KEYS: &[&str] = &["device_id", "model"];

const MODELS: &[&str] = &["t100", "t200", "x10", "x20"];
const FIELD_KEYS: &[&str] = &["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9"];

/// A device whose readings all go through the integer fast path.
#[derive(Debug, Clone)]
pub struct Device {
    tags: TagSet,
}

impl Device {
    pub fn new(id: u64) -> Self {
        let values = vec![format!("device-{:06}", id), pick(MODELS, id, 1).to_string()];
        Self {
            tags: TagSet::new(TAG_KEYS, values),
        }
    }
}

impl Entity for Device {
    fn fill(
        &self,
        point: &mut Point,
        _measurement: usize,
        _timestamp: Timestamp,
        rng: &mut StdRng,
    ) -> usize {
        point.set_measurement("device");
        self.tags.append_to(point);
        for key in FIELD_KEYS {
            point.append_int_field(*key, rng.gen_range(0..10_000));
        }
        point.field_count()
    }

    fn tag_value(&self, keyword: &str) -> Option<&str> {
        self.tags.get(keyword)
    }
}
