//! Connected-vehicle fleet.

use super::{pick, Entity, TagSet};
use rand::rngs::StdRng;
use rand::Rng;
use rusts_bench_core::{Point, Timestamp};

pub(crate) const TAG_KEYS: &[&str] = &["vin", "model", "color", "province"];

const MODELS: &[&str] = &["sedan", "suv", "hatchback", "pickup", "van", "coupe"];
const COLORS: &[&str] = &["white", "black", "silver", "red", "blue", "grey", "green"];
const PROVINCES: &[&str] = &[
    "beijing", "shanghai", "guangdong", "zhejiang", "jiangsu", "sichuan", "hubei", "shandong",
];
const STATUSES: &[&str] = &["driving", "parked", "charging", "idle"];

/// One simulated vehicle reporting position and drivetrain state.
#[derive(Debug, Clone)]
pub struct Vehicle {
    tags: TagSet,
    base_latitude: f64,
    base_longitude: f64,
    base_mileage: i64,
}

impl Vehicle {
    pub fn new(id: u64) -> Self {
        let values = vec![
            // 17 characters up to serial 999999; wider serials just grow the VIN.
            format!("LSVNV2182E2{:06}", id),
            pick(MODELS, id, 1).to_string(),
            pick(COLORS, id, 3).to_string(),
            pick(PROVINCES, id, 5).to_string(),
        ];

        // Spread vehicles over a grid rather than randomly so identity stays seed-free.
        let base_latitude = 22.0 + (id % 170) as f64 * 0.1;
        let base_longitude = 100.0 + ((id / 170) % 220) as f64 * 0.1;

        Self {
            tags: TagSet::new(TAG_KEYS, values),
            base_latitude,
            base_longitude,
            base_mileage: (id.wrapping_mul(7919) % 200_000) as i64,
        }
    }

    pub fn vin(&self) -> &str {
        self.tags.get("vin").unwrap_or_default()
    }
}

impl Entity for Vehicle {
    fn fill(
        &self,
        point: &mut Point,
        _measurement: usize,
        timestamp: Timestamp,
        rng: &mut StdRng,
    ) -> usize {
        point.set_measurement("vehicle");
        self.tags.append_to(point);

        let status = STATUSES[rng.gen_range(0..STATUSES.len())];
        let engine_on = status == "driving" || status == "idle";
        let speed = if status == "driving" {
            rng.gen_range(5.0..120.0)
        } else {
            0.0
        };
        let minutes = timestamp.div_euclid(60_000_000_000);

        point.append_field("speed", speed);
        point.append_field("latitude", self.base_latitude + rng.gen_range(-0.05..0.05));
        point.append_field("longitude", self.base_longitude + rng.gen_range(-0.05..0.05));
        point.append_int_field("mileage", self.base_mileage + minutes.rem_euclid(100_000));
        point.append_field("fuel_level", rng.gen_range(5.0..100.0));
        point.append_field("engine_on", engine_on);
        point.append_field("status", status);

        point.field_count()
    }

    fn tag_value(&self, keyword: &str) -> Option<&str> {
        self.tags.get(keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vin_is_seventeen_chars_and_unique() {
        let a = Vehicle::new(1);
        let b = Vehicle::new(2);
        assert_eq!(a.vin().len(), 17);
        assert_eq!(a.vin(), "LSVNV2182E2000001");
        assert_ne!(a.vin(), b.vin());
    }

    #[test]
    fn test_vin_does_not_repeat_past_a_million() {
        let low = Vehicle::new(5);
        let high = Vehicle::new(1_000_005);
        assert_eq!(low.vin(), "LSVNV2182E2000005");
        assert_eq!(high.vin(), "LSVNV2182E21000005");
        assert_ne!(low.tag_value("vin"), high.tag_value("vin"));
    }

    #[test]
    fn test_identity_is_independent_of_construction_order() {
        let first = Vehicle::new(42);
        let _other = Vehicle::new(7);
        let again = Vehicle::new(42);
        for key in TAG_KEYS {
            assert_eq!(first.tag_value(key), again.tag_value(key));
        }
    }
}
