//! Air-quality monitoring sites.

use super::{pick, Entity, TagSet};
use rand::rngs::StdRng;
use rand::Rng;
use rusts_bench_core::{Point, Timestamp};

pub(crate) const TAG_KEYS: &[&str] = &["site_id", "province", "city", "county", "site_type"];

const PROVINCES: &[&str] = &["hebei", "henan", "shanxi", "anhui", "fujian", "yunnan"];
const CITIES_PER_PROVINCE: u64 = 12;
const COUNTIES_PER_CITY: u64 = 8;
const SITE_TYPES: &[&str] = &["urban", "suburban", "rural", "industrial", "roadside"];

/// One air-quality sensor site.
#[derive(Debug, Clone)]
pub struct AirQualityDevice {
    tags: TagSet,
    // Industrial and roadside sites read dirtier air.
    pollution_bias: f64,
}

impl AirQualityDevice {
    pub fn new(id: u64) -> Self {
        let province = pick(PROVINCES, id, 1);
        let city = (id / PROVINCES.len() as u64) % CITIES_PER_PROVINCE;
        let county = (id / (PROVINCES.len() as u64 * CITIES_PER_PROVINCE)) % COUNTIES_PER_CITY;
        let site_type = pick(SITE_TYPES, id, 2);

        let values = vec![
            format!("{:06}", id),
            province.to_string(),
            format!("{}_city_{:02}", province, city),
            format!("{}_county_{:02}_{:02}", province, city, county),
            site_type.to_string(),
        ];

        let pollution_bias = match site_type {
            "industrial" => 1.6,
            "roadside" => 1.3,
            "rural" => 0.6,
            _ => 1.0,
        };

        Self {
            tags: TagSet::new(TAG_KEYS, values),
            pollution_bias,
        }
    }
}

impl Entity for AirQualityDevice {
    fn fill(
        &self,
        point: &mut Point,
        _measurement: usize,
        _timestamp: Timestamp,
        rng: &mut StdRng,
    ) -> usize {
        point.set_measurement("air_quality");
        self.tags.append_to(point);

        let b = self.pollution_bias;
        let pm25 = (rng.gen_range(5.0..80.0) * b).min(500.0);
        let pm10 = (pm25 * rng.gen_range(1.2..2.0)).min(600.0);

        point.append_field("aqi", (pm25 * 1.4 + rng.gen_range(0.0..10.0)).min(500.0));
        point.append_field("pm10", pm10);
        point.append_field("pm25", pm25);
        point.append_field("no2", rng.gen_range(5.0..60.0) * b);
        point.append_field("so2", rng.gen_range(1.0..30.0) * b);
        point.append_field("o3", rng.gen_range(20.0..160.0));
        point.append_field("co", rng.gen_range(0.2..2.5) * b);

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
    fn test_county_is_nested_in_city() {
        let site = AirQualityDevice::new(123);
        let city = site.tag_value("city").unwrap();
        let county = site.tag_value("county").unwrap();
        let province = site.tag_value("province").unwrap();
        assert!(city.starts_with(province));
        assert!(county.starts_with(&format!("{}_county_{}", province, &city[city.len() - 2..])));
        assert_eq!(site.tag_value("site_id"), Some("000123"));
    }
}
