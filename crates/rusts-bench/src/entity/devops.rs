//! Devops host fleet: one host emits cpu, mem, disk, diskio, net and kernel
//! measurements every tick.

use super::{diurnal_factor, pick, Entity, TagSet};
use rand::rngs::StdRng;
use rand::Rng;
use rusts_bench_core::{Point, Timestamp};

pub(crate) const TAG_KEYS: &[&str] = &[
    "hostname",
    "region",
    "datacenter",
    "rack",
    "os",
    "arch",
    "service",
    "service_environment",
];

pub(crate) const MEASUREMENTS: &[&str] = &["cpu", "mem", "disk", "diskio", "net", "kernel"];

const REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-central-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "sa-east-1",
];
const OSES: &[&str] = &["Ubuntu16.10", "Ubuntu16.04LTS", "Ubuntu15.10"];
const ARCHES: &[&str] = &["x64", "x86"];
const ENVIRONMENTS: &[&str] = &["production", "staging", "test"];

const GIB: i64 = 1 << 30;

/// One simulated server.
#[derive(Debug, Clone)]
pub struct DevopsHost {
    tags: TagSet,
    base_cpu: f64,
    memory_total: i64,
    disk_total: i64,
}

impl DevopsHost {
    pub fn new(id: u64) -> Self {
        let region = pick(REGIONS, id, 1);
        let dc = (b'a' + ((id / REGIONS.len() as u64) % 3) as u8) as char;

        let values = vec![
            format!("host_{}", id),
            region.to_string(),
            format!("{}{}", region, dc),
            (id % 100).to_string(),
            pick(OSES, id, 2).to_string(),
            pick(ARCHES, id, 3).to_string(),
            (id % 20).to_string(),
            pick(ENVIRONMENTS, id, 4).to_string(),
        ];

        Self {
            tags: TagSet::new(TAG_KEYS, values),
            base_cpu: 10.0 + (id % 30) as f64,
            memory_total: [8, 16, 32, 64][(id % 4) as usize] * GIB,
            disk_total: [256, 512, 1024][(id % 3) as usize] * GIB,
        }
    }

    fn fill_cpu(&self, point: &mut Point, timestamp: Timestamp, rng: &mut StdRng) {
        let busy = (self.base_cpu * diurnal_factor(timestamp) + rng.gen_range(-5.0..5.0))
            .clamp(0.0, 100.0);
        let user = busy * rng.gen_range(0.5..0.8);
        let system = (busy - user) * rng.gen_range(0.6..0.9);
        let iowait = (busy - user - system).max(0.0);

        point.append_field("usage_user", user);
        point.append_field("usage_system", system);
        point.append_field("usage_iowait", iowait);
        point.append_field("usage_idle", 100.0 - busy);
    }

    fn fill_mem(&self, point: &mut Point, rng: &mut StdRng) {
        let used = (self.memory_total as f64 * rng.gen_range(0.2..0.9)) as i64;
        point.append_int_field("total", self.memory_total);
        point.append_int_field("used", used);
        point.append_int_field("available", self.memory_total - used);
        point.append_field("used_percent", used as f64 * 100.0 / self.memory_total as f64);
    }

    fn fill_disk(&self, point: &mut Point, rng: &mut StdRng) {
        let used = (self.disk_total as f64 * rng.gen_range(0.1..0.95)) as i64;
        point.append_int_field("total", self.disk_total);
        point.append_int_field("used", used);
        point.append_int_field("free", self.disk_total - used);
        point.append_int_field("inodes_free", rng.gen_range(100_000..10_000_000));
    }
}

impl Entity for DevopsHost {
    fn fill(
        &self,
        point: &mut Point,
        measurement: usize,
        timestamp: Timestamp,
        rng: &mut StdRng,
    ) -> usize {
        let measurement = measurement % MEASUREMENTS.len();
        point.set_measurement(MEASUREMENTS[measurement]);
        self.tags.append_to(point);

        match measurement {
            0 => self.fill_cpu(point, timestamp, rng),
            1 => self.fill_mem(point, rng),
            2 => self.fill_disk(point, rng),
            3 => {
                point.append_int_field("reads", rng.gen_range(0..5_000));
                point.append_int_field("writes", rng.gen_range(0..5_000));
                point.append_int_field("read_bytes", rng.gen_range(0..50_000_000));
                point.append_int_field("write_bytes", rng.gen_range(0..50_000_000));
            }
            4 => {
                point.append_int_field("bytes_recv", rng.gen_range(0..100_000_000));
                point.append_int_field("bytes_sent", rng.gen_range(0..100_000_000));
                point.append_int_field("err_in", rng.gen_range(0..3));
                point.append_int_field("drop_in", rng.gen_range(0..3));
            }
            _ => {
                point.append_int_field("interrupts", rng.gen_range(10_000..1_000_000));
                point.append_int_field("context_switches", rng.gen_range(10_000..5_000_000));
                point.append_int_field("processes_forked", rng.gen_range(0..500));
            }
        }

        point.field_count()
    }

    fn tag_value(&self, keyword: &str) -> Option<&str> {
        self.tags.get(keyword)
    }
}
