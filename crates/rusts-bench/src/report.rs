//! Performance report generation.

use crate::collector::RespTimeResult;
use crate::config::WorkloadMode;
use crate::entity::UseCase;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Column order for latency tables, matching [`RespTimeResult::to_string_map`].
pub const RESULT_COLUMNS: &[&str] = &[
    "P50(ms)",
    "P90(ms)",
    "P95(ms)",
    "P99(ms)",
    "Min(ms)",
    "Max(ms)",
    "Avg(ms)",
    "Qps",
    "Fail",
    "Total",
    "RunSec(s)",
];

/// Complete benchmark report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    // Configuration
    pub mode: WorkloadMode,
    pub use_case: UseCase,
    pub entities: usize,
    pub workers: usize,
    pub query_workers: usize,
    #[serde(rename = "run_secs", serialize_with = "as_secs")]
    pub duration: Duration,

    // Write statistics
    pub points: u64,
    pub values: u64,
    pub batches: u64,
    pub bytes: u64,
    pub backoffs: u64,
    pub write_errors: u64,

    // Query statistics
    pub queries: u64,

    // Latency by label, plus everything together
    pub results: BTreeMap<String, RespTimeResult>,
    pub overall: RespTimeResult,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl Report {
    fn per_second(&self, n: u64) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            n as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn points_per_second(&self) -> f64 {
        self.per_second(self.points)
    }

    pub fn values_per_second(&self) -> f64 {
        self.per_second(self.values)
    }

    pub fn queries_per_second(&self) -> f64 {
        self.per_second(self.queries)
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.per_second(self.bytes)
    }

    /// Number of failed requests across all labels.
    pub fn failures(&self) -> usize {
        self.overall.fail
    }

    /// Generates a markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# RusTs Load Test Report\n\n");

        md.push_str("## Configuration\n\n");
        md.push_str("| Setting | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Mode | {} |\n", self.mode));
        md.push_str(&format!("| Use Case | {} |\n", self.use_case));
        md.push_str(&format!("| Entities | {} |\n", format_number(self.entities as u64)));
        md.push_str(&format!("| Write Workers | {} |\n", self.workers));
        md.push_str(&format!("| Query Workers | {} |\n", self.query_workers));
        md.push_str(&format!("| Duration | {:.1}s |\n", self.duration.as_secs_f64()));
        md.push('\n');

        if self.mode.writes() {
            md.push_str("## Write Performance\n\n");
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Points Written | {} |\n", format_number(self.points)));
            md.push_str(&format!("| Values Written | {} |\n", format_number(self.values)));
            md.push_str(&format!("| Batches | {} |\n", format_number(self.batches)));
            md.push_str(&format!("| Bytes | {} |\n", format_bytes(self.bytes)));
            md.push_str(&format!(
                "| Throughput | {:.0} points/s, {:.0} values/s |\n",
                self.points_per_second(),
                self.values_per_second()
            ));
            md.push_str(&format!(
                "| Bandwidth | {}/s |\n",
                format_bytes(self.bytes_per_second() as u64)
            ));
            md.push_str(&format!("| Backoffs | {} |\n", self.backoffs));
            md.push_str(&format!("| Failed Batches | {} |\n", self.write_errors));
            md.push('\n');
        }

        if self.mode.queries() {
            md.push_str("## Query Performance\n\n");
            md.push_str("| Metric | Value |\n");
            md.push_str("|--------|-------|\n");
            md.push_str(&format!("| Queries | {} |\n", format_number(self.queries)));
            md.push_str(&format!(
                "| Throughput | {:.1} queries/s |\n",
                self.queries_per_second()
            ));
            md.push('\n');
        }

        md.push_str("## Latency\n\n");
        md.push_str("| Label |");
        for column in RESULT_COLUMNS {
            md.push_str(&format!(" {} |", column));
        }
        md.push('\n');
        md.push_str("|-------|");
        for _ in RESULT_COLUMNS {
            md.push_str("-----|");
        }
        md.push('\n');
        for (label, result) in self.rows() {
            let cells = result.to_string_map();
            md.push_str(&format!("| {} |", label));
            for column in RESULT_COLUMNS {
                md.push_str(&format!(" {} |", cells[column]));
            }
            md.push('\n');
        }
        md.push('\n');

        md.push_str("## Summary\n\n");
        if self.failures() > 0 || self.write_errors > 0 {
            md.push_str(&format!(
                "**{} failed requests during the run**\n",
                self.failures()
            ));
        } else {
            md.push_str("**Run completed without errors**\n");
        }

        md
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Prints a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(72));
        println!("BENCHMARK RESULTS");
        println!("{}", "=".repeat(72));

        println!(
            "\nMode: {} | Use case: {} | Entities: {} | Duration: {:.1}s",
            self.mode,
            self.use_case,
            self.entities,
            self.duration.as_secs_f64()
        );

        if self.mode.writes() {
            println!("\nWRITES:");
            println!(
                "   Points: {} ({:.0}/s)",
                format_number(self.points),
                self.points_per_second()
            );
            println!(
                "   Values: {} ({:.0}/s)",
                format_number(self.values),
                self.values_per_second()
            );
            println!(
                "   Bytes: {} ({}/s)",
                format_bytes(self.bytes),
                format_bytes(self.bytes_per_second() as u64)
            );
            if self.backoffs > 0 {
                println!("   Backoffs: {}", self.backoffs);
            }
            if self.write_errors > 0 {
                println!("   Failed batches: {}", self.write_errors);
            }
        }

        if self.mode.queries() {
            println!("\nQUERIES:");
            println!(
                "   Total: {} ({:.1}/s)",
                format_number(self.queries),
                self.queries_per_second()
            );
        }

        println!();
        print!("{:<8}", "Label");
        for column in RESULT_COLUMNS {
            print!("{:>10}", column);
        }
        println!();
        for (label, result) in self.rows() {
            let cells = result.to_string_map();
            print!("{:<8}", label);
            for column in RESULT_COLUMNS {
                print!("{:>10}", cells[column]);
            }
            println!();
        }

        println!("\n{}", "=".repeat(72));
    }

    /// Per-label rows followed by the overall row.
    fn rows(&self) -> impl Iterator<Item = (&str, &RespTimeResult)> {
        self.results
            .iter()
            .map(|(label, result)| (label.as_str(), result))
            .chain(std::iter::once(("all", &self.overall)))
    }
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
