//! Result records, summary statistics, and output files.
//!
//! The runner emits one [`PhaseRecord`] per CRUD phase plus one per named
//! scan. When per-operation latency samples were collected the aggregator
//! derives percentile statistics from them; aggregation always happens
//! after the phase clock has stopped.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;

/// Benchmark operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Scan,
}

impl Operation {
    /// Record label for the whole-population phases.
    pub fn phase_label(&self) -> String {
        match self {
            Operation::Create => "create_all".into(),
            Operation::Read => "read_all".into(),
            Operation::Update => "update_all".into(),
            Operation::Delete => "delete_all".into(),
            Operation::Scan => "scan".into(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Operation::Create => "CREATE",
            Operation::Read => "READ",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Scan => "SCAN",
        };
        f.write_str(label)
    }
}

/// Latency summary over one phase's samples, all values in microseconds
/// except `ops_per_second`.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p1_us: u64,
    pub p25_us: u64,
    pub p50_us: u64,
    pub p75_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub iqr_us: u64,
    pub ops_per_second: f64,
}

/// The outcome of one phase or one named scan.
#[derive(Clone, Debug, Serialize)]
pub struct PhaseRecord {
    pub operation: Operation,
    pub name: String,
    #[serde(rename = "duration_ms")]
    pub duration_millis: f64,
    pub sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Summary>,
    #[serde(skip)]
    pub wall: Duration,
    #[serde(skip)]
    pub samples_us: Vec<u64>,
}

impl PhaseRecord {
    pub fn new(
        operation: Operation,
        name: String,
        wall: Duration,
        sample_count: usize,
        error: Option<String>,
        samples_us: Vec<u64>,
    ) -> Self {
        let stats = summarize(&samples_us, sample_count, wall);
        PhaseRecord {
            operation,
            name,
            duration_millis: wall.as_secs_f64() * 1000.0,
            sample_count,
            error,
            stats,
            wall,
            samples_us,
        }
    }
}

/// Sorted-vector percentile at `⌈p·n⌉ - 1`.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let index = ((p * n as f64).ceil() as usize).clamp(1, n) - 1;
    sorted[index]
}

/// Derive summary statistics from raw latency samples; `None` when no
/// samples were collected.
fn summarize(samples: &[u64], sample_count: usize, wall: Duration) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let sum: u64 = sorted.iter().sum();
    let mean_us = sum as f64 / sorted.len() as f64;
    let p25 = percentile(&sorted, 0.25);
    let p75 = percentile(&sorted, 0.75);
    let secs = wall.as_secs_f64();
    let ops_per_second = if secs > 0.0 {
        sample_count as f64 / secs
    } else {
        0.0
    };

    Some(Summary {
        min_us: sorted[0],
        max_us: sorted[sorted.len() - 1],
        mean_us,
        p1_us: percentile(&sorted, 0.01),
        p25_us: p25,
        p50_us: percentile(&sorted, 0.50),
        p75_us: p75,
        p95_us: percentile(&sorted, 0.95),
        p99_us: percentile(&sorted, 0.99),
        iqr_us: p75 - p25,
        ops_per_second,
    })
}

/// The full result set for one run, serialized to the JSON output file.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub samples: usize,
    pub clients: usize,
    pub threads: usize,
    pub key_type: crate::config::KeyType,
    pub random: bool,
    pub value_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub timestamp: String,
    pub total_duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub operations: Vec<PhaseRecord>,
}

impl RunReport {
    pub fn new(
        adapter_name: &str,
        config: &Config,
        total: Duration,
        error: Option<String>,
        operations: Vec<PhaseRecord>,
    ) -> Self {
        RunReport {
            database: adapter_name.to_string(),
            name: config.name.clone(),
            samples: config.samples,
            clients: config.clients,
            threads: config.threads,
            key_type: config.key_type,
            random: config.random,
            value_template: config.value.clone(),
            pid: config.pid,
            timestamp: Utc::now().to_rfc3339(),
            total_duration_ms: total.as_secs_f64() * 1000.0,
            error,
            operations,
        }
    }

    /// Base file name shared by the JSON and CSV outputs.
    fn file_stem(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        match &self.name {
            Some(name) => format!("results-{}-{}-{}", self.database, name, stamp),
            None => format!("results-{}-{}", self.database, stamp),
        }
    }

    /// Write the JSON and CSV result files, returning their paths.
    pub fn write_files(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        let stem = self.file_stem();

        let json_path = PathBuf::from(format!("{stem}.json"));
        let json = serde_json::to_string_pretty(self).context("failed to serialize results")?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("failed to write {}", json_path.display()))?;

        let csv_path = PathBuf::from(format!("{stem}.csv"));
        std::fs::write(&csv_path, self.to_csv())
            .with_context(|| format!("failed to write {}", csv_path.display()))?;

        Ok((json_path, csv_path))
    }

    /// One CSV row per operation-name with the summary statistics. The
    /// system-metric columns are left empty; collecting them is outside
    /// the harness.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "Test,Total time,OPS,Mean,Min,Max,1st,25th,50th,75th,95th,99th,IQR,\
             CPU,Memory,Reads,Writes,System load\n",
        );
        for record in &self.operations {
            let test = format!("{} {}", record.operation, record.name);
            match &record.stats {
                Some(stats) => {
                    out.push_str(&format!(
                        "{},{:.3},{:.2},{:.2},{},{},{},{},{},{},{},{},{},,,,,\n",
                        test,
                        record.duration_millis,
                        stats.ops_per_second,
                        stats.mean_us,
                        stats.min_us,
                        stats.max_us,
                        stats.p1_us,
                        stats.p25_us,
                        stats.p50_us,
                        stats.p75_us,
                        stats.p95_us,
                        stats.p99_us,
                        stats.iqr_us,
                    ));
                }
                None => {
                    out.push_str(&format!(
                        "{},{:.3},,,,,,,,,,,,,,,,\n",
                        test, record.duration_millis,
                    ));
                }
            }
        }
        out
    }

    /// Print the human-readable summary table.
    pub fn print_table(&self) {
        println!();
        println!("{:<10} {:<12} {:>14} {:>10}", "OPERATION", "NAME", "DURATION", "COUNT");
        println!("{:<10} {:<12} {:>14} {:>10}", "---------", "----", "--------", "-----");
        for record in &self.operations {
            let duration = format!("{:.3} ms", record.duration_millis);
            match &record.error {
                Some(error) => println!(
                    "{:<10} {:<12} {:>14} {:>10}  ERROR: {}",
                    record.operation.to_string(),
                    record.name,
                    duration,
                    record.sample_count,
                    error
                ),
                None => println!(
                    "{:<10} {:<12} {:>14} {:>10}",
                    record.operation.to_string(),
                    record.name,
                    duration,
                    record.sample_count
                ),
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_indexing() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 0.01), 1);
        assert_eq!(percentile(&sorted, 0.25), 25);
        assert_eq!(percentile(&sorted, 0.50), 50);
        assert_eq!(percentile(&sorted, 0.75), 75);
        assert_eq!(percentile(&sorted, 0.95), 95);
        assert_eq!(percentile(&sorted, 0.99), 99);
        assert_eq!(percentile(&sorted, 1.0), 100);
    }

    #[test]
    fn test_percentile_single_sample() {
        assert_eq!(percentile(&[7], 0.01), 7);
        assert_eq!(percentile(&[7], 0.99), 7);
    }

    #[test]
    fn test_summary_statistics() {
        let samples: Vec<u64> = (1..=100).rev().collect();
        let stats = summarize(&samples, 100, Duration::from_secs(2)).unwrap();
        assert_eq!(stats.min_us, 1);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.mean_us, 50.5);
        assert_eq!(stats.p50_us, 50);
        assert_eq!(stats.iqr_us, 50);
        assert_eq!(stats.ops_per_second, 50.0);
    }

    #[test]
    fn test_no_samples_no_summary() {
        assert!(summarize(&[], 0, Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_phase_record_serialization_shape() {
        let record = PhaseRecord::new(
            Operation::Create,
            "create_all".into(),
            Duration::from_millis(1500),
            1000,
            None,
            vec![10, 20, 30],
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["operation"], "CREATE");
        assert_eq!(json["name"], "create_all");
        assert_eq!(json["sample_count"], 1000);
        assert!(json.get("error").is_none());
        assert!(json["stats"]["ops_per_second"].is_number());
        // Raw samples never land in the output file.
        assert!(json.get("samples_us").is_none());
    }

    #[test]
    fn test_csv_has_one_row_per_record() {
        let config = crate::config::Config {
            database: "map".into(),
            name: None,
            endpoint: None,
            image: None,
            privileged: false,
            samples: 10,
            clients: 1,
            threads: 1,
            key_type: crate::config::KeyType::Integer,
            value: "{}".into(),
            random: false,
            scans: vec![],
            pid: None,
            seed: None,
            phase_timeout: None,
        };
        let records = vec![
            PhaseRecord::new(
                Operation::Create,
                "create_all".into(),
                Duration::from_millis(100),
                10,
                None,
                vec![5, 6, 7],
            ),
            PhaseRecord::new(
                Operation::Scan,
                "count_all".into(),
                Duration::from_millis(3),
                10,
                None,
                vec![3000],
            ),
        ];
        let report = RunReport::new("map", &config, Duration::from_millis(103), None, records);
        let csv = report.to_csv();
        let lines: Vec<&str> = csv.trim_end().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Test,Total time,OPS"));
        assert!(lines[1].starts_with("CREATE create_all,"));
        assert!(lines[2].starts_with("SCAN count_all,"));
    }
}
