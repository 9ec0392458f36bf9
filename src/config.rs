//! Benchmark run configuration.
//!
//! A [`Config`] is parsed from the command line once, validated, and then
//! shared read-only for the whole run.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Default value template used when `-v` is not given.
pub const DEFAULT_VALUE_TEMPLATE: &str = r#"{"text": "text:50", "integer": "int"}"#;

/// Default scan specification array used when `-a` is not given.
pub const DEFAULT_SCANS: &str = r#"[
    { "name": "count_all", "samples": 100, "projection": "COUNT" },
    { "name": "limit_id", "samples": 100, "projection": "ID", "limit": 100, "expect": 100 }
]"#;

/// The type of key generated for every sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Decimal representation of the 64-bit sample index.
    Integer,
    /// 26-character alphanumeric string derived from the index.
    String26,
    /// 90-character alphanumeric string derived from the index.
    String90,
    /// 250-character alphanumeric string derived from the index.
    String250,
    /// 506-character alphanumeric string derived from the index.
    String506,
    /// Version-4 UUID.
    Uuid,
}

impl KeyType {
    /// Fixed rendered length for string key types, if applicable.
    pub fn string_length(&self) -> Option<usize> {
        match self {
            KeyType::String26 => Some(26),
            KeyType::String90 => Some(90),
            KeyType::String250 => Some(250),
            KeyType::String506 => Some(506),
            KeyType::Integer | KeyType::Uuid => None,
        }
    }
}

/// Row shape returned by a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Projection {
    /// All columns/fields of each row; the adapter streams and counts rows.
    Full,
    /// Only the primary-key field.
    Id,
    /// A single aggregated count, using a native count where available.
    Count,
}

/// One named scan executed during the scan phase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanSpec {
    /// Label used in results and output files.
    pub name: String,
    /// Accepted for compatibility with existing scan spec files; unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
    /// Row shape to request.
    pub projection: Projection,
    /// Offset applied after `limit`.
    #[serde(default)]
    pub start: usize,
    /// Maximum number of rows; 0 means unlimited.
    #[serde(default)]
    pub limit: usize,
    /// If positive, the returned count must equal this value.
    #[serde(default)]
    pub expect: usize,
}

impl ScanSpec {
    /// The count a scan over `total` rows must observe: rows remaining
    /// after applying the offset, clamped by the limit when one is set.
    pub fn expected_window(&self, total: usize) -> usize {
        let after_start = total.saturating_sub(self.start);
        if self.limit > 0 {
            self.limit.min(after_start)
        } else {
            after_start
        }
    }
}

/// Parse the `-a` scan spec JSON array.
pub fn parse_scans(json: &str) -> Result<Vec<ScanSpec>, BenchError> {
    serde_json::from_str(json)
        .map_err(|e| BenchError::Config(format!("invalid scans specification: {e}")))
}

/// Immutable configuration for one benchmark run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend identifier (`mysql`, `postgres`, `map`, ...).
    pub database: String,
    /// Optional run label, used as a suffix in result file names.
    pub name: Option<String>,
    /// Connect to this endpoint instead of starting a container.
    pub endpoint: Option<String>,
    /// Custom container image overriding the adapter default.
    pub image: Option<String>,
    /// Run the container in privileged mode.
    pub privileged: bool,
    /// Number of samples created, read, updated, and deleted.
    pub samples: usize,
    /// Number of concurrent clients.
    pub clients: usize,
    /// Number of concurrent threads per client.
    pub threads: usize,
    /// Key type for the sample population.
    pub key_type: KeyType,
    /// Raw value template text (kept for echoing into results).
    pub value: String,
    /// Visit keys in a pseudo-randomized order.
    pub random: bool,
    /// Scan specifications executed during the scan phase.
    pub scans: Vec<ScanSpec>,
    /// Collect system information for this process id (recorded in output).
    pub pid: Option<u32>,
    /// Optional seed making key order and rendered values reproducible.
    pub seed: Option<u64>,
    /// Upper-bound wall time per phase, in seconds; exceeding it trips
    /// cancellation.
    pub phase_timeout: Option<u64>,
}

impl Config {
    /// Total number of worker slots per phase.
    pub fn worker_slots(&self) -> usize {
        self.clients * self.threads
    }

    /// Check invariants that clap's type layer cannot express.
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.samples == 0 {
            return Err(BenchError::Config("samples must be greater than 0".into()));
        }
        if self.clients == 0 {
            return Err(BenchError::Config("clients must be greater than 0".into()));
        }
        if self.threads == 0 {
            return Err(BenchError::Config("threads must be greater than 0".into()));
        }
        for scan in &self.scans {
            if scan.name.is_empty() {
                return Err(BenchError::Config("scan name must not be empty".into()));
            }
        }
        Ok(())
    }
}
