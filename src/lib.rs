//! crud-bench
//!
//! A benchmarking harness that compares the CRUD throughput and latency of
//! heterogeneous data stores under a uniform workload. One run fixes a
//! workload shape (sample count, key type, value template, concurrency) and
//! drives a single backend through five phases: create, read, update, scan,
//! delete, recording per-operation latencies and derived statistics.
//!
//! # Features
//!
//! - Deterministic or pseudorandom key generation over six key types
//! - Richly-templated value documents with per-render random directives
//! - A single adapter contract across SQL, document, graph, key-value, and
//!   embedded engines
//! - Self-managed Docker containers with health probing, or user-supplied
//!   endpoints
//! - JSON and CSV result files with percentile latency statistics
//!
//! # Usage
//!
//! ```bash
//! # Benchmark the in-process map backend
//! crud-bench -d map -s 100000 -c 4 -t 2
//!
//! # Benchmark PostgreSQL in a managed container, randomized key order
//! crud-bench -d postgres -s 10000 -k string26 -r
//!
//! # Benchmark against an existing endpoint
//! crud-bench -d mysql -s 10000 -e mysql://root:pw@10.0.0.5:3306/bench
//! ```

pub mod adapters;
pub mod config;
pub mod docker;
pub mod error;
pub mod generators;
pub mod report;
pub mod runner;

pub use adapters::{new_adapter, Adapter};
pub use config::{Config, KeyType, Projection, ScanSpec};
pub use error::BenchError;
pub use generators::Template;
pub use report::{Operation, PhaseRecord, RunReport};
pub use runner::{RunOutcome, Runner};
