//! The benchmark runner: phase state machine and worker pool.
//!
//! A run drives one adapter through create, read, update, scan, and delete
//! phases in strict order. Each CRUD phase partitions the key sequence into
//! `clients x threads` contiguous ranges and executes them on concurrent
//! workers; every create completes before any read begins, and so on down
//! the chain, which is the only mechanism guaranteeing read-after-write.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::Adapter;
use crate::config::Config;
use crate::error::BenchError;
use crate::generators::value::Template;
use crate::generators::{generate_keys, worker_rng};
use crate::report::{Operation, PhaseRecord};

/// Outcome of a full run: per-phase records plus the first fatal error.
pub struct RunOutcome {
    pub records: Vec<PhaseRecord>,
    pub fatal: Option<BenchError>,
}

/// Per-worker result: latency samples for completed operations, and the
/// error that stopped the worker early, if any.
struct WorkerReport {
    samples: Vec<u64>,
    error: Option<BenchError>,
}

pub struct Runner {
    adapter: Arc<dyn Adapter>,
    config: Arc<Config>,
    template: Template,
    token: CancellationToken,
}

impl Runner {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        config: Arc<Config>,
        template: Template,
        token: CancellationToken,
    ) -> Self {
        Runner {
            adapter,
            config,
            template,
            token,
        }
    }

    /// Execute the whole benchmark. The adapter is initialized before any
    /// operation and cleaned up exactly once, even on fatal error.
    pub async fn run(&self) -> RunOutcome {
        let mut records = Vec::new();

        info!("Initializing {} adapter...", self.adapter.name());
        if let Err(e) = self.adapter.initialize().await {
            let fatal = match e {
                // Driver errors surfacing through `?` during initialize are
                // setup failures, whatever their wire-level kind.
                BenchError::Backend(msg) | BenchError::NotFound(msg) => BenchError::Setup(msg),
                other => other,
            };
            self.teardown().await;
            return RunOutcome {
                records,
                fatal: Some(fatal),
            };
        }

        // Materialized once and shared read-only: every phase must visit
        // the same keys, including randomized and UUID key spaces.
        let keys = Arc::new(generate_keys(
            self.config.key_type,
            self.config.samples,
            self.config.random,
            self.config.seed,
        ));

        let mut fatal = None;
        for operation in [
            Operation::Create,
            Operation::Read,
            Operation::Update,
            Operation::Scan,
            Operation::Delete,
        ] {
            if self.token.is_cancelled() {
                fatal = Some(BenchError::Cancelled);
                break;
            }
            let error = if let Operation::Scan = operation {
                let (mut scan_records, error) = self.run_scan_phase().await;
                records.append(&mut scan_records);
                error
            } else {
                let (record, error) = self.run_crud_phase(operation, &keys).await;
                records.push(record);
                error
            };
            if let Some(e) = error {
                fatal = Some(e);
                break;
            }
        }

        self.teardown().await;
        RunOutcome { records, fatal }
    }

    async fn teardown(&self) {
        if let Err(e) = self.adapter.cleanup().await {
            // Teardown failures are reported but never abort the run.
            error!("{}", BenchError::Teardown(e.to_string()));
        }
    }

    /// Run one CRUD phase across the worker pool.
    ///
    /// The wall duration brackets exactly the worker-pool lifecycle: the
    /// clock starts just before the first worker is spawned and stops just
    /// after the last worker completes, before samples are merged.
    async fn run_crud_phase(
        &self,
        operation: Operation,
        keys: &Arc<Vec<String>>,
    ) -> (PhaseRecord, Option<BenchError>) {
        let n = self.config.samples;
        let slots = self.config.worker_slots();
        let batch = std::cmp::max(n / slots, 1);
        info!("Running {operation} phase with {n} samples across {slots} workers...");

        // A phase-scoped token: the first failing worker trips it so
        // siblings drain promptly, without cancelling the whole run.
        let phase_token = self.token.child_token();

        // Exceeding the configured upper-bound wall time trips cancellation.
        let watchdog = self.config.phase_timeout.map(|secs| {
            let token = phase_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                warn!("phase timeout of {secs}s exceeded, cancelling workers");
                token.cancel();
            })
        });

        let started = Instant::now();
        let mut handles = Vec::with_capacity(slots);
        for worker in 0..slots {
            let start = worker * batch;
            if start >= n {
                // More slots than samples: this worker owns zero items.
                continue;
            }
            let end = if worker == slots - 1 {
                n
            } else {
                ((worker + 1) * batch).min(n)
            };

            let adapter = Arc::clone(&self.adapter);
            let keys = Arc::clone(keys);
            let template = self.template.clone();
            let token = phase_token.clone();
            let seed = self.config.seed;
            handles.push(tokio::spawn(async move {
                worker_loop(adapter, keys, template, token, seed, worker, start..end, operation)
                    .await
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut join_failure = None;
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => join_failure = Some(BenchError::Backend(format!("worker panicked: {e}"))),
            }
        }
        let wall = started.elapsed();
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        // Merge per-worker sample buffers after the clock has stopped.
        let mut samples = Vec::with_capacity(n);
        let mut fatal: Option<BenchError> = join_failure;
        for report in reports {
            samples.extend(report.samples);
            if let Some(error) = report.error {
                // Prefer the root-cause error over follow-on cancellations.
                match (&fatal, &error) {
                    (None, _) => fatal = Some(error),
                    (Some(BenchError::Cancelled), e) if !matches!(e, BenchError::Cancelled) => {
                        fatal = Some(error)
                    }
                    _ => {}
                }
            }
        }

        let completed = samples.len();
        match &fatal {
            None => info!("{operation} completed in {wall:?}"),
            Some(e) => warn!("{operation} stopped after {completed} operations: {e}"),
        }

        let record = PhaseRecord::new(
            operation,
            operation.phase_label(),
            wall,
            completed,
            fatal.as_ref().map(|e| e.to_string()),
            samples,
        );
        (record, fatal)
    }

    /// Run every configured scan, each timed individually.
    async fn run_scan_phase(&self) -> (Vec<PhaseRecord>, Option<BenchError>) {
        let mut records = Vec::with_capacity(self.config.scans.len());

        for spec in &self.config.scans {
            if self.token.is_cancelled() {
                return (records, Some(BenchError::Cancelled));
            }
            info!("Running scan '{}'...", spec.name);
            let started = Instant::now();
            match self.adapter.scan(spec).await {
                Ok(count) => {
                    let wall = started.elapsed();
                    if spec.expect > 0 && count != spec.expect {
                        let error = BenchError::Backend(format!(
                            "scan '{}' returned {count} rows, expected {}",
                            spec.name, spec.expect
                        ));
                        records.push(PhaseRecord::new(
                            Operation::Scan,
                            spec.name.clone(),
                            wall,
                            count,
                            Some(error.to_string()),
                            vec![wall.as_micros() as u64],
                        ));
                        return (records, Some(error));
                    }
                    info!("Scan '{}' returned {count} rows in {wall:?}", spec.name);
                    records.push(PhaseRecord::new(
                        Operation::Scan,
                        spec.name.clone(),
                        wall,
                        count,
                        None,
                        vec![wall.as_micros() as u64],
                    ));
                }
                Err(e) => {
                    let wall = started.elapsed();
                    let error = BenchError::Backend(format!("scan '{}': {e}", spec.name));
                    records.push(PhaseRecord::new(
                        Operation::Scan,
                        spec.name.clone(),
                        wall,
                        0,
                        Some(error.to_string()),
                        Vec::new(),
                    ));
                    return (records, Some(error));
                }
            }
        }
        (records, None)
    }
}

/// One worker's synchronous walk over its index range.
///
/// Cancellation is observed between operations; a cancelled worker returns
/// promptly without attempting rollback.
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    adapter: Arc<dyn Adapter>,
    keys: Arc<Vec<String>>,
    template: Template,
    token: CancellationToken,
    seed: Option<u64>,
    worker: usize,
    range: std::ops::Range<usize>,
    operation: Operation,
) -> WorkerReport {
    let mut rng = worker_rng(seed, worker);
    let mut samples = Vec::with_capacity(range.len());

    for i in range {
        if token.is_cancelled() {
            return WorkerReport {
                samples,
                error: Some(BenchError::Cancelled),
            };
        }

        let key = &keys[i];
        // Rendering happens outside the timed window; only the adapter
        // call is measured.
        let doc = match operation {
            Operation::Create | Operation::Update => Some(template.render(&mut rng)),
            _ => None,
        };

        let begin = Instant::now();
        let outcome = match (operation, &doc) {
            (Operation::Create, Some(doc)) => adapter.create(key, doc).await,
            (Operation::Update, Some(doc)) => adapter.update(key, doc).await,
            (Operation::Read, _) => adapter.read(key).await.map(|_| ()),
            (Operation::Delete, _) => adapter.delete(key).await,
            _ => unreachable!("scan phases do not run on the worker pool"),
        };

        match outcome {
            Ok(()) => samples.push(begin.elapsed().as_micros() as u64),
            Err(e) => {
                token.cancel();
                return WorkerReport {
                    samples,
                    error: Some(e.at_sample(i)),
                };
            }
        }
    }

    WorkerReport {
        samples,
        error: None,
    }
}
