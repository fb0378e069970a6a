//! Bounded pool of mutation jobs, one per URL.
//!
//! A single producer walks the targets in input order and keeps at most
//! `concurrency` jobs in flight on the runtime's blocking pool. Every job
//! pushes its lines into a bounded result channel which the calling thread
//! drains into the sink. The producer holds the last sender and drops it only
//! after it has joined every job, so the channel closes strictly after the
//! final job is done.

use crate::config::EngineConfig;
use crate::error::{EngineError, JobError};
use crate::executor::{ExecutionStatus, MutationExecutor};
use crate::input::InputUrl;
use crate::mutator::{Mutator, Strategy};
use crate::sink::ResultSink;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

/// Result-channel slots per worker.
const RESULT_BUFFER_PER_WORKER: usize = 16;

/// Counters for a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub dispatched: usize,
    pub failed: usize,
    pub emitted: usize,
}

/// Dispatches mutation jobs for one run.
///
/// The strategy follows from the configuration alone, which is frozen behind
/// an `Arc` for the whole run, so every job mutates the same way.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<EngineConfig>,
}

impl Dispatcher {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy<'_> {
        Strategy::from_config(&self.config)
    }

    /// Mutates every target and writes the produced lines into `sink`.
    ///
    /// Jobs run on a tokio blocking pool capped at `concurrency` threads, fed
    /// in input order by a single producer. Results reach the sink in
    /// completion order.
    ///
    /// # Type Parameters
    /// * `I`: Any source of already normalized targets. It is consumed lazily
    ///   on the calling thread, so it needs neither `Send` nor `'static`.
    /// * `S`: The sink receiving result lines. Only the calling thread touches it.
    ///
    /// # Arguments
    /// * `targets`: URLs to mutate, one job each.
    /// * `sink`: Destination for every emitted line. `finish` is called once,
    ///   after the last line.
    ///
    /// # Returns
    /// `Result<RunStats, EngineError>`:
    ///   - `Ok(stats)`: Every job finished and every line reached the sink.
    ///     Failed jobs are only counted in `stats.failed`.
    ///   - `Err(EngineError::Sink(_))`: The sink failed. Remaining jobs are
    ///     abandoned and the run winds down without blocking.
    ///   - `Err(EngineError::Runtime(_))` or `Err(EngineError::WorkerPanicked)`:
    ///     The pool itself could not start or a job panicked.
    pub fn run<I, S>(&self, targets: I, sink: &mut S) -> Result<RunStats, EngineError>
    where
        I: IntoIterator<Item = InputUrl>,
        S: ResultSink + ?Sized,
    {
        let workers = self.config.options.concurrency.max(1);
        let runtime = build_runtime(workers)?;
        let (result_tx, result_rx) = mpsc::channel::<String>(workers * RESULT_BUFFER_PER_WORKER);

        tracing::debug!(workers, strategy = self.strategy().name(), "Starting dispatch");

        let (submitted, drained) = runtime.block_on(async {
            tokio::join!(
                submit_jobs(targets.into_iter(), Arc::clone(&self.config), result_tx, workers),
                drain_results(result_rx, sink),
            )
        });
        let emitted = drained?;
        let (dispatched, failed) = submitted?;

        let stats = RunStats {
            dispatched,
            failed,
            emitted,
        };
        tracing::info!(
            dispatched = stats.dispatched,
            failed = stats.failed,
            emitted = stats.emitted,
            "Run finished"
        );
        Ok(stats)
    }
}

/// Jobs are blocking work, so the async side only coordinates: one core
/// thread, and a blocking pool sized to the worker count.
fn build_runtime(workers: usize) -> Result<Runtime, EngineError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(workers)
        .thread_name("qsinject-worker")
        .build()
        .map_err(EngineError::Runtime)
}

/// Spawns one job per target, never more than `workers` at a time, then joins
/// the stragglers. Returns `(dispatched, failed)`.
async fn submit_jobs(
    targets: impl Iterator<Item = InputUrl>,
    config: Arc<EngineConfig>,
    results: mpsc::Sender<String>,
    workers: usize,
) -> Result<(usize, usize), EngineError> {
    let mut in_flight = JoinSet::new();
    let mut dispatched = 0;
    let mut failed = 0;

    for target in targets {
        while in_flight.len() >= workers {
            if let Some(joined) = in_flight.join_next().await {
                failed += failed_count(joined)?;
            }
        }
        // The drain side is gone; nothing left to produce for.
        if results.is_closed() {
            break;
        }

        let config = Arc::clone(&config);
        let results = results.clone();
        in_flight.spawn_blocking(move || run_job(&config, &target, &results));
        dispatched += 1;
    }

    while let Some(joined) = in_flight.join_next().await {
        failed += failed_count(joined)?;
    }
    Ok((dispatched, failed))
}

fn run_job(config: &EngineConfig, target: &InputUrl, results: &mpsc::Sender<String>) -> ExecutionStatus {
    let executor = MutationExecutor::new(Strategy::from_config(config));
    executor.execute_sync(target, &mut |line| {
        results.blocking_send(line).map_err(|_| JobError::OutputClosed)
    })
}

fn failed_count(joined: Result<ExecutionStatus, JoinError>) -> Result<usize, EngineError> {
    let status = joined.map_err(|e| {
        tracing::error!("Mutation job join: {e}");
        EngineError::WorkerPanicked
    })?;
    Ok(usize::from(matches!(status, ExecutionStatus::Failed(_))))
}

/// Consumes `results` until every sender is gone, then flushes the sink.
///
/// On a sink error the receiver is dropped on return so in-flight jobs see
/// their sends fail.
async fn drain_results<S: ResultSink + ?Sized>(
    mut results: mpsc::Receiver<String>,
    sink: &mut S,
) -> Result<usize, EngineError> {
    let mut emitted = 0;
    while let Some(line) = results.recv().await {
        sink.emit(&line).map_err(EngineError::Sink)?;
        emitted += 1;
    }
    sink.finish().map_err(EngineError::Sink)?;
    Ok(emitted)
}
