//! Concurrent probe pipeline.
//!
//! Data flow:
//!
//! ```text
//! dispatcher -> input queue -> N workers -> output queue -> consumer
//!                                  |
//!                         completion tracker
//! ```
//!
//! The input queue is a bounded channel whose single receiver is shared by
//! every worker behind an async mutex, so each target is handed to exactly
//! one worker. Each worker owns a clone of the output sender and the
//! pipeline keeps none, so the output queue closes exactly when the last
//! worker returns. The completion tracker joins every worker handle and
//! only then raises its flag; the consumer drains whatever is still queued
//! after seeing the flag, so no record is lost and the run cannot hang.

use crate::error::HostProbeError;
use crate::probes::Probe;
use crate::types::{Record, MAX_CONCURRENCY, MIN_CONCURRENCY};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Probe handle shared by every worker.
pub type SharedProbe = Arc<dyn Probe>;

/// Output queue slots per worker.
const OUTPUT_BUFFER_PER_WORKER: usize = 16;

/// What one worker did before it returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Targets taken from the input queue
    pub targets: usize,
    /// Records pushed to the output queue
    pub records: usize,
    /// Probe calls that returned an error
    pub probe_failures: usize,
}

/// Totals across the whole pool, produced by the completion tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub targets_processed: usize,
    pub records_emitted: usize,
    pub probe_failures: usize,
    /// Workers that ended with a panic instead of returning
    pub workers_panicked: usize,
}

impl PoolReport {
    fn add(&mut self, stats: WorkerStats) {
        self.targets_processed += stats.targets;
        self.records_emitted += stats.records;
        self.probe_failures += stats.probe_failures;
    }
}

/// Result of a full pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Targets read from the input and enqueued
    pub targets: usize,
    /// Records handed to the sink
    pub records: usize,
    pub probe_failures: usize,
    pub workers_panicked: usize,
}

/// Fixed-size set of workers sharing one input and one output queue.
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `concurrency` workers.
    ///
    /// The pool takes ownership of both queue ends: every worker gets a clone
    /// of `output` and the original is dropped before returning.
    pub fn spawn(
        concurrency: usize,
        probes: Arc<[SharedProbe]>,
        input: mpsc::Receiver<String>,
        output: mpsc::Sender<Record>,
    ) -> Vec<JoinHandle<WorkerStats>> {
        let input = Arc::new(Mutex::new(input));

        (0..concurrency.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&probes),
                    Arc::clone(&input),
                    output.clone(),
                ))
            })
            .collect()
    }
}

async fn run_worker(
    id: usize,
    probes: Arc<[SharedProbe]>,
    input: Arc<Mutex<mpsc::Receiver<String>>>,
    output: mpsc::Sender<Record>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    loop {
        // Guard is released before probing so other workers can dequeue.
        let next = input.lock().await.recv().await;
        let Some(target) = next else {
            break;
        };
        stats.targets += 1;

        for probe in probes.iter() {
            match probe.probe(&target).await {
                Ok(records) => {
                    for record in records {
                        if output.send(record).await.is_err() {
                            debug!(worker = id, "Output queue closed, worker stopping");
                            return stats;
                        }
                        stats.records += 1;
                    }
                }
                Err(e) => {
                    stats.probe_failures += 1;
                    debug!(
                        worker = id,
                        probe = probe.name(),
                        target = %target,
                        error = %e,
                        "Probe failed"
                    );
                }
            }
        }
    }

    debug!(
        worker = id,
        targets = stats.targets,
        records = stats.records,
        "Worker finished"
    );
    stats
}

/// Feed newline-delimited targets from `reader` into the input queue.
///
/// Only the line ending (`\n` or `\r\n`) is removed; empty lines are
/// forwarded too. Lines that are not valid UTF-8 are decoded lossily, so
/// each invalid byte sequence becomes U+FFFD in the target. Reading stops
/// at end of input, on a read error (logged), when `shutdown` resolves, or
/// when no worker is left to receive. The queue sender is dropped on
/// return, which closes the input queue.
///
/// Returns the number of targets enqueued.
pub async fn dispatch<R, S>(reader: R, queue: mpsc::Sender<String>, shutdown: S) -> usize
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let mut reader = reader;
    let mut buf = Vec::new();
    let mut dispatched = 0usize;
    tokio::pin!(shutdown);

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(dispatched, "Shutdown requested, no further targets will be read");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let target = line_to_target(&buf);
                if queue.send(target).await.is_err() {
                    warn!("No workers left to accept targets");
                    break;
                }
                dispatched += 1;
            }
            Err(e) => {
                error!(error = %e, "Failed to read input, treating as end of input");
                break;
            }
        }
    }

    debug!(dispatched, "Input exhausted, closing input queue");
    dispatched
}

fn line_to_target(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// One-shot signal raised after every worker has returned.
pub struct CompletionTracker {
    complete: watch::Receiver<bool>,
    handle: JoinHandle<PoolReport>,
}

impl CompletionTracker {
    /// Start joining `workers` in the background.
    pub fn spawn(workers: Vec<JoinHandle<WorkerStats>>) -> Self {
        let (complete_tx, complete) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut report = PoolReport::default();
            for worker in workers {
                match worker.await {
                    Ok(stats) => report.add(stats),
                    Err(e) => {
                        error!(error = %e, "Worker terminated abnormally");
                        report.workers_panicked += 1;
                    }
                }
            }
            complete_tx.send_replace(true);
            report
        });

        Self { complete, handle }
    }

    /// Whether every worker has returned.
    pub fn is_complete(&self) -> bool {
        *self.complete.borrow()
    }

    /// Wait until every worker has returned. Cancel safe.
    pub async fn wait(&mut self) {
        if self.complete.wait_for(|done| *done).await.is_err() {
            // Sender only disappears without firing if the join task died.
            warn!("Completion tracker stopped before signalling");
        }
    }

    /// Wait for completion and return the pool totals.
    pub async fn finish(self) -> PoolReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Completion tracker failed");
                PoolReport::default()
            }
        }
    }
}

/// Worker pool plus the probes it runs, in fixed order.
#[derive(Clone)]
pub struct Pipeline {
    probes: Arc<[SharedProbe]>,
    concurrency: usize,
}

impl Pipeline {
    /// Create a pipeline running `probes` in the given order for each target.
    ///
    /// `concurrency` is clamped to `MIN_CONCURRENCY..=MAX_CONCURRENCY`.
    pub fn new(probes: Vec<SharedProbe>, concurrency: usize) -> Self {
        Self {
            probes: probes.into(),
            concurrency: concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run until `input` is exhausted, handing each record to `on_record`.
    pub async fn run<R, F>(&self, input: R, on_record: F) -> Result<PipelineSummary, HostProbeError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        F: FnMut(Record) -> Result<(), HostProbeError>,
    {
        self.run_until(input, std::future::pending(), on_record)
            .await
    }

    /// Like [`Pipeline::run`], but stop reading input once `shutdown` resolves.
    ///
    /// Targets already enqueued are still probed and their records still
    /// reach `on_record`. If `on_record` fails, the output queue is closed,
    /// workers stop at their next send, and the error is returned once the
    /// pool has wound down.
    pub async fn run_until<R, S, F>(
        &self,
        input: R,
        shutdown: S,
        mut on_record: F,
    ) -> Result<PipelineSummary, HostProbeError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        S: Future<Output = ()> + Send + 'static,
        F: FnMut(Record) -> Result<(), HostProbeError>,
    {
        info!(
            workers = self.concurrency,
            probes = self.probes.len(),
            "Starting probe pipeline"
        );

        let (input_tx, input_rx) = mpsc::channel::<String>(self.concurrency);
        let (output_tx, mut output_rx) =
            mpsc::channel::<Record>(self.concurrency * OUTPUT_BUFFER_PER_WORKER);

        let workers = WorkerPool::spawn(
            self.concurrency,
            Arc::clone(&self.probes),
            input_rx,
            output_tx,
        );
        let mut completion = CompletionTracker::spawn(workers);
        let dispatcher = tokio::spawn(dispatch(input, input_tx, shutdown));

        let mut delivered = 0usize;
        let mut sink_error = None;

        loop {
            tokio::select! {
                biased;
                next = output_rx.recv() => match next {
                    Some(record) => {
                        if let Err(e) = on_record(record) {
                            sink_error = Some(e);
                            break;
                        }
                        delivered += 1;
                    }
                    // Every sender is gone, so every worker has returned.
                    None => break,
                },
                _ = completion.wait() => {
                    // Final drain: no sender is left, so this ends.
                    while let Some(record) = output_rx.recv().await {
                        if let Err(e) = on_record(record) {
                            sink_error = Some(e);
                            break;
                        }
                        delivered += 1;
                    }
                    break;
                }
            }
        }

        if sink_error.is_some() {
            // Stop reading input and let workers fail their next send.
            dispatcher.abort();
            drop(output_rx);
        }

        let targets = match dispatcher.await {
            Ok(count) => count,
            Err(e) if e.is_cancelled() => 0,
            Err(e) => {
                error!(error = %e, "Dispatcher terminated abnormally");
                0
            }
        };
        let report = completion.finish().await;

        if let Some(e) = sink_error {
            return Err(e);
        }

        let summary = PipelineSummary {
            targets,
            records: delivered,
            probe_failures: report.probe_failures,
            workers_panicked: report.workers_panicked,
        };
        info!(
            targets = summary.targets,
            records = summary.records,
            probe_failures = summary.probe_failures,
            "Probe pipeline finished"
        );
        Ok(summary)
    }
}
