//! Partition runner: executes deferred units on tokio tasks.
//!
//! Units are started lazily, at most `concurrency` at a time, each on its
//! own task. A failing unit never affects the others; when the runner is
//! configured with more than one attempt, a failed unit is executed again
//! from scratch. Dropping the outcome stream aborts the tasks still running;
//! their scroll contexts are left to expire.

use escan_core::{DeferredUnit, Document, PartitionResult, ScanError};
use futures::stream::{self, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::metrics::ScanMetrics;

/// Result of running one unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub partition_index: usize,
    pub attempts: usize,
    pub result: Result<PartitionResult, RunnerError>,
}

impl UnitOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Failures worth another attempt: the ones a fresh scroll can get past.
fn is_retryable(error: &ScanError) -> bool {
    matches!(error, ScanError::Scroll { .. } | ScanError::Connection(_))
}

/// Aborts the task when its outcome is no longer awaited.
struct AbortOnDrop(JoinHandle<UnitOutcome>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn execute_with_retry(
    unit: &DeferredUnit,
    max_attempts: usize,
    metrics: &ScanMetrics,
) -> UnitOutcome {
    let partition_index = unit.partition_index();
    let mut attempts = 0;
    let _active = metrics.track_active();
    let result = loop {
        attempts += 1;
        match unit.execute().await {
            Ok(result) => {
                metrics.record_success(result.len());
                break Ok(result);
            }
            Err(e) if attempts < max_attempts && is_retryable(&e) => {
                warn!(
                    "Partition {} attempt {}/{} failed, retrying: {}",
                    partition_index, attempts, max_attempts, e
                );
                metrics.unit_retries.inc();
            }
            Err(e) => {
                error!(
                    "Partition {} failed after {} attempt(s): {}",
                    partition_index, attempts, e
                );
                metrics.record_failure();
                break Err(RunnerError::UnitFailed {
                    partition_index,
                    attempts,
                    source: e,
                });
            }
        }
    };
    UnitOutcome {
        partition_index,
        attempts,
        result,
    }
}

/// Executes the units of a scan with bounded parallelism.
#[derive(Debug, Clone)]
pub struct PartitionRunner {
    config: RunnerConfig,
    metrics: ScanMetrics,
}

impl PartitionRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_metrics(config, ScanMetrics::new())
    }

    pub fn with_metrics(config: RunnerConfig, metrics: ScanMetrics) -> Self {
        Self { config, metrics }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Outcomes of `units` in completion order.
    ///
    /// Nothing runs until the stream is polled; each unit is spawned on its
    /// own task when a concurrency slot frees up. Units still running when
    /// the stream is dropped are aborted.
    pub fn stream(&self, units: Vec<DeferredUnit>) -> impl Stream<Item = UnitOutcome> + Send {
        let max_attempts = self.config.max_attempts.max(1);
        let concurrency = self.config.concurrency.max(1);
        let metrics = self.metrics.clone();

        stream::iter(units)
            .map(move |unit| {
                let metrics = metrics.clone();
                async move {
                    let partition_index = unit.partition_index();
                    let task_metrics = metrics.clone();
                    let mut task = AbortOnDrop(tokio::spawn(async move {
                        execute_with_retry(&unit, max_attempts, &task_metrics).await
                    }));
                    match (&mut task.0).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("Partition {} task aborted: {}", partition_index, e);
                            metrics.record_failure();
                            UnitOutcome {
                                partition_index,
                                attempts: 0,
                                result: Err(RunnerError::TaskAborted {
                                    partition_index,
                                    reason: e.to_string(),
                                }),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
    }

    /// Run every unit and return the outcomes ordered by partition index.
    pub async fn run(&self, units: Vec<DeferredUnit>) -> Vec<UnitOutcome> {
        let run_id = Uuid::new_v4();
        let total = units.len();
        info!(
            "Run {}: executing {} units (concurrency {}, attempts {})",
            run_id, total, self.config.concurrency, self.config.max_attempts
        );

        let mut outcomes: Vec<UnitOutcome> = self.stream(units).collect().await;
        outcomes.sort_by_key(|o| o.partition_index);

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(
            "Run {}: {} of {} units succeeded",
            run_id,
            total - failed,
            total
        );
        outcomes
    }

    /// Run every unit and concatenate their documents in partition order.
    ///
    /// Fails with the lowest-indexed failed unit's error.
    pub async fn collect(&self, units: Vec<DeferredUnit>) -> Result<Vec<Document>, RunnerError> {
        let mut documents = Vec::new();
        for outcome in self.run(units).await {
            documents.extend(outcome.result?.into_documents());
        }
        Ok(documents)
    }
}
