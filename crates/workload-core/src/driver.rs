//! Starts and stops the five workload loops as a unit.

use crate::backend::WorkloadBackend;
use crate::collector::{MetricsCollector, MetricsSnapshot};
use crate::config::WorkloadConfig;
use crate::counter::SharedCounter;
use crate::engine::LoopContext;
use crate::error::WorkloadError;
use crate::measurement::OperationKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How one loop ended.
#[derive(Debug)]
pub struct LoopExit {
    pub kind: OperationKind,
    /// `Ok` when the loop stopped because of cancellation.
    pub result: Result<(), WorkloadError>,
}

impl LoopExit {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Owns the shared counter, the collector and the loop tasks of one run.
pub struct WorkloadDriver {
    backend: Arc<dyn WorkloadBackend>,
    config: Arc<WorkloadConfig>,
    collector: Arc<MetricsCollector>,
    counter: SharedCounter,
    cancel: CancellationToken,
    started: bool,
    handles: Vec<(OperationKind, JoinHandle<Result<(), WorkloadError>>)>,
}

impl WorkloadDriver {
    pub fn new(backend: Arc<dyn WorkloadBackend>, config: WorkloadConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            collector: Arc::new(MetricsCollector::new()),
            counter: SharedCounter::new(),
            cancel: CancellationToken::new(),
            started: false,
            handles: Vec::new(),
        }
    }

    /// Tie this run to an outer token: cancelling `parent` stops the loops.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Prepare the backend and spawn the loops.
    ///
    /// Nothing is spawned when validation or preparation fails, and the
    /// driver may be started again after such a failure. A driver whose
    /// token is already cancelled (by `stop` or by its parent) cannot start.
    pub async fn start(&mut self) -> Result<(), WorkloadError> {
        if self.started {
            return Err(WorkloadError::AlreadyStarted);
        }
        if self.cancel.is_cancelled() {
            return Err(WorkloadError::Cancelled);
        }
        self.config.validate()?;

        info!("Preparing {} backend", self.backend.name());
        self.backend
            .prepare(&self.config, &self.cancel)
            .await
            .map_err(WorkloadError::Prepare)?;
        self.started = true;

        let context = LoopContext {
            backend: Arc::clone(&self.backend),
            collector: Arc::clone(&self.collector),
            counter: self.counter.clone(),
            cancel: self.cancel.clone(),
        };
        for kind in OperationKind::ALL {
            let task = context.clone().run(kind, Arc::clone(&self.config));
            self.handles.push((kind, tokio::spawn(task)));
        }
        info!(
            "Started {} workload loops against {}",
            self.handles.len(),
            self.backend.name()
        );
        Ok(())
    }

    /// Cancel the run and wait for every loop to finish.
    ///
    /// Returns one entry per loop; later calls return an empty list.
    pub async fn stop(&mut self) -> Vec<LoopExit> {
        self.cancel.cancel();

        let mut exits = Vec::with_capacity(self.handles.len());
        for (kind, handle) in self.handles.drain(..) {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(WorkloadError::LoopPanicked {
                    kind,
                    message: panic_message(join_error),
                }),
            };
            exits.push(LoopExit { kind, result });
        }

        if !exits.is_empty() {
            let failed = exits.iter().filter(|e| !e.is_ok()).count();
            info!(
                "Stopped workload after {} written items ({failed} loops failed)",
                self.counter.load()
            );
        }
        exits
    }

    /// Point-in-time copy of all measurements.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }

    /// Current value of the shared "already written" counter.
    pub fn already_written(&self) -> u64 {
        self.counter.load()
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.collector)
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Whether loops have been spawned and not yet joined.
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Token that stops this run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for WorkloadDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
