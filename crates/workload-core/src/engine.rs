//! The five workload loops.
//!
//! Every loop repeats: draw parameters, open a connection, run the operation
//! in a transaction, commit, record a measurement, pause. Cancellation is
//! checked before each iteration; an operation already in flight completes.
//! A backend error ends the loop that hit it and nothing else.

use crate::backend::WorkloadBackend;
use crate::collector::MetricsCollector;
use crate::config::{
    DeleteOptions, InsertOptions, IsolationLevel, MaintenanceOptions, SelectOptions,
    UpdateOptions, WorkloadConfig,
};
use crate::counter::SharedCounter;
use crate::error::WorkloadError;
use crate::measurement::OperationKind;
use crate::record::{RecordGenerator, TestRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Shared state every loop gets a handle to.
#[derive(Clone)]
pub(crate) struct LoopContext {
    pub backend: Arc<dyn WorkloadBackend>,
    pub collector: Arc<MetricsCollector>,
    pub counter: SharedCounter,
    pub cancel: CancellationToken,
}

/// Transactional operation run by one iteration.
enum TxOperation<'r> {
    Insert(&'r [TestRecord]),
    Select { requested: u64 },
    Update { offset: u64, requested: u64 },
    Delete { requested: u64 },
}

impl TxOperation<'_> {
    fn kind(&self) -> OperationKind {
        match self {
            TxOperation::Insert(_) => OperationKind::Insert,
            TxOperation::Select { .. } => OperationKind::Select,
            TxOperation::Update { .. } => OperationKind::Update,
            TxOperation::Delete { .. } => OperationKind::Delete,
        }
    }
}

/// Draw from `[min, max)`; a degenerate range yields `min`.
pub(crate) fn draw<R: Rng>(rng: &mut R, min: u64, max: u64) -> u64 {
    if max <= min {
        min
    } else {
        rng.random_range(min..max)
    }
}

fn loop_rng(seed: Option<u64>, kind: OperationKind) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(kind.index() as u64)),
        None => StdRng::from_os_rng(),
    }
}

impl LoopContext {
    /// Run the loop for `kind` until cancellation or the first backend error.
    pub async fn run(
        self,
        kind: OperationKind,
        config: Arc<WorkloadConfig>,
    ) -> Result<(), WorkloadError> {
        let rng = loop_rng(config.seed, kind);
        let result = match kind {
            OperationKind::Insert => self.insert_loop(&config.insert, rng).await,
            OperationKind::Select => self.select_loop(&config.select, rng).await,
            OperationKind::Update => self.update_loop(&config.update, rng).await,
            OperationKind::Delete => self.delete_loop(&config.delete, rng).await,
            OperationKind::Maintenance => self.maintenance_loop(&config.maintenance).await,
        };

        match &result {
            Ok(()) => debug!("{kind} loop stopped"),
            Err(e) => error!("{kind} loop terminated: {e}"),
        }
        result
    }

    async fn insert_loop(
        &self,
        options: &InsertOptions,
        mut rng: StdRng,
    ) -> Result<(), WorkloadError> {
        let mut generator =
            RecordGenerator::new(options.id_strategy, options.start_date, options.step);

        while !self.cancel.is_cancelled() {
            let batch_size = draw(&mut rng, options.min_batch_size, options.max_batch_size);
            let records = generator.next_batch(batch_size, &mut rng);

            let (duration, inserted) = self
                .execute(options.isolation_level, TxOperation::Insert(&records))
                .await?;
            let written = self.counter.increment(inserted);
            self.collector.add_insert(options.pause, written, duration, inserted);
            debug!("insert: {inserted} items in {duration:?}, {written} written");

            self.pace(options.pause).await;
        }
        Ok(())
    }

    async fn select_loop(
        &self,
        options: &SelectOptions,
        mut rng: StdRng,
    ) -> Result<(), WorkloadError> {
        while !self.cancel.is_cancelled() {
            let requested = draw(
                &mut rng,
                options.min_items_to_select,
                options.max_items_to_select,
            );

            let (duration, selected) = self
                .execute(options.isolation_level, TxOperation::Select { requested })
                .await?;
            self.collector.add_select(
                options.pause,
                self.counter.load(),
                duration,
                requested,
                selected,
            );
            debug!("select: {selected}/{requested} items in {duration:?}");

            self.pace(options.pause).await;
        }
        Ok(())
    }

    async fn update_loop(
        &self,
        options: &UpdateOptions,
        mut rng: StdRng,
    ) -> Result<(), WorkloadError> {
        while !self.cancel.is_cancelled() {
            let requested = draw(
                &mut rng,
                options.min_items_to_update,
                options.max_items_to_update,
            );
            let max_skip = options.skip_policy.max_skip(self.counter.load());
            let offset = draw(&mut rng, options.min_items_to_skip, max_skip);

            let (duration, updated) = self
                .execute(
                    options.isolation_level,
                    TxOperation::Update { offset, requested },
                )
                .await?;
            self.collector.add_update(
                options.pause,
                self.counter.load(),
                duration,
                offset,
                requested,
                updated,
            );
            debug!("update: {updated}/{requested} items at offset {offset} in {duration:?}");

            self.pace(options.pause).await;
        }
        Ok(())
    }

    async fn delete_loop(
        &self,
        options: &DeleteOptions,
        mut rng: StdRng,
    ) -> Result<(), WorkloadError> {
        while !self.cancel.is_cancelled() {
            let requested = draw(
                &mut rng,
                options.min_items_to_delete,
                options.max_items_to_delete,
            );

            let (duration, deleted) = self
                .execute(options.isolation_level, TxOperation::Delete { requested })
                .await?;
            self.collector.add_delete(
                options.pause,
                self.counter.load(),
                duration,
                requested,
                deleted,
            );
            debug!("delete: {deleted}/{requested} items in {duration:?}");

            self.pace(options.pause).await;
        }
        Ok(())
    }

    async fn maintenance_loop(&self, options: &MaintenanceOptions) -> Result<(), WorkloadError> {
        let kind = OperationKind::Maintenance;
        while !self.cancel.is_cancelled() {
            let written_before = self.counter.load();

            let mut connection = self
                .backend
                .connect()
                .await
                .map_err(|e| WorkloadError::backend(kind, e))?;
            let started = Instant::now();
            connection
                .maintenance(&self.cancel)
                .await
                .map_err(|e| WorkloadError::backend(kind, e))?;
            let duration = started.elapsed();
            drop(connection);

            self.collector.add_maintenance(
                options.pause,
                self.counter.load(),
                written_before,
                duration,
            );
            debug!("maintenance: done in {duration:?}");

            self.pace(options.pause).await;
        }
        Ok(())
    }

    /// Run one operation in its own connection and transaction. The returned
    /// duration covers the operation and the commit.
    async fn execute(
        &self,
        isolation: IsolationLevel,
        operation: TxOperation<'_>,
    ) -> Result<(Duration, u64), WorkloadError> {
        let kind = operation.kind();
        let to_error = |e| WorkloadError::backend(kind, e);

        let mut connection = self.backend.connect().await.map_err(to_error)?;
        let mut tx = connection.begin(isolation).await.map_err(to_error)?;

        let started = Instant::now();
        let affected = match operation {
            TxOperation::Insert(records) => tx.insert(records, &self.cancel).await,
            TxOperation::Select { requested } => tx.select(requested, &self.cancel).await,
            TxOperation::Update { offset, requested } => {
                tx.update(offset, requested, &self.cancel).await
            }
            TxOperation::Delete { requested } => tx.delete(requested, &self.cancel).await,
        }
        .map_err(to_error)?;
        tx.commit().await.map_err(to_error)?;

        Ok((started.elapsed(), affected))
    }

    /// Sleep for `pause`, waking early only when the run is cancelled.
    async fn pause_or_cancel(&self, pause: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    async fn pace(&self, pause: Duration) {
        if pause.is_zero() {
            // Backends that never await would otherwise pin a worker thread.
            tokio::task::yield_now().await;
        } else {
            self.pause_or_cancel(pause).await;
        }
    }
}
