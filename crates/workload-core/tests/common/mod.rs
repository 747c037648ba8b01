//! Shared helpers for driver scenarios: a fast workload profile and a
//! backend wrapper that injects failures.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use workload_core::{
    BackendError, IsolationLevel, MemoryBackend, TestRecord, WorkloadBackend, WorkloadConfig,
    WorkloadConnection, WorkloadTransaction,
};

/// Profile with small batches and millisecond pauses.
pub fn fast_config() -> WorkloadConfig {
    let mut config = WorkloadConfig {
        seed: Some(42),
        ..WorkloadConfig::default()
    };
    config.insert.min_batch_size = 10;
    config.insert.max_batch_size = 20;
    config.insert.pause = Duration::from_millis(1);
    config.select.min_items_to_select = 5;
    config.select.max_items_to_select = 10;
    config.select.pause = Duration::from_millis(1);
    config.update.min_items_to_update = 1;
    config.update.max_items_to_update = 5;
    config.update.pause = Duration::from_millis(1);
    config.delete.min_items_to_delete = 1;
    config.delete.max_items_to_delete = 3;
    config.delete.pause = Duration::from_millis(2);
    config.maintenance.pause = Duration::from_millis(5);
    config
}

/// Profile where only the insert loop does real work; every other loop runs
/// once with zero items and then sleeps until stopped.
pub fn insert_only_config(batch_size: u64) -> WorkloadConfig {
    let mut config = fast_config();
    config.insert.min_batch_size = batch_size;
    config.insert.max_batch_size = batch_size;
    config.select.min_items_to_select = 0;
    config.select.max_items_to_select = 0;
    config.select.pause = Duration::from_secs(3600);
    config.update.min_items_to_update = 0;
    config.update.max_items_to_update = 0;
    config.update.pause = Duration::from_secs(3600);
    config.delete.min_items_to_delete = 0;
    config.delete.max_items_to_delete = 0;
    config.delete.pause = Duration::from_secs(3600);
    config.maintenance.pause = Duration::from_secs(3600);
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the n-th select call (1-based).
    FailSelectOn(u64),
    /// Panic inside every delete call.
    PanicOnDelete,
    /// Fail `prepare`.
    FailPrepare,
}

/// Memory backend wrapper that injects one kind of fault.
pub struct FaultyBackend {
    pub inner: MemoryBackend,
    fault: Fault,
    select_calls: Arc<AtomicU64>,
}

impl FaultyBackend {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryBackend::new(),
            fault,
            select_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn select_calls(&self) -> u64 {
        self.select_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadBackend for FaultyBackend {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn prepare(
        &self,
        config: &WorkloadConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        if self.fault == Fault::FailPrepare {
            return Err(BackendError::new("database unreachable"));
        }
        self.inner.prepare(config, cancel).await
    }

    async fn connect(&self) -> Result<Box<dyn WorkloadConnection>, BackendError> {
        let inner = self.inner.connect().await?;
        Ok(Box::new(FaultyConnection {
            inner,
            fault: self.fault,
            select_calls: Arc::clone(&self.select_calls),
        }))
    }
}

struct FaultyConnection {
    inner: Box<dyn WorkloadConnection>,
    fault: Fault,
    select_calls: Arc<AtomicU64>,
}

#[async_trait]
impl WorkloadConnection for FaultyConnection {
    async fn begin<'a>(
        &'a mut self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn WorkloadTransaction + 'a>, BackendError> {
        let fault = self.fault;
        let select_calls = Arc::clone(&self.select_calls);
        let inner = self.inner.begin(isolation).await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            fault,
            select_calls,
        }))
    }

    async fn maintenance(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        self.inner.maintenance(cancel).await
    }
}

struct FaultyTransaction<'a> {
    inner: Box<dyn WorkloadTransaction + 'a>,
    fault: Fault,
    select_calls: Arc<AtomicU64>,
}

#[async_trait]
impl<'a> WorkloadTransaction for FaultyTransaction<'a> {
    async fn insert(
        &mut self,
        records: &[TestRecord],
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        self.inner.insert(records, cancel).await
    }

    async fn select(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        let call = self.select_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fault == Fault::FailSelectOn(call) {
            return Err(BackendError::new("injected select failure"));
        }
        self.inner.select(requested, cancel).await
    }

    async fn update(
        &mut self,
        offset: u64,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        self.inner.update(offset, requested, cancel).await
    }

    async fn delete(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if self.fault == Fault::PanicOnDelete {
            panic!("injected delete panic");
        }
        self.inner.delete(requested, cancel).await
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        self.inner.commit().await
    }
}
