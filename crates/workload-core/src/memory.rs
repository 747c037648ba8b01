//! In-process backend.
//!
//! Rows live in a map ordered by `(created_at, id)`, so "oldest" and "newest"
//! mean the same thing as on a table indexed by `created_at`. A transaction
//! computes its affected counts against the committed rows, stages its
//! effect and applies it on commit. Dropping it discards the staged effect.

use crate::backend::{WorkloadBackend, WorkloadConnection, WorkloadTransaction};
use crate::config::{IsolationLevel, WorkloadConfig};
use crate::error::BackendError;
use crate::record::TestRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Payload written by the update operation.
pub const UPDATED_PAYLOAD: &str = "DEADBEEF";

type RowKey = (DateTime<Utc>, Uuid);

#[derive(Default)]
struct Store {
    rows: BTreeMap<RowKey, String>,
    prepare_runs: u64,
    maintenance_runs: u64,
    commits: u64,
}

/// Backend keeping all rows in memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        lock_store(&self.store)
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed rows, oldest first.
    pub fn rows(&self) -> Vec<TestRecord> {
        self.lock()
            .rows
            .iter()
            .map(|((created_at, id), payload)| TestRecord {
                id: *id,
                created_at: *created_at,
                payload: payload.clone(),
            })
            .collect()
    }

    pub fn prepare_runs(&self) -> u64 {
        self.lock().prepare_runs
    }

    pub fn maintenance_runs(&self) -> u64 {
        self.lock().maintenance_runs
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> u64 {
        self.lock().commits
    }
}

fn lock_store(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl WorkloadBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn prepare(
        &self,
        _config: &WorkloadConfig,
        _cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        let mut store = self.lock();
        store.rows.clear();
        store.prepare_runs += 1;
        Ok(())
    }

    async fn connect(&self) -> Result<Box<dyn WorkloadConnection>, BackendError> {
        Ok(Box::new(MemoryConnection {
            store: Arc::clone(&self.store),
        }))
    }
}

/// Connection to a [`MemoryBackend`].
pub struct MemoryConnection {
    store: Arc<Mutex<Store>>,
}

#[async_trait]
impl WorkloadConnection for MemoryConnection {
    async fn begin<'a>(
        &'a mut self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn WorkloadTransaction + 'a>, BackendError> {
        Ok(Box::new(MemoryTransaction {
            connection: self,
            isolation,
            staged: Vec::new(),
        }))
    }

    async fn maintenance(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        lock_store(&self.store).maintenance_runs += 1;
        Ok(())
    }
}

enum Staged {
    Insert(Vec<TestRecord>),
    Update { offset: u64, count: u64 },
    Delete { count: u64 },
}

/// Transaction on a [`MemoryConnection`].
pub struct MemoryTransaction<'a> {
    connection: &'a mut MemoryConnection,
    isolation: IsolationLevel,
    staged: Vec<Staged>,
}

impl MemoryTransaction<'_> {
    fn committed_len(&self) -> u64 {
        lock_store(&self.connection.store).rows.len() as u64
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }
}

fn to_count(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl<'a> WorkloadTransaction for MemoryTransaction<'a> {
    async fn insert(
        &mut self,
        records: &[TestRecord],
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() || records.is_empty() {
            return Ok(0);
        }
        self.staged.push(Staged::Insert(records.to_vec()));
        Ok(records.len() as u64)
    }

    async fn select(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        Ok(requested.min(self.committed_len()))
    }

    async fn update(
        &mut self,
        offset: u64,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        let count = requested.min(self.committed_len().saturating_sub(offset));
        if count > 0 {
            self.staged.push(Staged::Update { offset, count });
        }
        Ok(count)
    }

    async fn delete(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }
        let count = requested.min(self.committed_len());
        if count > 0 {
            self.staged.push(Staged::Delete { count });
        }
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), BackendError> {
        let MemoryTransaction {
            connection, staged, ..
        } = *self;
        let mut store = lock_store(&connection.store);
        for staged in staged {
            match staged {
                Staged::Insert(records) => {
                    for record in records {
                        store
                            .rows
                            .insert((record.created_at, record.id), record.payload);
                    }
                }
                Staged::Update { offset, count } => {
                    for payload in store
                        .rows
                        .values_mut()
                        .skip(to_count(offset))
                        .take(to_count(count))
                    {
                        *payload = UPDATED_PAYLOAD.to_string();
                    }
                }
                Staged::Delete { count } => {
                    let doomed: Vec<RowKey> =
                        store.rows.keys().take(to_count(count)).copied().collect();
                    for key in doomed {
                        store.rows.remove(&key);
                    }
                }
            }
        }
        store.commits += 1;
        Ok(())
    }
}
