//! Storage backend contract.
//!
//! The driver only talks to a store through these traits. A backend hands
//! out one connection per loop iteration; a connection opens at most one
//! transaction at a time, and the transaction borrows the connection until it
//! is committed or dropped. Dropping an uncommitted transaction must roll it
//! back.
//!
//! Every operation receives the run's cancellation token and returns a
//! zero/no-op result when the token is already cancelled.

use crate::config::{IsolationLevel, WorkloadConfig};
use crate::error::BackendError;
use crate::record::TestRecord;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Factory for connections to one store.
#[async_trait]
pub trait WorkloadBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Bring the store to its initial empty state. Called once per run,
    /// before any loop starts.
    async fn prepare(
        &self,
        config: &WorkloadConfig,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError>;

    /// Open a connection scoped to a single loop iteration.
    async fn connect(&self) -> Result<Box<dyn WorkloadConnection>, BackendError>;
}

/// A single connection.
#[async_trait]
pub trait WorkloadConnection: Send {
    /// Begin a transaction at `isolation`.
    async fn begin<'a>(
        &'a mut self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn WorkloadTransaction + 'a>, BackendError>;

    /// Run store maintenance (vacuum, compaction, ...) outside a transaction.
    async fn maintenance(&mut self, cancel: &CancellationToken) -> Result<(), BackendError>;
}

/// An open transaction. Counts returned are the items actually affected.
#[async_trait]
pub trait WorkloadTransaction: Send {
    async fn insert(
        &mut self,
        records: &[TestRecord],
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError>;

    /// Read the newest `requested` rows.
    async fn select(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError>;

    /// Rewrite `requested` rows after skipping the `offset` oldest ones.
    async fn update(
        &mut self,
        offset: u64,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError>;

    /// Remove the `requested` oldest rows.
    async fn delete(
        &mut self,
        requested: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, BackendError>;

    async fn commit(self: Box<Self>) -> Result<(), BackendError>;
}
