//! Append-only metrics store with point-in-time snapshots.
//!
//! Each operation kind has its own sequence of `Arc` entries. Readers load
//! the current version as an `Arc<Vec<_>>` and keep an unchanging view; a
//! producer appending while a version is held publishes a fresh copy of the
//! entry pointers instead of touching the held one. Producers never wait on
//! readers for longer than a pointer clone.

use crate::measurement::{
    DeleteMeasurement, InsertMeasurement, MaintenanceMeasurement, Measurement, OperationKind,
    OperationMeasurement, SelectMeasurement, Timing, UpdateMeasurement,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Atomically published sequence for one kind.
///
/// Entries are shared behind `Arc`. An append pushes in place when no reader
/// holds the current version and otherwise copies the entry pointers first,
/// so a loaded version never changes.
struct Series<T> {
    current: RwLock<Published<T>>,
}

struct Published<T> {
    entries: Arc<Vec<Arc<T>>>,
    first_measured_at: Option<DateTime<Utc>>,
}

impl<T: Measurement> Series<T> {
    fn new() -> Self {
        Self {
            current: RwLock::new(Published {
                entries: Arc::new(Vec::new()),
                first_measured_at: None,
            }),
        }
    }

    fn load(&self) -> Arc<Vec<Arc<T>>> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard.entries)
    }

    fn append(&self, entry: T) {
        let measured_at = entry.measured_at();
        let entry = Arc::new(entry);

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut guard.entries).push(entry);
        guard.first_measured_at = Some(match guard.first_measured_at {
            Some(first) => first.min(measured_at),
            None => measured_at,
        });
    }

    fn first_measure_time(&self) -> Option<DateTime<Utc>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first_measured_at
    }

    fn len(&self) -> usize {
        self.load().len()
    }

    fn filtered(&self, created_at: DateTime<Utc>) -> Vec<T> {
        let mut entries: Vec<T> = self
            .load()
            .iter()
            .filter(|m| m.measured_at() <= created_at)
            .map(|m| T::clone(m))
            .collect();
        entries.sort_by_key(Measurement::measured_at);
        entries
    }
}

/// Process-wide store of measurements, one sequence per operation kind.
pub struct MetricsCollector {
    insert: Series<InsertMeasurement>,
    select: Series<SelectMeasurement>,
    update: Series<UpdateMeasurement>,
    delete: Series<DeleteMeasurement>,
    maintenance: Series<MaintenanceMeasurement>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            insert: Series::new(),
            select: Series::new(),
            update: Series::new(),
            delete: Series::new(),
            maintenance: Series::new(),
        }
    }

    /// Append a measurement to the sequence of its kind.
    pub fn record(&self, measurement: impl Into<OperationMeasurement>) {
        match measurement.into() {
            OperationMeasurement::Insert(m) => self.insert.append(m),
            OperationMeasurement::Select(m) => self.select.append(m),
            OperationMeasurement::Update(m) => self.update.append(m),
            OperationMeasurement::Delete(m) => self.delete.append(m),
            OperationMeasurement::Maintenance(m) => self.maintenance.append(m),
        }
    }

    /// Earliest `measured_at` stored for `kind`, `None` while it is empty.
    pub fn first_measure_time(&self, kind: OperationKind) -> Option<DateTime<Utc>> {
        match kind {
            OperationKind::Insert => self.insert.first_measure_time(),
            OperationKind::Select => self.select.first_measure_time(),
            OperationKind::Update => self.update.first_measure_time(),
            OperationKind::Delete => self.delete.first_measure_time(),
            OperationKind::Maintenance => self.maintenance.first_measure_time(),
        }
    }

    /// Number of measurements currently stored for `kind`.
    pub fn len(&self, kind: OperationKind) -> usize {
        match kind {
            OperationKind::Insert => self.insert.len(),
            OperationKind::Select => self.select.len(),
            OperationKind::Update => self.update.len(),
            OperationKind::Delete => self.delete.len(),
            OperationKind::Maintenance => self.maintenance.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        OperationKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }

    fn timing_now(
        &self,
        kind: OperationKind,
        configured_pause: Duration,
        duration: Duration,
    ) -> Timing {
        let measured_at = Utc::now();
        let first_measure = self.first_measure_time(kind).unwrap_or(measured_at);
        Timing::new(first_measure, measured_at, configured_pause, duration)
    }

    /// Record an insert iteration measured now.
    pub fn add_insert(
        &self,
        configured_pause: Duration,
        already_written_items: u64,
        duration: Duration,
        inserted_items: u64,
    ) {
        let timing = self.timing_now(OperationKind::Insert, configured_pause, duration);
        self.insert.append(InsertMeasurement::new(
            timing,
            already_written_items,
            inserted_items,
        ));
    }

    /// Record a select iteration measured now.
    pub fn add_select(
        &self,
        configured_pause: Duration,
        already_written_items: u64,
        duration: Duration,
        requested_items: u64,
        selected_items: u64,
    ) {
        let timing = self.timing_now(OperationKind::Select, configured_pause, duration);
        self.select.append(SelectMeasurement::new(
            timing,
            already_written_items,
            requested_items,
            selected_items,
        ));
    }

    /// Record an update iteration measured now.
    pub fn add_update(
        &self,
        configured_pause: Duration,
        already_written_items: u64,
        duration: Duration,
        offset: u64,
        requested_items: u64,
        updated_items: u64,
    ) {
        let timing = self.timing_now(OperationKind::Update, configured_pause, duration);
        self.update.append(UpdateMeasurement::new(
            timing,
            already_written_items,
            offset,
            requested_items,
            updated_items,
        ));
    }

    /// Record a delete iteration measured now.
    pub fn add_delete(
        &self,
        configured_pause: Duration,
        already_written_items: u64,
        duration: Duration,
        requested_items: u64,
        deleted_items: u64,
    ) {
        let timing = self.timing_now(OperationKind::Delete, configured_pause, duration);
        self.delete.append(DeleteMeasurement::new(
            timing,
            already_written_items,
            requested_items,
            deleted_items,
        ));
    }

    /// Record a maintenance run measured now.
    pub fn add_maintenance(
        &self,
        configured_pause: Duration,
        already_written_items: u64,
        already_written_before: u64,
        duration: Duration,
    ) {
        let timing = self.timing_now(OperationKind::Maintenance, configured_pause, duration);
        self.maintenance.append(MaintenanceMeasurement::new(
            timing,
            already_written_items,
            already_written_before,
        ));
    }

    /// Take a consistent, time-bounded copy of everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let created_at = Utc::now();
        MetricsSnapshot {
            created_at,
            insert: self.insert.filtered(created_at),
            select: self.select.filtered(created_at),
            update: self.update.filtered(created_at),
            delete: self.delete.filtered(created_at),
            maintenance: self.maintenance.filtered(created_at),
        }
    }
}

/// Immutable view of all measurements taken at or before `created_at`,
/// each sequence ordered by `measured_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub created_at: DateTime<Utc>,
    pub insert: Vec<InsertMeasurement>,
    pub select: Vec<SelectMeasurement>,
    pub update: Vec<UpdateMeasurement>,
    pub delete: Vec<DeleteMeasurement>,
    pub maintenance: Vec<MaintenanceMeasurement>,
}

impl MetricsSnapshot {
    /// Number of measurements of `kind` in this snapshot.
    pub fn len(&self, kind: OperationKind) -> usize {
        match kind {
            OperationKind::Insert => self.insert.len(),
            OperationKind::Select => self.select.len(),
            OperationKind::Update => self.update.len(),
            OperationKind::Delete => self.delete.len(),
            OperationKind::Maintenance => self.maintenance.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        OperationKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }

    /// Latest measurement of `kind`, if any.
    pub fn last(&self, kind: OperationKind) -> Option<OperationMeasurement> {
        match kind {
            OperationKind::Insert => self.insert.last().cloned().map(Into::into),
            OperationKind::Select => self.select.last().cloned().map(Into::into),
            OperationKind::Update => self.update.last().cloned().map(Into::into),
            OperationKind::Delete => self.delete.last().cloned().map(Into::into),
            OperationKind::Maintenance => self.maintenance.last().cloned().map(Into::into),
        }
    }

    /// Whether both snapshots hold the same measurements, ignoring when they
    /// were taken.
    pub fn same_measurements(&self, other: &MetricsSnapshot) -> bool {
        self.insert == other.insert
            && self.select == other.select
            && self.update == other.update
            && self.delete == other.delete
            && self.maintenance == other.maintenance
    }
}
