//! Immutable per-iteration measurement records.

use crate::speed::SpeedMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of workload operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Select,
    Update,
    Delete,
    Maintenance,
}

impl OperationKind {
    /// Every kind, in the order loops are started.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Insert,
        OperationKind::Select,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Maintenance,
    ];

    /// Stable index of the kind within [`OperationKind::ALL`].
    pub fn index(self) -> usize {
        match self {
            OperationKind::Insert => 0,
            OperationKind::Select => 1,
            OperationKind::Update => 2,
            OperationKind::Delete => 3,
            OperationKind::Maintenance => 4,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Select => write!(f, "select"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Timing fields shared by every measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Wall-clock time the measurement was taken.
    pub measured_at: DateTime<Utc>,
    /// Distance from the earliest measurement of the same kind.
    pub time_since_first_measure: Duration,
    /// `time_since_first_measure` in whole microseconds.
    pub time_since_first_measure_us: u64,
    /// Pause configured between iterations of this kind.
    pub configured_pause: Duration,
    /// Time spent in the backend call and commit.
    pub duration: Duration,
    /// `duration` in whole microseconds.
    pub duration_us: u64,
}

impl Timing {
    /// Build timing fields. A `first_measure` after `measured_at` (clock
    /// stepped backwards) yields a zero offset.
    pub fn new(
        first_measure: DateTime<Utc>,
        measured_at: DateTime<Utc>,
        configured_pause: Duration,
        duration: Duration,
    ) -> Self {
        let time_since_first_measure = (measured_at - first_measure)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            measured_at,
            time_since_first_measure,
            time_since_first_measure_us: micros(time_since_first_measure),
            configured_pause,
            duration,
            duration_us: micros(duration),
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// One insert iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertMeasurement {
    #[serde(flatten)]
    pub timing: Timing,
    /// Shared counter value right after this batch was counted.
    pub already_written_items: u64,
    pub inserted_items: u64,
    #[serde(flatten)]
    pub speed: SpeedMetrics,
}

impl InsertMeasurement {
    pub fn new(timing: Timing, already_written_items: u64, inserted_items: u64) -> Self {
        let speed = SpeedMetrics::compute(timing.duration, inserted_items);
        Self {
            timing,
            already_written_items,
            inserted_items,
            speed,
        }
    }
}

/// One select iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectMeasurement {
    #[serde(flatten)]
    pub timing: Timing,
    pub already_written_items: u64,
    pub requested_items: u64,
    pub selected_items: u64,
    #[serde(flatten)]
    pub speed: SpeedMetrics,
}

impl SelectMeasurement {
    pub fn new(
        timing: Timing,
        already_written_items: u64,
        requested_items: u64,
        selected_items: u64,
    ) -> Self {
        let speed = SpeedMetrics::compute(timing.duration, selected_items);
        Self {
            timing,
            already_written_items,
            requested_items,
            selected_items,
            speed,
        }
    }
}

/// One update iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMeasurement {
    #[serde(flatten)]
    pub timing: Timing,
    pub already_written_items: u64,
    /// Number of oldest rows skipped before updating.
    pub offset: u64,
    pub requested_items: u64,
    pub updated_items: u64,
    #[serde(flatten)]
    pub speed: SpeedMetrics,
}

impl UpdateMeasurement {
    pub fn new(
        timing: Timing,
        already_written_items: u64,
        offset: u64,
        requested_items: u64,
        updated_items: u64,
    ) -> Self {
        let speed = SpeedMetrics::compute(timing.duration, updated_items);
        Self {
            timing,
            already_written_items,
            offset,
            requested_items,
            updated_items,
            speed,
        }
    }
}

/// One delete iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMeasurement {
    #[serde(flatten)]
    pub timing: Timing,
    pub already_written_items: u64,
    pub requested_items: u64,
    pub deleted_items: u64,
    #[serde(flatten)]
    pub speed: SpeedMetrics,
}

impl DeleteMeasurement {
    pub fn new(
        timing: Timing,
        already_written_items: u64,
        requested_items: u64,
        deleted_items: u64,
    ) -> Self {
        let speed = SpeedMetrics::compute(timing.duration, deleted_items);
        Self {
            timing,
            already_written_items,
            requested_items,
            deleted_items,
            speed,
        }
    }
}

/// One maintenance run. Maintenance has no item count, so no rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceMeasurement {
    #[serde(flatten)]
    pub timing: Timing,
    pub already_written_items: u64,
    /// Shared counter value observed before the run started.
    pub already_written_before: u64,
}

impl MaintenanceMeasurement {
    pub fn new(timing: Timing, already_written_items: u64, already_written_before: u64) -> Self {
        Self {
            timing,
            already_written_items,
            already_written_before,
        }
    }
}

/// Access to the fields the collector orders and filters by.
pub trait Measurement: Clone + Send + Sync + 'static {
    fn timing(&self) -> &Timing;

    fn measured_at(&self) -> DateTime<Utc> {
        self.timing().measured_at
    }
}

macro_rules! impl_measurement {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Measurement for $ty {
                fn timing(&self) -> &Timing {
                    &self.timing
                }
            }
        )+
    };
}

impl_measurement!(
    InsertMeasurement,
    SelectMeasurement,
    UpdateMeasurement,
    DeleteMeasurement,
    MaintenanceMeasurement,
);

/// A measurement of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationMeasurement {
    Insert(InsertMeasurement),
    Select(SelectMeasurement),
    Update(UpdateMeasurement),
    Delete(DeleteMeasurement),
    Maintenance(MaintenanceMeasurement),
}

impl OperationMeasurement {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationMeasurement::Insert(_) => OperationKind::Insert,
            OperationMeasurement::Select(_) => OperationKind::Select,
            OperationMeasurement::Update(_) => OperationKind::Update,
            OperationMeasurement::Delete(_) => OperationKind::Delete,
            OperationMeasurement::Maintenance(_) => OperationKind::Maintenance,
        }
    }

    pub fn timing(&self) -> &Timing {
        match self {
            OperationMeasurement::Insert(m) => &m.timing,
            OperationMeasurement::Select(m) => &m.timing,
            OperationMeasurement::Update(m) => &m.timing,
            OperationMeasurement::Delete(m) => &m.timing,
            OperationMeasurement::Maintenance(m) => &m.timing,
        }
    }
}

macro_rules! impl_from_measurement {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for OperationMeasurement {
                fn from(m: $ty) -> Self {
                    OperationMeasurement::$variant(m)
                }
            }
        )+
    };
}

impl_from_measurement!(
    Insert => InsertMeasurement,
    Select => SelectMeasurement,
    Update => UpdateMeasurement,
    Delete => DeleteMeasurement,
    Maintenance => MaintenanceMeasurement,
);
