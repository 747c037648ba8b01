//! Concurrent workload driver for db-loadtest.
//!
//! This crate runs five independent loops against a storage backend while
//! recording how long every operation took:
//! 1. Insert batches of generated records
//! 2. Select the newest rows
//! 3. Update rows behind the newest data
//! 4. Delete the oldest rows
//! 5. Run store maintenance
//!
//! Measurements are collected per operation kind and can be snapshotted at
//! any time while the loops run.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workload_core::{MemoryBackend, WorkloadConfig, WorkloadDriver};
//!
//! let mut driver = WorkloadDriver::new(Arc::new(MemoryBackend::new()), WorkloadConfig::default());
//! driver.start().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//! let exits = driver.stop().await;
//! let snapshot = driver.snapshot();
//! ```

pub mod backend;
pub mod collector;
pub mod config;
pub mod counter;
pub mod driver;
pub mod duration;
mod engine;
pub mod error;
pub mod measurement;
pub mod memory;
pub mod record;
pub mod speed;

pub use backend::{WorkloadBackend, WorkloadConnection, WorkloadTransaction};
pub use collector::{MetricsCollector, MetricsSnapshot};
pub use config::{
    DeleteOptions, InsertOptions, IsolationLevel, MaintenanceOptions, SelectOptions, SkipPolicy,
    UpdateOptions, WorkloadConfig,
};
pub use counter::SharedCounter;
pub use driver::{LoopExit, WorkloadDriver};
pub use error::{BackendError, WorkloadError};
pub use measurement::{
    DeleteMeasurement, InsertMeasurement, MaintenanceMeasurement, Measurement, OperationKind,
    OperationMeasurement, SelectMeasurement, Timing, UpdateMeasurement,
};
pub use memory::MemoryBackend;
pub use record::{IdStrategy, RecordGenerator, TestRecord};
pub use speed::SpeedMetrics;
