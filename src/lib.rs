//! db-loadtest
//!
//! A load generator that runs concurrent insert, select, update, delete and
//! maintenance loops against a database and reports per-operation timings.
//!
//! The workload itself lives in `workload_core`; backends live in their own
//! crates (`workload_postgresql`). This crate holds the pieces the command
//! line needs: run orchestration, progress output and the final report.

pub mod logging;
pub mod report;
pub mod run;

pub use report::{LoopStatus, RunReport};
pub use run::{run_workload, CommonRunArgs};
