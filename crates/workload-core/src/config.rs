//! Workload configuration.
//!
//! Every loop has its own section with batch bounds, an isolation level and a
//! pause between iterations. Durations are written as human strings
//! (`"500us"`, `"250ms"`, `"5s"`, `"30m"`) in YAML and TOML files.

use crate::duration::human;
use crate::error::WorkloadError;
use crate::record::IdStrategy;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Transaction isolation level requested from the backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "read uncommitted"),
            IsolationLevel::ReadCommitted => write!(f, "read committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// Upper bound for the number of rows the update loop skips, derived from the
/// current "already written" count.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum SkipPolicy {
    /// Stay `window` rows behind the newest data: `max(0, written - window)`.
    BehindHead { window: u64 },
    /// Constant upper bound.
    Fixed { max: u64 },
    /// Arbitrary function, only available programmatically.
    #[serde(skip)]
    Custom(Arc<dyn Fn(u64) -> u64 + Send + Sync>),
}

impl SkipPolicy {
    pub fn custom(f: impl Fn(u64) -> u64 + Send + Sync + 'static) -> Self {
        SkipPolicy::Custom(Arc::new(f))
    }

    /// Exclusive upper bound of the skip range for `already_written` rows.
    pub fn max_skip(&self, already_written: u64) -> u64 {
        match self {
            SkipPolicy::BehindHead { window } => already_written.saturating_sub(*window),
            SkipPolicy::Fixed { max } => *max,
            SkipPolicy::Custom(f) => f(already_written),
        }
    }
}

impl Default for SkipPolicy {
    fn default() -> Self {
        SkipPolicy::BehindHead { window: 1000 }
    }
}

impl std::fmt::Debug for SkipPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipPolicy::BehindHead { window } => {
                f.debug_struct("BehindHead").field("window", window).finish()
            }
            SkipPolicy::Fixed { max } => f.debug_struct("Fixed").field("max", max).finish(),
            SkipPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for SkipPolicy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SkipPolicy::BehindHead { window: a }, SkipPolicy::BehindHead { window: b }) => a == b,
            (SkipPolicy::Fixed { max: a }, SkipPolicy::Fixed { max: b }) => a == b,
            (SkipPolicy::Custom(a), SkipPolicy::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn default_start_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Insert loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertOptions {
    pub min_batch_size: u64,
    pub max_batch_size: u64,
    pub isolation_level: IsolationLevel,
    #[serde(with = "human")]
    pub pause: Duration,
    pub id_strategy: IdStrategy,
    /// Timestamp the first batch continues from.
    pub start_date: DateTime<Utc>,
    /// Distance between consecutive record timestamps.
    #[serde(with = "human")]
    pub step: Duration,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            min_batch_size: 25_000,
            max_batch_size: 25_000,
            isolation_level: IsolationLevel::ReadCommitted,
            pause: Duration::from_millis(1),
            id_strategy: IdStrategy::RandomV4,
            start_date: default_start_date(),
            step: Duration::from_millis(100),
        }
    }
}

/// Select loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOptions {
    pub min_items_to_select: u64,
    pub max_items_to_select: u64,
    pub isolation_level: IsolationLevel,
    #[serde(with = "human")]
    pub pause: Duration,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            min_items_to_select: 1_000,
            max_items_to_select: 1_000,
            isolation_level: IsolationLevel::ReadCommitted,
            pause: Duration::from_millis(1),
        }
    }
}

/// Update loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    pub min_items_to_update: u64,
    pub max_items_to_update: u64,
    pub min_items_to_skip: u64,
    pub isolation_level: IsolationLevel,
    #[serde(with = "human")]
    pub pause: Duration,
    pub skip_policy: SkipPolicy,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            min_items_to_update: 1_000,
            max_items_to_update: 1_000,
            min_items_to_skip: 0,
            isolation_level: IsolationLevel::ReadCommitted,
            pause: Duration::from_secs(5),
            skip_policy: SkipPolicy::default(),
        }
    }
}

/// Delete loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    pub min_items_to_delete: u64,
    pub max_items_to_delete: u64,
    pub isolation_level: IsolationLevel,
    #[serde(with = "human")]
    pub pause: Duration,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            min_items_to_delete: 5_000,
            max_items_to_delete: 5_000,
            isolation_level: IsolationLevel::ReadCommitted,
            pause: Duration::from_secs(1),
        }
    }
}

/// Maintenance loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceOptions {
    #[serde(with = "human")]
    pub pause: Duration,
}

impl Default for MaintenanceOptions {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(30),
        }
    }
}

/// Configuration for all five workload loops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Random seed; loops draw from the OS when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub insert: InsertOptions,
    pub select: SelectOptions,
    pub update: UpdateOptions,
    pub delete: DeleteOptions,
    pub maintenance: MaintenanceOptions,
}

impl WorkloadConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkloadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, WorkloadError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load from a `.yaml`, `.yml` or `.toml` file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkloadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            Some("toml") => Self::from_toml(&content)?,
            _ => {
                return Err(WorkloadError::Config(format!(
                    "Unsupported config file extension: {}",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check bounds and steps.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        check_bounds(
            "insert batch size",
            self.insert.min_batch_size,
            self.insert.max_batch_size,
        )?;
        if self.insert.max_batch_size == 0 {
            return Err(WorkloadError::Config(
                "insert max_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.insert.step.is_zero() {
            return Err(WorkloadError::Config(
                "insert step must be greater than zero".to_string(),
            ));
        }
        check_bounds(
            "items to select",
            self.select.min_items_to_select,
            self.select.max_items_to_select,
        )?;
        check_bounds(
            "items to update",
            self.update.min_items_to_update,
            self.update.max_items_to_update,
        )?;
        check_bounds(
            "items to delete",
            self.delete.min_items_to_delete,
            self.delete.max_items_to_delete,
        )?;

        if self.maintenance.pause.is_zero() {
            tracing::warn!("Maintenance pause is zero; maintenance will run back to back");
        }
        Ok(())
    }
}

fn check_bounds(what: &str, min: u64, max: u64) -> Result<(), WorkloadError> {
    if max < min {
        return Err(WorkloadError::Config(format!(
            "{what}: maximum {max} is below minimum {min}"
        )));
    }
    Ok(())
}
