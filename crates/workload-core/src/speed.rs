//! Throughput computation shared by the item-based measurements.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const MILLION: u64 = 1_000_000;

/// Rate derived from one timed operation.
///
/// Both fields are zero unless the duration and the item count are positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedMetrics {
    /// Items per second.
    pub rate_per_second: Decimal,
    /// Projected time to process one million items at this rate.
    pub million_items_duration: Duration,
}

impl SpeedMetrics {
    /// Compute the rate for `items` processed in `duration`.
    ///
    /// Uses decimal arithmetic in nanoseconds; the per-million duration is
    /// truncated to whole nanoseconds.
    pub fn compute(duration: Duration, items: u64) -> Self {
        if duration.is_zero() || items == 0 {
            return Self::default();
        }

        let Ok(nanos) = Decimal::try_from_i128_with_scale(duration.as_nanos() as i128, 0) else {
            return Self::default();
        };
        let items = Decimal::from(items);

        let nanos_per_item = nanos / items;
        let rate_per_second = Decimal::from(NANOS_PER_SECOND)
            .checked_div(nanos_per_item)
            .unwrap_or_default();

        let million_items_duration = nanos_per_item
            .checked_mul(Decimal::from(MILLION))
            .and_then(|n| n.trunc().to_u64())
            .map(Duration::from_nanos)
            .unwrap_or(Duration::MAX);

        Self {
            rate_per_second,
            million_items_duration,
        }
    }

    /// Rate as a float, for display.
    pub fn rate_per_second_f64(&self) -> f64 {
        self.rate_per_second.to_f64().unwrap_or(0.0)
    }
}
