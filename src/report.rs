//! Progress lines, the end-of-run summary table and the JSON report.

use anyhow::Context;
use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use workload_core::{
    LoopExit, MetricsSnapshot, OperationKind, OperationMeasurement, SpeedMetrics, WorkloadConfig,
};

/// How one loop ended, in report form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub kind: OperationKind,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&LoopExit> for LoopStatus {
    fn from(exit: &LoopExit) -> Self {
        Self {
            kind: exit.kind,
            ok: exit.is_ok(),
            error: exit.result.as_ref().err().map(|e| e.to_string()),
        }
    }
}

/// Everything written to the report file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config: WorkloadConfig,
    pub loops: Vec<LoopStatus>,
    pub snapshot: MetricsSnapshot,
}

impl RunReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse report")
    }
}

/// Totals for one operation kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    pub kind: OperationKind,
    pub measurements: usize,
    /// Items actually affected; zero for maintenance.
    pub items: u64,
    /// Sum of the measured operation durations.
    pub busy: Duration,
    /// Rate over `busy`, not over wall-clock time.
    pub speed: SpeedMetrics,
}

fn totals(durations_and_items: impl Iterator<Item = (Duration, u64)>) -> (usize, Duration, u64) {
    durations_and_items.fold((0, Duration::ZERO, 0), |(n, busy, items), (d, i)| {
        (n + 1, busy.saturating_add(d), items.saturating_add(i))
    })
}

/// Summarize every kind in `snapshot`, in loop order.
pub fn summarize(snapshot: &MetricsSnapshot) -> Vec<KindSummary> {
    OperationKind::ALL
        .iter()
        .map(|&kind| {
            let (measurements, busy, items) = match kind {
                OperationKind::Insert => totals(
                    snapshot
                        .insert
                        .iter()
                        .map(|m| (m.timing.duration, m.inserted_items)),
                ),
                OperationKind::Select => totals(
                    snapshot
                        .select
                        .iter()
                        .map(|m| (m.timing.duration, m.selected_items)),
                ),
                OperationKind::Update => totals(
                    snapshot
                        .update
                        .iter()
                        .map(|m| (m.timing.duration, m.updated_items)),
                ),
                OperationKind::Delete => totals(
                    snapshot
                        .delete
                        .iter()
                        .map(|m| (m.timing.duration, m.deleted_items)),
                ),
                OperationKind::Maintenance => {
                    totals(snapshot.maintenance.iter().map(|m| (m.timing.duration, 0)))
                }
            };
            KindSummary {
                kind,
                measurements,
                items,
                busy,
                speed: SpeedMetrics::compute(busy, items),
            }
        })
        .collect()
}

/// Format the end-of-run summary as a table.
pub fn format_table(snapshot: &MetricsSnapshot, loops: &[LoopStatus]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Operation",
        "Runs",
        "Items",
        "Busy",
        "Items/sec",
        "1M items",
        "Status",
    ]);

    for summary in summarize(snapshot) {
        let status_cell = match loops.iter().find(|l| l.kind == summary.kind) {
            Some(status) if status.ok => Cell::new("OK").fg(Color::Green),
            Some(_) => Cell::new("FAILED").fg(Color::Red),
            None => Cell::new("-"),
        };
        let (rate, per_million) = if summary.kind == OperationKind::Maintenance {
            ("-".to_string(), "-".to_string())
        } else {
            (
                format!("{:.1}", summary.speed.rate_per_second_f64()),
                format_duration(summary.speed.million_items_duration),
            )
        };

        table.add_row(vec![
            Cell::new(summary.kind),
            Cell::new(format_number(summary.measurements as u64)),
            Cell::new(format_number(summary.items)),
            Cell::new(format_duration(summary.busy)),
            Cell::new(rate),
            Cell::new(per_million),
            status_cell,
        ]);
    }

    let mut output = table.to_string();
    output.push('\n');

    let failed: Vec<&LoopStatus> = loops.iter().filter(|l| !l.ok).collect();
    if !failed.is_empty() {
        output.push_str("\nFailed loops:\n");
        for status in failed {
            output.push_str(&format!(
                "  {}: {}\n",
                status.kind,
                status.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    output
}

/// One progress line per kind, showing its latest measurement.
pub fn format_progress(snapshot: &MetricsSnapshot, elapsed: Duration, written: u64) -> String {
    let mut output = format!(
        "[{}] {} items written\n",
        format_duration(elapsed),
        format_number(written)
    );
    for kind in OperationKind::ALL {
        let line = match snapshot.last(kind) {
            None => "no measurements yet".to_string(),
            Some(OperationMeasurement::Insert(m)) => format!(
                "{} items in {:?} ({:.1}/s)",
                format_number(m.inserted_items),
                m.timing.duration,
                m.speed.rate_per_second_f64()
            ),
            Some(OperationMeasurement::Select(m)) => format!(
                "{}/{} items in {:?} ({:.1}/s)",
                format_number(m.selected_items),
                format_number(m.requested_items),
                m.timing.duration,
                m.speed.rate_per_second_f64()
            ),
            Some(OperationMeasurement::Update(m)) => format!(
                "{}/{} items at offset {} in {:?} ({:.1}/s)",
                format_number(m.updated_items),
                format_number(m.requested_items),
                format_number(m.offset),
                m.timing.duration,
                m.speed.rate_per_second_f64()
            ),
            Some(OperationMeasurement::Delete(m)) => format!(
                "{}/{} items in {:?} ({:.1}/s)",
                format_number(m.deleted_items),
                format_number(m.requested_items),
                m.timing.duration,
                m.speed.rate_per_second_f64()
            ),
            Some(OperationMeasurement::Maintenance(m)) => {
                format!("took {:?}", m.timing.duration)
            }
        };
        output.push_str(&format!(
            "  {:<12} {:>6} runs, last: {line}\n",
            kind.to_string(),
            snapshot.len(kind)
        ));
    }
    output
}

/// Format duration in human-readable format.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{:.1}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{}m {:02.0}s", mins as u64, remaining_secs.floor())
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - (hours * 3600.0);
        let mins = (remaining / 60.0).floor();
        format!("{}h {:02}m", hours as u64, mins as u64)
    }
}

/// Format number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
