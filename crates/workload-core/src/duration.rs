//! Duration parsing utilities.

use std::time::Duration;

/// Parse a duration string like "1h", "30m", "300s", "250ms" or "300".
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Nanoseconds suffix: "1500ns"
/// - Microseconds suffix: "500us"
/// - Milliseconds suffix: "250ms"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".to_string());
    }

    let parse = |num_str: &str, unit: &str| -> Result<u64, String> {
        num_str
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("Invalid {unit} value '{num_str}': {e}"))
    };

    // Two-letter suffixes must be checked before "m" and "s"
    if let Some(num_str) = s.strip_suffix("ns") {
        return Ok(Duration::from_nanos(parse(num_str, "nanoseconds")?));
    }
    if let Some(num_str) = s.strip_suffix("us") {
        return Ok(Duration::from_micros(parse(num_str, "microseconds")?));
    }
    if let Some(num_str) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(num_str, "milliseconds")?));
    }
    if let Some(num_str) = s.strip_suffix('h') {
        let hours = parse(num_str, "hours")?;
        return hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration out of range: {s}"));
    }
    if let Some(num_str) = s.strip_suffix('m') {
        let minutes = parse(num_str, "minutes")?;
        return minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Duration out of range: {s}"));
    }
    if let Some(num_str) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(num_str, "seconds")?));
    }

    // No suffix - treat as seconds
    Ok(Duration::from_secs(parse(s, "duration")?))
}

/// Render a duration with the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos % 1_000 != 0 {
        return format!("{}ns", duration.as_nanos());
    }
    if nanos % 1_000_000 != 0 {
        return format!("{}us", duration.as_micros());
    }
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// `#[serde(with = "...")]` adapter storing durations as human strings.
pub mod human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => super::parse_duration(&s).map_err(serde::de::Error::custom),
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        }
    }
}
