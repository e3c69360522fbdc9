use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Parses record timestamps as they appear in agent transcripts
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a timestamp string into a DateTime<Utc>
    /// Handles Z suffix, explicit offsets and naive ISO 8601 (assumed UTC)
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let trimmed = timestamp_str.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// Parse a JSON timestamp: a string, or epoch seconds / milliseconds
    pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
        if let Some(text) = value.as_str() {
            return Self::parse(text).ok();
        }

        let raw = value.as_i64()?;
        // Anything past year ~33658 in seconds is really milliseconds
        if raw.abs() >= 1_000_000_000_000 {
            DateTime::<Utc>::from_timestamp_millis(raw)
        } else {
            DateTime::<Utc>::from_timestamp(raw, 0)
        }
    }

    /// Top-level `timestamp` of a transcript line, if present and parseable
    pub fn from_line(line: &Value) -> Option<DateTime<Utc>> {
        line.get("timestamp").and_then(Self::parse_value)
    }
}
