//! Turn latency and session duration.
//!
//! A turn starts at a user message and ends at the next agent message. Only
//! the first agent reply after a user message closes the turn.

use crate::models::LatencyStats;
use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub struct LatencyTracker {
    pending_start: Option<DateTime<Utc>>,
    samples: Vec<u64>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every timestamped line counts toward the session span, in file order.
    pub fn observe(&mut self, timestamp: DateTime<Utc>) {
        if self.first_seen.is_none() {
            self.first_seen = Some(timestamp);
        }
        self.last_seen = Some(timestamp);
    }

    /// A later user message before any reply restarts the turn. An untimed
    /// user message leaves the turn without a start.
    pub fn user_message(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.pending_start = timestamp;
    }

    pub fn agent_message(&mut self, timestamp: Option<DateTime<Utc>>) {
        if let (Some(start), Some(end)) = (self.pending_start, timestamp) {
            self.pending_start = None;
            let gap = (end - start).num_milliseconds().max(0);
            self.samples.push(u64::try_from(gap).unwrap_or(0));
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.first_seen
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Milliseconds from the first to the last timestamp, clamped at zero.
    pub fn duration_ms(&self) -> u64 {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => u64::try_from((last - first).num_milliseconds().max(0)).unwrap_or(0),
            _ => 0,
        }
    }

    pub fn stats(&self) -> LatencyStats {
        summarize(&self.samples)
    }
}

/// avg, nearest-rank p50/p95 and max over the samples; all zero when empty.
pub fn summarize(samples: &[u64]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let sum: u128 = sorted.iter().map(|&s| u128::from(s)).sum();

    LatencyStats {
        avg_ms: sum as f64 / sorted.len() as f64,
        p50_ms: nearest_rank(&sorted, 50),
        p95_ms: nearest_rank(&sorted, 95),
        max_ms: sorted[sorted.len() - 1],
        samples: sorted.len(),
    }
}

/// `sorted[ceil(p/100 * n) - 1]`, in integer arithmetic.
fn nearest_rank(sorted: &[u64], percent: usize) -> u64 {
    let rank = (percent * sorted.len() + 99) / 100;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
