//! Token reconciliation.
//!
//! Codex reports running totals, Claude Code reports per-message usage that is
//! repeated across lines. Both are turned into per-record deltas here so the
//! aggregator only ever sums.

use crate::models::TokenSnapshot;
use crate::record::UsageReport;
use std::collections::HashSet;
use tracing::debug;

/// Converts usage reports into deltas, one parse at a time.
#[derive(Debug, Default)]
pub struct TokenReconciler {
    previous: TokenSnapshot,
    seen_keys: HashSet<String>,
    resets: usize,
    duplicates: usize,
}

impl TokenReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta contributed by `report`, or `None` when it adds nothing.
    pub fn reconcile(&mut self, report: &UsageReport) -> Option<TokenSnapshot> {
        let delta = match report {
            UsageReport::Cumulative { total, last } => self.reconcile_cumulative(total, last.as_ref()),
            UsageReport::Incremental { usage, dedup_key } => {
                if let Some(key) = dedup_key {
                    if !self.seen_keys.insert(key.clone()) {
                        self.duplicates += 1;
                        debug!(key = %key, "Dropping duplicate usage record");
                        return None;
                    }
                }
                *usage
            }
        };

        (!delta.is_zero()).then_some(delta)
    }

    fn reconcile_cumulative(
        &mut self,
        current: &TokenSnapshot,
        last: Option<&TokenSnapshot>,
    ) -> TokenSnapshot {
        let prev = self.previous;
        let raw = RawDelta {
            input: signed_diff(current.input_tokens, prev.input_tokens),
            output: signed_diff(current.output_tokens, prev.output_tokens),
            reasoning: signed_diff(current.reasoning_tokens, prev.reasoning_tokens),
            cache_read: signed_diff(current.cache_read_tokens, prev.cache_read_tokens),
            cache_write: signed_diff(current.cache_write_tokens, prev.cache_write_tokens),
            total: signed_diff(current.total_tokens, prev.total_tokens),
        };

        // The stored baseline is always what the provider reported, so the
        // next delta is measured from the post-reset counter.
        self.previous = *current;

        if raw.any_negative() {
            self.resets += 1;
            debug!(
                previous_total = prev.total_tokens,
                current_total = current.total_tokens,
                "Cumulative token counter went backwards"
            );
            if let Some(last) = last.filter(|last| !last.is_zero()) {
                return *last;
            }
        }

        let mut delta = raw.clamped();
        let output_from_total = delta
            .total_tokens
            .saturating_sub(delta.input_tokens)
            .saturating_sub(delta.cache_read_tokens)
            .saturating_sub(delta.cache_write_tokens);
        delta.output_tokens = delta.output_tokens.max(output_from_total);
        delta
    }

    /// Cumulative reports that went backwards.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Incremental reports dropped because their key was already counted.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

struct RawDelta {
    input: i128,
    output: i128,
    reasoning: i128,
    cache_read: i128,
    cache_write: i128,
    total: i128,
}

impl RawDelta {
    fn any_negative(&self) -> bool {
        [
            self.input,
            self.output,
            self.reasoning,
            self.cache_read,
            self.cache_write,
            self.total,
        ]
        .iter()
        .any(|d| *d < 0)
    }

    fn clamped(&self) -> TokenSnapshot {
        TokenSnapshot {
            input_tokens: clamp(self.input),
            output_tokens: clamp(self.output),
            reasoning_tokens: clamp(self.reasoning),
            cache_read_tokens: clamp(self.cache_read),
            cache_write_tokens: clamp(self.cache_write),
            total_tokens: clamp(self.total),
        }
    }
}

fn signed_diff(current: u64, previous: u64) -> i128 {
    i128::from(current) - i128::from(previous)
}

fn clamp(value: i128) -> u64 {
    u64::try_from(value.max(0)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(total: u64) -> TokenSnapshot {
        TokenSnapshot {
            input_tokens: total / 2,
            output_tokens: total - total / 2,
            total_tokens: total,
            ..TokenSnapshot::default()
        }
    }

    fn cumulative(total: TokenSnapshot, last: Option<TokenSnapshot>) -> UsageReport {
        UsageReport::Cumulative { total, last }
    }

    #[test]
    fn test_deltas_sum_to_final_cumulative() {
        let mut reconciler = TokenReconciler::new();
        let mut sum = TokenSnapshot::default();
        for total in [100, 150, 400] {
            if let Some(delta) = reconciler.reconcile(&cumulative(totals(total), None)) {
                sum.accumulate(&delta);
            }
        }
        assert_eq!(sum, totals(400));
        assert_eq!(reconciler.resets(), 0);
    }

    #[test]
    fn test_reset_uses_last_usage() {
        let mut reconciler = TokenReconciler::new();
        let deltas: Vec<u64> = [
            cumulative(totals(100), None),
            cumulative(totals(150), None),
            cumulative(totals(40), Some(totals(40))),
        ]
        .iter()
        .map(|report| reconciler.reconcile(report).unwrap().total_tokens)
        .collect();

        assert_eq!(deltas, vec![100, 50, 40]);
        assert_eq!(reconciler.resets(), 1);
    }

    #[test]
    fn test_reset_returns_last_request_not_new_total() {
        let fallback = TokenSnapshot {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
            ..TokenSnapshot::default()
        };
        let mut reconciler = TokenReconciler::new();
        reconciler.reconcile(&cumulative(totals(100), None));
        reconciler.reconcile(&cumulative(totals(150), None));

        let delta = reconciler.reconcile(&cumulative(totals(40), Some(fallback)));
        assert_eq!(delta, Some(fallback));
        assert_eq!(reconciler.resets(), 1);

        // Measured from the reported 40, not from 40 + fallback.
        let next = reconciler.reconcile(&cumulative(totals(60), None)).unwrap();
        assert_eq!(next, TokenSnapshot { input_tokens: 10, output_tokens: 10, total_tokens: 20, ..TokenSnapshot::default() });
    }

    #[test]
    fn test_reset_without_fallback_clamps_to_zero() {
        let mut reconciler = TokenReconciler::new();
        reconciler.reconcile(&cumulative(totals(150), None));
        assert_eq!(reconciler.reconcile(&cumulative(totals(40), None)), None);

        // The baseline moved to the reported value.
        let next = reconciler.reconcile(&cumulative(totals(60), None)).unwrap();
        assert_eq!(next.total_tokens, 20);
    }

    #[test]
    fn test_zero_fallback_is_ignored() {
        let mut reconciler = TokenReconciler::new();
        reconciler.reconcile(&cumulative(totals(150), None));
        let delta = reconciler.reconcile(&cumulative(totals(40), Some(TokenSnapshot::default())));
        assert_eq!(delta, None);
    }

    #[test]
    fn test_output_recovered_from_total() {
        let mut reconciler = TokenReconciler::new();
        let report = cumulative(
            TokenSnapshot {
                input_tokens: 100,
                output_tokens: 0,
                cache_read_tokens: 20,
                total_tokens: 150,
                ..TokenSnapshot::default()
            },
            None,
        );
        let delta = reconciler.reconcile(&report).unwrap();
        assert_eq!(delta.output_tokens, 30);
        assert_eq!(delta.input_tokens, 100);
    }

    #[test]
    fn test_repeated_cumulative_adds_nothing() {
        let mut reconciler = TokenReconciler::new();
        reconciler.reconcile(&cumulative(totals(100), None));
        assert_eq!(reconciler.reconcile(&cumulative(totals(100), None)), None);
    }

    #[test]
    fn test_incremental_dedup() {
        let mut reconciler = TokenReconciler::new();
        let report = UsageReport::Incremental {
            usage: totals(10),
            dedup_key: Some("msg_1:req_1".to_string()),
        };
        assert!(reconciler.reconcile(&report).is_some());
        assert!(reconciler.reconcile(&report).is_none());
        assert_eq!(reconciler.duplicates(), 1);

        let unkeyed = UsageReport::Incremental {
            usage: totals(10),
            dedup_key: None,
        };
        assert!(reconciler.reconcile(&unkeyed).is_some());
        assert!(reconciler.reconcile(&unkeyed).is_some());
    }
}
