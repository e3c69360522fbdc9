//! Per-parse aggregation.
//!
//! [`SessionAggregator`] owns every piece of mutable state for one transcript
//! pass. Records are applied in file order; [`SessionAggregator::finish`]
//! consumes the aggregator and returns the frozen [`SessionStats`].

use crate::categorize::session_tags;
use crate::config::EngineConfig;
use crate::correlate::{ToolActivity, ToolCallCorrelator};
use crate::latency::LatencyTracker;
use crate::models::{
    ModelUsageEntry, PricingStatus, Provider, SessionStats, TokenSnapshot, ToolUsageEntry, UNKNOWN_MODEL,
};
use crate::reconcile::TokenReconciler;
use crate::record::{DecodedLine, LogRecord, SessionMeta, TurnContext};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const FIRST_MESSAGE_CHARS: usize = 200;

pub struct SessionAggregator<'a> {
    config: &'a EngineConfig,
    provider: Option<Provider>,
    reconciler: TokenReconciler,
    correlator: Option<ToolCallCorrelator>,
    latency: LatencyTracker,

    current_model: Option<String>,
    first_model: Option<String>,
    model_usage: BTreeMap<String, ModelUsageEntry>,
    model_messages: BTreeMap<String, u32>,
    pending_usage: TokenSnapshot,
    pending_messages: u32,
    seen_messages: HashSet<String>,

    stats: SessionStats,
}

impl<'a> SessionAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            provider: None,
            reconciler: TokenReconciler::new(),
            correlator: None,
            latency: LatencyTracker::new(),
            current_model: None,
            first_model: None,
            model_usage: BTreeMap::new(),
            model_messages: BTreeMap::new(),
            pending_usage: TokenSnapshot::default(),
            pending_messages: 0,
            seen_messages: HashSet::new(),
            stats: SessionStats::default(),
        }
    }

    /// Fixes the transcript format; tool records are ignored until this is called.
    pub fn set_provider(&mut self, provider: Provider) {
        if self.provider.is_none() {
            self.provider = Some(provider);
            self.correlator = Some(ToolCallCorrelator::new(self.config.rules(provider).clone()));
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }

    /// Timestamps count toward duration even when the line carried no records.
    pub fn apply_line(&mut self, line: &DecodedLine) {
        if let Some(timestamp) = line.timestamp {
            self.latency.observe(timestamp);
        }
        for record in &line.records {
            self.apply(record, line.timestamp);
        }
    }

    pub fn apply(&mut self, record: &LogRecord, timestamp: Option<DateTime<Utc>>) {
        match record {
            LogRecord::SessionMeta(meta) => self.session_meta(meta),
            LogRecord::TurnContext(ctx) => self.turn_context(ctx),
            LogRecord::UserMessage { text } => {
                self.stats.user_message_count += 1;
                if self.stats.first_message.is_none() {
                    let text = text.trim();
                    if !text.is_empty() {
                        self.stats.first_message = Some(text.chars().take(FIRST_MESSAGE_CHARS).collect());
                    }
                }
                self.latency.user_message(timestamp);
            }
            LogRecord::AgentMessage { message_id, model } => {
                if let Some(id) = message_id {
                    if !self.seen_messages.insert(id.clone()) {
                        return;
                    }
                }
                if let Some(model) = model {
                    self.set_model(model);
                }
                self.stats.agent_message_count += 1;
                match &self.current_model {
                    Some(model) => *self.model_messages.entry(model.clone()).or_insert(0) += 1,
                    None => self.pending_messages += 1,
                }
                self.latency.agent_message(timestamp);
            }
            LogRecord::Reasoning => self.stats.thinking_block_count += 1,
            LogRecord::ToolCall(call) => {
                if let Some(correlator) = self.correlator.as_mut() {
                    correlator.record_call(call);
                }
            }
            LogRecord::ToolOutput(result) => {
                if let Some(correlator) = self.correlator.as_mut() {
                    correlator.record_output(result);
                }
            }
            LogRecord::TokenUsage { model, report } => {
                if let Some(model) = model {
                    self.set_model(model);
                }
                if let Some(delta) = self.reconciler.reconcile(report) {
                    match self.current_model.clone() {
                        Some(model) => self.add_usage(&model, &delta),
                        None => self.pending_usage.accumulate(&delta),
                    }
                }
            }
            LogRecord::SubagentSpawn {
                agent_type,
                description,
            } => {
                if let Some(correlator) = self.correlator.as_mut() {
                    correlator.record_spawn(agent_type, description.clone());
                }
            }
            LogRecord::Summary { text } => self.stats.summary = Some(text.clone()),
        }
    }

    fn session_meta(&mut self, meta: &SessionMeta) {
        overwrite(&mut self.stats.project_path, &meta.cwd);
        overwrite(&mut self.stats.git_branch, &meta.git_branch);
        if let Some(role) = meta.role {
            self.stats.role = role;
        }
        if let Some(model) = &meta.model {
            self.set_model(model);
        }
    }

    fn turn_context(&mut self, ctx: &TurnContext) {
        overwrite(&mut self.stats.project_path, &ctx.cwd);
        overwrite(&mut self.stats.effort_mode, &ctx.effort);
        overwrite(&mut self.stats.approval_policy, &ctx.approval_policy);
        overwrite(&mut self.stats.sandbox_mode, &ctx.sandbox_mode);
        overwrite(&mut self.stats.collaboration_mode, &ctx.collaboration_mode);
        if let Some(model) = &ctx.model {
            self.set_model(model);
        }
    }

    fn set_model(&mut self, model: &str) {
        if self.current_model.as_deref() != Some(model) {
            self.current_model = Some(model.to_string());
        }
        if self.first_model.is_none() {
            self.first_model = Some(model.to_string());
        }
    }

    fn add_usage(&mut self, model: &str, delta: &TokenSnapshot) {
        let priced = self.config.pricing.calculate(model, delta);
        let entry = self
            .model_usage
            .entry(model.to_string())
            .or_insert_with(|| ModelUsageEntry::new(model));

        entry.input_tokens = entry.input_tokens.saturating_add(delta.input_tokens);
        entry.output_tokens = entry.output_tokens.saturating_add(delta.output_tokens);
        entry.cache_read_tokens = entry.cache_read_tokens.saturating_add(delta.cache_read_tokens);
        entry.cache_write_tokens = entry.cache_write_tokens.saturating_add(delta.cache_write_tokens);
        entry.reasoning_tokens = entry.reasoning_tokens.saturating_add(delta.reasoning_tokens);
        entry.cost += priced.cost;
        entry.priced_tokens = entry.priced_tokens.saturating_add(priced.priced_tokens);
        entry.unpriced_tokens = entry.unpriced_tokens.saturating_add(priced.unpriced_tokens);
    }

    pub fn finish(mut self) -> SessionStats {
        let fallback_model = self
            .first_model
            .clone()
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string());
        if !self.pending_usage.is_zero() {
            debug!(model = %fallback_model, "Attributing usage seen before any model");
            let pending = self.pending_usage;
            self.add_usage(&fallback_model, &pending);
        }
        if self.pending_messages > 0 {
            *self.model_messages.entry(fallback_model).or_insert(0) += self.pending_messages;
        }

        let mut model_usage = self.model_usage;
        for (model, count) in &self.model_messages {
            model_usage
                .entry(model.clone())
                .or_insert_with(|| ModelUsageEntry::new(model.as_str()))
                .message_count = *count;
        }

        let mut stats = self.stats;
        let mut totals = TokenSnapshot::default();
        let mut priced_tokens = 0u64;
        for entry in model_usage.values_mut() {
            if entry.message_count == 0 && entry.has_usage() {
                entry.message_count = 1;
            }
            entry.pricing_status = PricingStatus::from_counts(entry.priced_tokens, entry.unpriced_tokens);

            totals.input_tokens = totals.input_tokens.saturating_add(entry.input_tokens);
            totals.output_tokens = totals.output_tokens.saturating_add(entry.output_tokens);
            totals.cache_read_tokens = totals.cache_read_tokens.saturating_add(entry.cache_read_tokens);
            totals.cache_write_tokens = totals.cache_write_tokens.saturating_add(entry.cache_write_tokens);
            totals.reasoning_tokens = totals.reasoning_tokens.saturating_add(entry.reasoning_tokens);
            stats.total_cost += entry.cost;
            priced_tokens = priced_tokens.saturating_add(entry.priced_tokens);
            stats.unpriced_tokens = stats.unpriced_tokens.saturating_add(entry.unpriced_tokens);
        }

        stats.input_tokens = totals.input_tokens;
        stats.output_tokens = totals.output_tokens;
        stats.cache_read_tokens = totals.cache_read_tokens;
        stats.cache_write_tokens = totals.cache_write_tokens;
        stats.reasoning_tokens = totals.reasoning_tokens;
        stats.pricing_status = PricingStatus::from_counts(priced_tokens, stats.unpriced_tokens);
        stats.model_usage = model_usage;

        let ToolActivity {
            tool_call_count,
            mut tool_usage,
            tools,
        } = self.correlator.map(ToolCallCorrelator::finish).unwrap_or_default();
        backfill(&mut tool_usage, &totals, stats.total_cost);
        stats.tool_call_count = tool_call_count;
        stats.tool_usage = tool_usage;
        stats.tools = tools;

        stats.provider = self.provider;
        stats.message_count = stats.user_message_count.saturating_add(stats.agent_message_count);
        stats.latency = self.latency.stats();
        stats.duration_ms = self.latency.duration_ms();
        stats.started_at = self.latency.started_at();
        stats.ended_at = self.latency.ended_at();
        stats.tags = session_tags(&stats, self.config.tag_value_len);

        if self.reconciler.resets() > 0 || self.reconciler.duplicates() > 0 {
            debug!(
                resets = self.reconciler.resets(),
                duplicates = self.reconciler.duplicates(),
                "Token reconciliation adjustments"
            );
        }

        stats
    }
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

/// Distributes session tokens and cost over tools by their share of calls.
pub fn backfill(tool_usage: &mut BTreeMap<String, ToolUsageEntry>, totals: &TokenSnapshot, cost: f64) {
    let total_calls: u64 = tool_usage.values().map(|entry| u64::from(entry.count)).sum();
    if total_calls == 0 {
        return;
    }

    for entry in tool_usage.values_mut() {
        let count = u64::from(entry.count);
        entry.input_tokens = proportional(totals.input_tokens, count, total_calls);
        entry.output_tokens = proportional(totals.output_tokens, count, total_calls);
        entry.cache_read_tokens = proportional(totals.cache_read_tokens, count, total_calls);
        entry.cache_write_tokens = proportional(totals.cache_write_tokens, count, total_calls);
        entry.cost = cost * count as f64 / total_calls as f64;
    }
}

/// `round(total * count / total_count)`, half away from zero.
fn proportional(total: u64, count: u64, total_count: u64) -> u64 {
    let numerator = 2 * u128::from(total) * u128::from(count) + u128::from(total_count);
    let value = numerator / (2 * u128::from(total_count));
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionRole;
    use crate::pricing::PricingTable;
    use crate::record::{ToolInvocation, ToolResult, UsageReport};
    use serde_json::json;

    fn engine() -> EngineConfig {
        let pricing = PricingTable::from_toml_str(
            r#"
            [models."model-a"]
            input = 1.0
            output = 2.0

            [models."half-priced"]
            input = 1.0
            "#,
        )
        .unwrap();
        EngineConfig::builtin().unwrap().with_pricing(pricing)
    }

    fn usage(input: u64, output: u64) -> LogRecord {
        LogRecord::TokenUsage {
            model: None,
            report: UsageReport::Incremental {
                usage: TokenSnapshot {
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: input + output,
                    ..TokenSnapshot::default()
                },
                dedup_key: None,
            },
        }
    }

    fn context(model: &str) -> LogRecord {
        LogRecord::TurnContext(TurnContext {
            model: Some(model.to_string()),
            ..TurnContext::default()
        })
    }

    fn agent() -> LogRecord {
        LogRecord::AgentMessage {
            message_id: None,
            model: None,
        }
    }

    #[test]
    fn test_huge_usage_saturates() {
        let config = engine();
        let mut aggregator = SessionAggregator::new(&config);
        let huge = LogRecord::TokenUsage {
            model: Some("model-a".to_string()),
            report: UsageReport::Incremental {
                usage: TokenSnapshot {
                    input_tokens: u64::MAX / 2 + 10,
                    cache_read_tokens: u64::MAX / 2 + 10,
                    ..TokenSnapshot::default()
                },
                dedup_key: None,
            },
        };
        aggregator.apply(&huge, None);
        aggregator.apply(&huge, None);
        aggregator.apply(&context("half-priced"), None);
        aggregator.apply(&huge, None);

        let stats = aggregator.finish();
        assert_eq!(stats.model_usage["model-a"].input_tokens, u64::MAX);
        assert_eq!(stats.model_usage["model-a"].total_tokens(), u64::MAX);
        assert_eq!(stats.input_tokens, u64::MAX);
        assert_eq!(stats.total_tokens(), u64::MAX);
    }

    #[test]
    fn test_empty_session() {
        let config = engine();
        let stats = SessionAggregator::new(&config).finish();
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.total_cost, 0.0);
        assert_eq!(stats.pricing_status, PricingStatus::Priced);
        assert!(stats.tags.is_empty());
        assert_eq!(stats.role, SessionRole::Standalone);
    }

    #[test]
    fn test_usage_before_model_goes_to_first_model() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        agg.set_provider(Provider::Codex);
        agg.apply(&usage(1_000_000, 0), None);
        agg.apply(&agent(), None);
        agg.apply(&context("model-a"), None);
        agg.apply(&usage(0, 1_000_000), None);

        let stats = agg.finish();
        let entry = &stats.model_usage["model-a"];
        assert_eq!(entry.input_tokens, 1_000_000);
        assert_eq!(entry.output_tokens, 1_000_000);
        assert_eq!(entry.message_count, 1);
        assert!((stats.total_cost - 3.0).abs() < 1e-9);
        assert_eq!(stats.model_usage.len(), 1);
    }

    #[test]
    fn test_usage_without_any_model_is_unknown() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        agg.apply(&usage(10, 5), None);
        let stats = agg.finish();
        let entry = &stats.model_usage[UNKNOWN_MODEL];
        assert_eq!(entry.pricing_status, PricingStatus::Unpriced);
        assert_eq!(entry.message_count, 1);
        assert_eq!(stats.pricing_status, PricingStatus::Unpriced);
        assert_eq!(stats.unpriced_tokens, 15);
    }

    #[test]
    fn test_mixed_pricing_across_models() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        agg.apply(&context("model-a"), None);
        agg.apply(&usage(100, 100), None);
        agg.apply(&context("half-priced"), None);
        agg.apply(&usage(100, 100), None);

        let stats = agg.finish();
        assert_eq!(stats.model_usage["model-a"].pricing_status, PricingStatus::Priced);
        assert_eq!(stats.model_usage["half-priced"].pricing_status, PricingStatus::Mixed);
        assert_eq!(stats.pricing_status, PricingStatus::Mixed);
        assert_eq!(stats.unpriced_tokens, 100);
    }

    #[test]
    fn test_duplicate_agent_messages_count_once() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        let message = LogRecord::AgentMessage {
            message_id: Some("msg_1".to_string()),
            model: Some("model-a".to_string()),
        };
        agg.apply(&LogRecord::UserMessage { text: "hi".to_string() }, None);
        agg.apply(&message, None);
        agg.apply(&message, None);
        let stats = agg.finish();
        assert_eq!(stats.agent_message_count, 1);
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.model_usage["model-a"].message_count, 1);
    }

    #[test]
    fn test_settings_last_write_wins_and_tags() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        agg.set_provider(Provider::Codex);
        agg.apply(
            &LogRecord::TurnContext(TurnContext {
                approval_policy: Some("on-request".to_string()),
                sandbox_mode: Some("read-only".to_string()),
                ..TurnContext::default()
            }),
            None,
        );
        agg.apply(
            &LogRecord::TurnContext(TurnContext {
                sandbox_mode: Some("workspace-write".to_string()),
                effort: Some("medium".to_string()),
                ..TurnContext::default()
            }),
            None,
        );
        agg.apply(
            &LogRecord::SubagentSpawn {
                agent_type: "review".to_string(),
                description: None,
            },
            None,
        );

        let stats = agg.finish();
        assert_eq!(stats.sandbox_mode.as_deref(), Some("workspace-write"));
        assert_eq!(stats.approval_policy.as_deref(), Some("on-request"));
        assert_eq!(
            stats.tags,
            vec!["approval:on-request", "effort:medium", "sandbox:workspace-write", "spawns:review"]
        );
    }

    #[test]
    fn test_first_message_truncated_on_char_boundary() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        let long = "é".repeat(300);
        agg.apply(&LogRecord::UserMessage { text: long }, None);
        agg.apply(&LogRecord::UserMessage { text: "second".to_string() }, None);
        let stats = agg.finish();
        assert_eq!(stats.first_message.unwrap().chars().count(), 200);
    }

    #[test]
    fn test_tool_backfill_splits_cost_by_calls() {
        let config = engine();
        let mut agg = SessionAggregator::new(&config);
        agg.set_provider(Provider::Codex);
        agg.apply(&context("model-a"), None);
        for id in ["c1", "c2", "c3"] {
            agg.apply(
                &LogRecord::ToolCall(ToolInvocation {
                    call_id: id.to_string(),
                    name: "shell".to_string(),
                    arguments: json!({}),
                    patch: None,
                }),
                None,
            );
        }
        agg.apply(
            &LogRecord::ToolCall(ToolInvocation {
                call_id: "c4".to_string(),
                name: "read_file".to_string(),
                arguments: json!({"file_path": "src/lib.rs"}),
                patch: None,
            }),
            None,
        );
        agg.apply(
            &LogRecord::ToolOutput(ToolResult {
                call_id: "c2".to_string(),
                exit_code: Some(1),
                ..ToolResult::default()
            }),
            None,
        );
        // $2 input + $2 output
        agg.apply(&usage(2_000_000, 1_000_000), None);

        let stats = agg.finish();
        let shell = &stats.tool_usage["shell"];
        let read = &stats.tool_usage["read_file"];
        assert!((stats.total_cost - 4.0).abs() < 1e-9);
        assert!((shell.cost - 3.0).abs() < 1e-9);
        assert!((read.cost - 1.0).abs() < 1e-9);
        assert_eq!(shell.input_tokens, 1_500_000);
        assert_eq!(read.output_tokens, 250_000);
        assert_eq!(shell.error_count, 1);
        assert_eq!(stats.tool_call_count, 4);
    }

    #[test]
    fn test_proportional_rounding() {
        assert_eq!(proportional(10, 1, 3), 3);
        assert_eq!(proportional(10, 2, 3), 7);
        assert_eq!(proportional(5, 1, 2), 3);
        assert_eq!(proportional(u64::MAX, 1, 1), u64::MAX);
    }
}
