//! Core Data Models
//!
//! This module defines the value types produced by one transcript parse. Every
//! entity here is created, populated and frozen inside a single parse call; only
//! the terminal [`SessionStats`] outlives it.
//!
//! ## Data Flow
//!
//! 1. **Token accounting**: [`TokenSnapshot`] - cumulative or delta token counts
//! 2. **Per-key usage**: [`ToolUsageEntry`], [`ModelUsageEntry`], [`SkillEntry`],
//!    [`AgentEntry`], [`FileAccessEntry`]
//! 3. **Output**: [`SessionStats`] - the immutable aggregate handed to the caller
//!
//! ## Features
//!
//! - **Serde Integration**: All public types serialize with camelCase field names
//! - **Deterministic Ordering**: Maps are `BTreeMap` so identical input yields
//!   bit-identical output
//! - **Pricing Transparency**: [`PricingStatus`] flags cost figures that are not
//!   fully backed by the price table instead of silently zeroing them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel model id for usage observed before any model was established.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Transcript format a session was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Codex,
    ClaudeCode,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::ClaudeCode => "claude-code",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts, either a provider's running totals or one record's delta.
///
/// `input_tokens` never includes cache reads or writes; providers that report
/// cached input inside their input count are normalized when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
}

impl TokenSnapshot {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.output_tokens == 0
            && self.reasoning_tokens == 0
            && self.cache_read_tokens == 0
            && self.cache_write_tokens == 0
            && self.total_tokens == 0
    }

    /// Tokens that carry a price: input, output and both cache kinds.
    /// Reasoning is informational only since providers bill it as output.
    pub fn billable(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }

    pub fn accumulate(&mut self, other: &TokenSnapshot) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.cache_write_tokens = self.cache_write_tokens.saturating_add(other.cache_write_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Whether a cost figure is fully, partially or not at all backed by known prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingStatus {
    #[default]
    Priced,
    Mixed,
    Unpriced,
}

impl PricingStatus {
    /// `priced` only if nothing was unpriced, `unpriced` only if everything was.
    pub fn from_counts(priced_tokens: u64, unpriced_tokens: u64) -> Self {
        if unpriced_tokens == 0 {
            PricingStatus::Priced
        } else if priced_tokens == 0 {
            PricingStatus::Unpriced
        } else {
            PricingStatus::Mixed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingStatus::Priced => "priced",
            PricingStatus::Mixed => "mixed",
            PricingStatus::Unpriced => "unpriced",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    Standalone,
    Subagent,
}

/// Semantic bucket for a file path touched by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Knowledge,
    Instruction,
    Agent,
    Config,
    Code,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsageEntry {
    pub name: String,
    pub count: u32,
    pub error_count: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub cost: f64,
}

impl ToolUsageEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsageEntry {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub reasoning_tokens: u64,
    pub message_count: u32,
    pub cost: f64,
    pub pricing_status: PricingStatus,
    pub priced_tokens: u64,
    pub unpriced_tokens: u64,
}

impl ModelUsageEntry {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }

    pub fn has_usage(&self) -> bool {
        self.total_tokens() > 0 || self.reasoning_tokens > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEntry {
    pub name: String,
    pub description: Option<String>,
    pub count: u32,
}

/// One sub-agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEntry {
    pub agent_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccessEntry {
    pub path: String,
    pub count: u32,
    pub category: FileCategory,
}

/// Tool activity broken down by kind, plus the files the tools touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedToolData {
    pub skills: Vec<SkillEntry>,
    pub agents: Vec<AgentEntry>,
    pub agent_types: BTreeMap<String, u32>,
    pub mcp_tools: BTreeMap<String, u32>,
    pub core_tools: BTreeMap<String, u32>,
    pub other_tools: BTreeMap<String, u32>,
    pub files_read: Vec<FileAccessEntry>,
    pub files_written: Vec<FileAccessEntry>,
    pub searches: Vec<FileAccessEntry>,
}

/// Turn latency summary in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
    pub samples: usize,
}

/// Terminal aggregate of one transcript parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub provider: Option<Provider>,
    pub role: SessionRole,

    pub message_count: u32,
    pub user_message_count: u32,
    pub agent_message_count: u32,
    pub tool_call_count: u32,
    pub thinking_block_count: u32,

    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub reasoning_tokens: u64,

    pub total_cost: f64,
    pub pricing_status: PricingStatus,
    pub unpriced_tokens: u64,

    pub tool_usage: BTreeMap<String, ToolUsageEntry>,
    pub model_usage: BTreeMap<String, ModelUsageEntry>,
    pub tools: EnrichedToolData,

    pub tags: Vec<String>,
    pub latency: LatencyStats,
    pub duration_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    pub effort_mode: Option<String>,
    pub approval_policy: Option<String>,
    pub sandbox_mode: Option<String>,
    pub collaboration_mode: Option<String>,

    pub first_message: Option<String>,
    pub summary: Option<String>,
    pub project_path: Option<String>,
    pub git_branch: Option<String>,
}

impl SessionStats {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_read_tokens)
            .saturating_add(self.cache_write_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_status_from_counts() {
        assert_eq!(PricingStatus::from_counts(0, 0), PricingStatus::Priced);
        assert_eq!(PricingStatus::from_counts(10, 0), PricingStatus::Priced);
        assert_eq!(PricingStatus::from_counts(0, 10), PricingStatus::Unpriced);
        assert_eq!(PricingStatus::from_counts(5, 10), PricingStatus::Mixed);
    }

    #[test]
    fn test_billable_excludes_reasoning() {
        let snapshot = TokenSnapshot {
            input_tokens: 10,
            output_tokens: 5,
            reasoning_tokens: 3,
            cache_read_tokens: 2,
            cache_write_tokens: 1,
            total_tokens: 18,
        };
        assert_eq!(snapshot.billable(), 18);
    }

    #[test]
    fn test_session_stats_serializes_camel_case() {
        let stats = SessionStats::default();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["pricingStatus"], "priced");
        assert_eq!(json["role"], "standalone");
        assert!(json.get("toolCallCount").is_some());
    }
}
