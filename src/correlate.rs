//! Tool-call correlation.
//!
//! Calls and their outputs arrive as separate records linked by a call id.
//! The correlator counts calls as they are made, resolves outputs back to the
//! originating tool to attribute errors, and collects the side effects a call
//! implies (skills used, sub-agents spawned, files read or written).

use crate::categorize::{categorize_path, patch_paths};
use crate::models::{AgentEntry, EnrichedToolData, FileAccessEntry, SkillEntry, ToolUsageEntry};
use crate::providers::{ProviderRules, ToolKind};
use crate::record::{ToolInvocation, ToolResult};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const PATH_ARGUMENTS: &[&str] = &["file_path", "path", "target", "dir_path", "cwd", "notebook_path"];

const FAILURE_STATUSES: &[&str] = &[
    "failed",
    "failure",
    "error",
    "errored",
    "timeout",
    "timed_out",
    "cancelled",
    "canceled",
    "denied",
    "rejected",
];

/// Everything the correlator learned, ready to be folded into `SessionStats`.
#[derive(Debug, Default)]
pub struct ToolActivity {
    pub tool_call_count: u32,
    pub tool_usage: BTreeMap<String, ToolUsageEntry>,
    pub tools: EnrichedToolData,
}

#[derive(Debug)]
pub struct ToolCallCorrelator {
    rules: ProviderRules,
    pending: HashMap<String, String>,
    tool_call_count: u32,
    tool_usage: BTreeMap<String, ToolUsageEntry>,
    skills: BTreeMap<String, SkillEntry>,
    agents: Vec<AgentEntry>,
    agent_types: BTreeMap<String, u32>,
    mcp_tools: BTreeMap<String, u32>,
    core_tools: BTreeMap<String, u32>,
    other_tools: BTreeMap<String, u32>,
    files_read: BTreeMap<String, u32>,
    files_written: BTreeMap<String, u32>,
    searches: BTreeMap<String, u32>,
}

impl ToolCallCorrelator {
    pub fn new(rules: ProviderRules) -> Self {
        Self {
            rules,
            pending: HashMap::new(),
            tool_call_count: 0,
            tool_usage: BTreeMap::new(),
            skills: BTreeMap::new(),
            agents: Vec::new(),
            agent_types: BTreeMap::new(),
            mcp_tools: BTreeMap::new(),
            core_tools: BTreeMap::new(),
            other_tools: BTreeMap::new(),
            files_read: BTreeMap::new(),
            files_written: BTreeMap::new(),
            searches: BTreeMap::new(),
        }
    }

    pub fn record_call(&mut self, call: &ToolInvocation) {
        let name = call.name.as_str();
        self.tool_call_count += 1;
        self.tool_usage
            .entry(name.to_string())
            .or_insert_with(|| ToolUsageEntry::new(name))
            .count += 1;

        match self.rules.classify(name) {
            ToolKind::Skill => {
                let skill = string_arg(&call.arguments, &["skill", "command", "name"])
                    .unwrap_or_else(|| name.to_string());
                let entry = self.skills.entry(skill.clone()).or_insert_with(|| SkillEntry {
                    name: skill,
                    description: None,
                    count: 0,
                });
                entry.count += 1;
                if entry.description.is_none() {
                    entry.description = string_arg(&call.arguments, &["description"]);
                }
            }
            ToolKind::Agent => {
                let agent_type = string_arg(&call.arguments, &["subagent_type", "agent_type"])
                    .unwrap_or_else(|| "unknown".to_string());
                let description = string_arg(&call.arguments, &["description"]);
                self.record_spawn(&agent_type, description);
            }
            ToolKind::Mcp => *self.mcp_tools.entry(name.to_string()).or_insert(0) += 1,
            ToolKind::Core => *self.core_tools.entry(name.to_string()).or_insert(0) += 1,
            ToolKind::Other => *self.other_tools.entry(name.to_string()).or_insert(0) += 1,
        }

        if let Some(path) = extract_path(&call.arguments) {
            if self.rules.is_read(name) {
                bump(&mut self.files_read, path);
            } else if self.rules.is_write(name) {
                bump(&mut self.files_written, path);
            } else if self.rules.is_search(name) {
                bump(&mut self.searches, path);
            }
        }

        if let Some(patch) = &call.patch {
            for path in patch_paths(patch) {
                bump(&mut self.files_written, path);
            }
        }

        if !call.call_id.is_empty() {
            self.pending.insert(call.call_id.clone(), call.name.clone());
        }
    }

    /// Resolve an output to its call. Outputs whose call was never seen are ignored.
    pub fn record_output(&mut self, result: &ToolResult) {
        let Some(name) = self.pending.remove(&result.call_id) else {
            debug!(call_id = %result.call_id, "Ignoring tool output without a matching call");
            return;
        };

        if is_error_output(result, self.rules.exit_code_pattern()) {
            if let Some(entry) = self.tool_usage.get_mut(&name) {
                entry.error_count += 1;
            }
        }
    }

    pub fn record_spawn(&mut self, agent_type: &str, description: Option<String>) {
        self.agents.push(AgentEntry {
            agent_type: agent_type.to_string(),
            description,
        });
        *self.agent_types.entry(agent_type.to_string()).or_insert(0) += 1;
    }

    pub fn finish(self) -> ToolActivity {
        if !self.pending.is_empty() {
            debug!(unanswered = self.pending.len(), "Tool calls without output at end of transcript");
        }

        ToolActivity {
            tool_call_count: self.tool_call_count,
            tool_usage: self.tool_usage,
            tools: EnrichedToolData {
                skills: self.skills.into_values().collect(),
                agents: self.agents,
                agent_types: self.agent_types,
                mcp_tools: self.mcp_tools,
                core_tools: self.core_tools,
                other_tools: self.other_tools,
                files_read: file_entries(self.files_read),
                files_written: file_entries(self.files_written),
                searches: file_entries(self.searches),
            },
        }
    }
}

/// Structured signals first, then the provider's text heuristic.
pub fn is_error_output(result: &ToolResult, exit_code_pattern: &Regex) -> bool {
    if matches!(result.exit_code, Some(code) if code != 0) {
        return true;
    }
    if result.error.is_some() || result.is_error {
        return true;
    }
    if let Some(status) = &result.status {
        if FAILURE_STATUSES.contains(&status.trim().to_lowercase().as_str()) {
            return true;
        }
    }
    if result.exit_code.is_some() {
        return false;
    }

    exit_code_pattern
        .captures(&result.text)
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse::<i64>().ok())
        .map_or(false, |code| code != 0)
}

/// First non-empty path-like argument, by priority.
pub fn extract_path(arguments: &Value) -> Option<String> {
    string_arg(arguments, PATH_ARGUMENTS)
}

fn string_arg(arguments: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| arguments.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn bump(counter: &mut BTreeMap<String, u32>, path: String) {
    *counter.entry(path).or_insert(0) += 1;
}

fn file_entries(counter: BTreeMap<String, u32>) -> Vec<FileAccessEntry> {
    counter
        .into_iter()
        .map(|(path, count)| FileAccessEntry {
            category: categorize_path(&path),
            path,
            count,
        })
        .collect()
}
