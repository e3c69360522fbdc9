//! Provider transcript formats.
//!
//! A provider contributes only extraction: how to recognise its lines, how to
//! decode them into [`LogRecord`]s and which tool names mean what. Reconciliation,
//! correlation, pricing and latency are shared and live outside this module.

pub mod claude;
pub mod codex;

use crate::error::EngineError;
use crate::models::Provider;
use crate::record::LogRecord;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

pub use claude::ClaudeCodeFormat;
pub use codex::CodexFormat;

/// Extraction functions for one provider's transcript format.
pub trait TranscriptFormat: Send + Sync {
    fn provider(&self) -> Provider;

    /// Cheap structural check used for auto-detection.
    fn recognizes(&self, line: &Value) -> bool;

    /// Decode one line. Unknown kinds decode to an empty list; a known kind
    /// with missing required fields is an error and the line is skipped.
    fn decode(&self, line: &Value) -> Result<Vec<LogRecord>, serde_json::Error>;

    fn tool_rules(&self) -> &'static ToolRules;

    /// Default heuristic for exit-code language in tool output. Capture group 1
    /// must hold the numeric code.
    fn exit_code_pattern(&self) -> &'static str;
}

/// Static tool-name tables for a provider.
#[derive(Debug)]
pub struct ToolRules {
    pub core_tools: &'static [&'static str],
    pub read_tools: &'static [&'static str],
    pub write_tools: &'static [&'static str],
    pub search_tools: &'static [&'static str],
    pub patch_tools: &'static [&'static str],
    pub skill_tools: &'static [&'static str],
    pub agent_tools: &'static [&'static str],
    pub mcp_prefix: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Skill,
    Agent,
    Mcp,
    Core,
    Other,
}

/// Runtime tool rules: the static tables plus configured overrides.
#[derive(Debug, Clone)]
pub struct ProviderRules {
    tables: &'static ToolRules,
    core_tools: BTreeSet<String>,
    exit_code: Regex,
}

impl ProviderRules {
    pub fn for_format(format: &dyn TranscriptFormat) -> Result<Self, EngineError> {
        Self::with_overrides(format, None, None)
    }

    pub fn with_overrides(
        format: &dyn TranscriptFormat,
        core_tools: Option<&[String]>,
        exit_code_pattern: Option<&str>,
    ) -> Result<Self, EngineError> {
        let tables = format.tool_rules();
        let core_tools = match core_tools {
            Some(names) => names.iter().cloned().collect(),
            None => tables.core_tools.iter().map(|s| s.to_string()).collect(),
        };
        let pattern = exit_code_pattern.unwrap_or_else(|| format.exit_code_pattern());
        let exit_code = Regex::new(pattern).map_err(|source| EngineError::Pattern {
            provider: format.provider().to_string(),
            source,
        })?;

        Ok(Self {
            tables,
            core_tools,
            exit_code,
        })
    }

    pub fn classify(&self, tool: &str) -> ToolKind {
        if self.tables.skill_tools.contains(&tool) {
            ToolKind::Skill
        } else if self.tables.agent_tools.contains(&tool) {
            ToolKind::Agent
        } else if tool.starts_with(self.tables.mcp_prefix) {
            ToolKind::Mcp
        } else if self.core_tools.contains(tool) {
            ToolKind::Core
        } else {
            ToolKind::Other
        }
    }

    pub fn is_read(&self, tool: &str) -> bool {
        self.tables.read_tools.contains(&tool)
    }

    pub fn is_write(&self, tool: &str) -> bool {
        self.tables.write_tools.contains(&tool)
    }

    pub fn is_search(&self, tool: &str) -> bool {
        self.tables.search_tools.contains(&tool)
    }

    pub fn exit_code_pattern(&self) -> &Regex {
        &self.exit_code
    }
}

pub static CODEX: CodexFormat = CodexFormat;
pub static CLAUDE_CODE: ClaudeCodeFormat = ClaudeCodeFormat;

pub fn all_formats() -> [&'static dyn TranscriptFormat; 2] {
    [&CODEX, &CLAUDE_CODE]
}

pub fn format_for(provider: Provider) -> &'static dyn TranscriptFormat {
    match provider {
        Provider::Codex => &CODEX,
        Provider::ClaudeCode => &CLAUDE_CODE,
    }
}

/// First format that recognises this line, if any.
pub fn detect(line: &Value) -> Option<&'static dyn TranscriptFormat> {
    all_formats().into_iter().find(|format| format.recognizes(line))
}

/// Decode a JSON-encoded arguments string, keeping non-JSON text as `{"raw": ...}`.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
