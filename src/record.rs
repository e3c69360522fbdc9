//! Provider-agnostic record kinds.
//!
//! Each provider decodes its raw transcript lines into this closed set of
//! variants up front; every handler downstream dispatches on the variant tag
//! and never re-inspects the loosely typed JSON.

use crate::models::{SessionRole, TokenSnapshot};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// One transcript line after decoding. A line may carry several records
/// (a Claude Code assistant line holds text, thinking and tool blocks).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLine {
    pub timestamp: Option<DateTime<Utc>>,
    pub records: Vec<LogRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    SessionMeta(SessionMeta),
    TurnContext(TurnContext),
    UserMessage {
        text: String,
    },
    AgentMessage {
        message_id: Option<String>,
        model: Option<String>,
    },
    Reasoning,
    ToolCall(ToolInvocation),
    ToolOutput(ToolResult),
    TokenUsage {
        model: Option<String>,
        report: UsageReport,
    },
    SubagentSpawn {
        agent_type: String,
        description: Option<String>,
    },
    Summary {
        text: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMeta {
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub role: Option<SessionRole>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnContext {
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub effort: Option<String>,
    pub approval_policy: Option<String>,
    pub sandbox_mode: Option<String>,
    pub collaboration_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    /// Decoded arguments object; `{"raw": ...}` when the provider sent non-JSON text.
    pub arguments: Value,
    /// Diff text for patch-style tools.
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
    pub is_error: bool,
    pub status: Option<String>,
    pub text: String,
}

impl ToolResult {
    /// Build a result from an output string that may itself be JSON-encoded
    /// (`{"output": ..., "metadata": {"exit_code": ...}}`).
    pub fn from_output_text(call_id: impl Into<String>, raw: &str) -> Self {
        let mut result = ToolResult {
            call_id: call_id.into(),
            ..ToolResult::default()
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => {
                result.exit_code = map
                    .get("metadata")
                    .and_then(|meta| meta.get("exit_code"))
                    .or_else(|| map.get("exit_code"))
                    .and_then(Value::as_i64);
                result.error = map.get("error").and_then(error_text);
                result.status = map.get("status").and_then(Value::as_str).map(str::to_string);
                result.text = map
                    .get("output")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| raw.to_string());
            }
            _ => result.text = raw.to_string(),
        }

        result
    }
}

/// Normalizes an `error` field: strings and objects count, `null`/`false`/`""` do not.
pub fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// How a provider reports token usage on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageReport {
    /// Running totals, plus optionally the usage of the last request alone.
    Cumulative {
        total: TokenSnapshot,
        last: Option<TokenSnapshot>,
    },
    /// Usage of this record alone; records sharing a dedup key are counted once.
    Incremental {
        usage: TokenSnapshot,
        dedup_key: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_from_json_output() {
        let raw = r#"{"output":"boom","metadata":{"exit_code":2,"duration_seconds":0.1}}"#;
        let result = ToolResult::from_output_text("call_1", raw);
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.text, "boom");
        assert!(result.error.is_none());
    }

    #[test]
    fn test_tool_result_from_plain_text() {
        let result = ToolResult::from_output_text("call_1", "Exit code: 0\nok");
        assert_eq!(result.exit_code, None);
        assert_eq!(result.text, "Exit code: 0\nok");
    }

    #[test]
    fn test_error_text_normalization() {
        assert_eq!(error_text(&json!(null)), None);
        assert_eq!(error_text(&json!(false)), None);
        assert_eq!(error_text(&json!("")), None);
        assert_eq!(error_text(&json!("denied")), Some("denied".to_string()));
        assert_eq!(
            error_text(&json!({"message": "no such file"})),
            Some("no such file".to_string())
        );
    }
}
