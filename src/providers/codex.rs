//! Codex CLI rollout transcripts.
//!
//! Lines look like `{"timestamp": ..., "type": "event_msg", "payload": {"type": "token_count", ...}}`.
//! Token usage is reported as running totals on `token_count` events, together
//! with the usage of the last request.

use super::{non_empty, parse_arguments, ToolRules, TranscriptFormat};
use crate::models::{Provider, SessionRole, TokenSnapshot};
use crate::record::{LogRecord, SessionMeta, ToolInvocation, ToolResult, TurnContext, UsageReport};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

const RECORD_TYPES: &[&str] = &["session_meta", "turn_context", "event_msg", "response_item", "compacted"];

static CODEX_TOOLS: ToolRules = ToolRules {
    core_tools: &[
        "shell",
        "shell_command",
        "local_shell",
        "exec_command",
        "write_stdin",
        "apply_patch",
        "update_plan",
        "view_image",
        "read_file",
        "list_dir",
        "grep_files",
        "web_search",
    ],
    read_tools: &["read_file", "view_image"],
    write_tools: &[],
    search_tools: &["grep_files", "list_dir"],
    patch_tools: &["apply_patch"],
    skill_tools: &[],
    agent_tools: &[],
    mcp_prefix: "mcp__",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CodexFormat;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CodexLine {
    SessionMeta { payload: SessionMetaPayload },
    TurnContext { payload: TurnContextPayload },
    EventMsg { payload: EventPayload },
    ResponseItem { payload: ResponseItemPayload },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct SessionMetaPayload {
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git: Option<GitInfo>,
    #[serde(default)]
    source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GitInfo {
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TurnContextPayload {
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    effort: Option<String>,
    #[serde(default)]
    approval_policy: Option<String>,
    #[serde(default)]
    sandbox_policy: Option<Value>,
    #[serde(default)]
    collaboration_mode: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventPayload {
    UserMessage {
        message: String,
    },
    AgentMessage {
        #[allow(dead_code)]
        message: String,
    },
    TokenCount {
        #[serde(default)]
        info: Option<TokenInfo>,
    },
    EnteredReviewMode {
        #[serde(default)]
        user_facing_hint: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    total_token_usage: CodexUsage,
    #[serde(default)]
    last_token_usage: Option<CodexUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cached_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    reasoning_output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl CodexUsage {
    /// Codex counts cached input inside `input_tokens`; split it out.
    fn snapshot(&self) -> TokenSnapshot {
        let total = if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.input_tokens.saturating_add(self.output_tokens)
        };
        TokenSnapshot {
            input_tokens: self.input_tokens.saturating_sub(self.cached_input_tokens),
            output_tokens: self.output_tokens,
            reasoning_tokens: self.reasoning_output_tokens,
            cache_read_tokens: self.cached_input_tokens,
            cache_write_tokens: 0,
            total_tokens: total,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseItemPayload {
    Reasoning(IgnoredAny),
    FunctionCall {
        name: String,
        #[serde(default)]
        arguments: Value,
        call_id: String,
    },
    CustomToolCall {
        name: String,
        #[serde(default)]
        input: String,
        call_id: String,
    },
    LocalShellCall {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        action: Value,
    },
    WebSearchCall {
        #[serde(default)]
        action: Value,
    },
    FunctionCallOutput {
        call_id: String,
        #[serde(default)]
        output: Value,
    },
    CustomToolCallOutput {
        call_id: String,
        #[serde(default)]
        output: Value,
    },
    #[serde(other)]
    Unknown,
}

impl TranscriptFormat for CodexFormat {
    fn provider(&self) -> Provider {
        Provider::Codex
    }

    fn recognizes(&self, line: &Value) -> bool {
        let kind = line.get("type").and_then(Value::as_str);
        matches!(kind, Some(kind) if RECORD_TYPES.contains(&kind)) && line.get("payload").is_some()
    }

    fn decode(&self, line: &Value) -> Result<Vec<LogRecord>, serde_json::Error> {
        let record = match CodexLine::deserialize(line)? {
            CodexLine::SessionMeta { payload } => Some(session_meta(payload)),
            CodexLine::TurnContext { payload } => Some(turn_context(payload)),
            CodexLine::EventMsg { payload } => event(payload),
            CodexLine::ResponseItem { payload } => response_item(payload),
            CodexLine::Unknown => None,
        };
        Ok(record.into_iter().collect())
    }

    fn tool_rules(&self) -> &'static ToolRules {
        &CODEX_TOOLS
    }

    fn exit_code_pattern(&self) -> &'static str {
        r"(?i)(?:exit code|exited with code|exit status)[:\s]+(-?\d+)"
    }
}

fn session_meta(payload: SessionMetaPayload) -> LogRecord {
    let role = payload.source.as_ref().map(|source| {
        if source.get("subagent").is_some() {
            SessionRole::Subagent
        } else {
            SessionRole::Standalone
        }
    });

    LogRecord::SessionMeta(SessionMeta {
        cwd: non_empty(payload.cwd),
        git_branch: non_empty(payload.git.and_then(|git| git.branch)),
        role,
        model: None,
    })
}

fn turn_context(payload: TurnContextPayload) -> LogRecord {
    LogRecord::TurnContext(TurnContext {
        cwd: non_empty(payload.cwd),
        model: non_empty(payload.model),
        effort: non_empty(payload.effort),
        approval_policy: non_empty(payload.approval_policy),
        sandbox_mode: payload.sandbox_policy.as_ref().and_then(|v| label(v, &["type", "mode"])),
        collaboration_mode: payload
            .collaboration_mode
            .as_ref()
            .and_then(|v| label(v, &["mode", "type", "name"])),
    })
}

/// A policy value is either a bare string or an object naming it under one of `keys`.
fn label(value: &Value, keys: &[&str]) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => keys.iter().find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    };
    non_empty(text.map(str::to_string))
}

fn event(payload: EventPayload) -> Option<LogRecord> {
    match payload {
        EventPayload::UserMessage { message } => Some(LogRecord::UserMessage { text: message }),
        EventPayload::AgentMessage { .. } => Some(LogRecord::AgentMessage {
            message_id: None,
            model: None,
        }),
        EventPayload::TokenCount { info } => info.map(|info| LogRecord::TokenUsage {
            model: None,
            report: UsageReport::Cumulative {
                total: info.total_token_usage.snapshot(),
                last: info.last_token_usage.as_ref().map(CodexUsage::snapshot),
            },
        }),
        EventPayload::EnteredReviewMode { user_facing_hint } => Some(LogRecord::SubagentSpawn {
            agent_type: "review".to_string(),
            description: non_empty(user_facing_hint),
        }),
        EventPayload::Unknown => None,
    }
}

fn response_item(payload: ResponseItemPayload) -> Option<LogRecord> {
    match payload {
        ResponseItemPayload::Reasoning(_) => Some(LogRecord::Reasoning),
        ResponseItemPayload::FunctionCall { name, arguments, call_id } => {
            let arguments = match arguments {
                Value::String(raw) => parse_arguments(&raw),
                other => other,
            };
            let patch = patch_text(&name, &arguments);
            Some(LogRecord::ToolCall(ToolInvocation {
                call_id,
                name,
                arguments,
                patch,
            }))
        }
        ResponseItemPayload::CustomToolCall { name, input, call_id } => {
            let patch = CODEX_TOOLS
                .patch_tools
                .contains(&name.as_str())
                .then(|| input.clone());
            Some(LogRecord::ToolCall(ToolInvocation {
                call_id,
                name,
                arguments: serde_json::json!({ "input": input }),
                patch,
            }))
        }
        ResponseItemPayload::LocalShellCall { call_id, id, action } => {
            let patch = shell_patch(action.get("command"));
            Some(LogRecord::ToolCall(ToolInvocation {
                call_id: call_id.or(id).unwrap_or_default(),
                name: "local_shell".to_string(),
                arguments: action,
                patch,
            }))
        }
        ResponseItemPayload::WebSearchCall { action } => Some(LogRecord::ToolCall(ToolInvocation {
            call_id: String::new(),
            name: "web_search".to_string(),
            arguments: action,
            patch: None,
        })),
        ResponseItemPayload::FunctionCallOutput { call_id, output }
        | ResponseItemPayload::CustomToolCallOutput { call_id, output } => {
            Some(LogRecord::ToolOutput(tool_result(call_id, output)))
        }
        ResponseItemPayload::Unknown => None,
    }
}

/// Patch text for `apply_patch` calls, or for shell calls that invoke it directly.
fn patch_text(name: &str, arguments: &Value) -> Option<String> {
    if CODEX_TOOLS.patch_tools.contains(&name) {
        return ["input", "patch", "raw"]
            .iter()
            .find_map(|key| arguments.get(*key).and_then(Value::as_str))
            .map(str::to_string);
    }
    if name == "shell" {
        return shell_patch(arguments.get("command"));
    }
    None
}

fn shell_patch(command: Option<&Value>) -> Option<String> {
    let argv = command?.as_array()?;
    match argv.first().and_then(Value::as_str) {
        Some("apply_patch") => argv.get(1).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn tool_result(call_id: String, output: Value) -> ToolResult {
    match output {
        Value::String(raw) => ToolResult::from_output_text(call_id, &raw),
        Value::Object(map) => {
            // Older rollouts: {"content": "...", "success": false}
            let text = map
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let mut result = ToolResult::from_output_text(call_id, &text);
            if map.get("success").and_then(Value::as_bool) == Some(false) {
                result.is_error = true;
            }
            result
        }
        other => ToolResult {
            call_id,
            text: other.to_string(),
            ..ToolResult::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(line: Value) -> Vec<LogRecord> {
        CodexFormat.decode(&line).unwrap()
    }

    #[test]
    fn test_session_meta_subagent_source() {
        let records = decode(json!({
            "timestamp": "2025-10-01T10:00:00Z",
            "type": "session_meta",
            "payload": {"id": "s1", "cwd": "/work/app", "source": {"subagent": "review"}, "git": {"branch": "main"}}
        }));
        assert_eq!(
            records,
            vec![LogRecord::SessionMeta(SessionMeta {
                cwd: Some("/work/app".to_string()),
                git_branch: Some("main".to_string()),
                role: Some(SessionRole::Subagent),
                model: None,
            })]
        );
    }

    #[test]
    fn test_turn_context_policies() {
        let records = decode(json!({
            "type": "turn_context",
            "payload": {
                "cwd": "/w", "model": "gpt-5-codex", "effort": "high",
                "approval_policy": "on-request",
                "sandbox_policy": {"mode": "workspace-write", "network_access": false},
                "summary": "auto"
            }
        }));
        match &records[0] {
            LogRecord::TurnContext(ctx) => {
                assert_eq!(ctx.model.as_deref(), Some("gpt-5-codex"));
                assert_eq!(ctx.sandbox_mode.as_deref(), Some("workspace-write"));
                assert_eq!(ctx.approval_policy.as_deref(), Some("on-request"));
                assert_eq!(ctx.effort.as_deref(), Some("high"));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_token_count_normalizes_cached_input() {
        let records = decode(json!({
            "type": "event_msg",
            "payload": {"type": "token_count", "info": {
                "total_token_usage": {"input_tokens": 1000, "cached_input_tokens": 400, "output_tokens": 200, "reasoning_output_tokens": 50, "total_tokens": 1200},
                "last_token_usage": {"input_tokens": 100, "cached_input_tokens": 0, "output_tokens": 20, "reasoning_output_tokens": 0, "total_tokens": 120},
                "model_context_window": 272000
            }}
        }));
        match &records[0] {
            LogRecord::TokenUsage { report: UsageReport::Cumulative { total, last }, .. } => {
                assert_eq!(total.input_tokens, 600);
                assert_eq!(total.cache_read_tokens, 400);
                assert_eq!(total.reasoning_tokens, 50);
                assert_eq!(total.total_tokens, 1200);
                assert_eq!(last.unwrap().input_tokens, 100);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_token_count_without_info_is_dropped() {
        assert!(decode(json!({"type": "event_msg", "payload": {"type": "token_count", "info": null}})).is_empty());
    }

    #[test]
    fn test_function_call_arguments_are_decoded() {
        let records = decode(json!({
            "type": "response_item",
            "payload": {"type": "function_call", "name": "read_file", "arguments": "{\"file_path\":\"src/main.rs\"}", "call_id": "c1"}
        }));
        match &records[0] {
            LogRecord::ToolCall(call) => {
                assert_eq!(call.arguments["file_path"], "src/main.rs");
                assert!(call.patch.is_none());
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_custom_apply_patch_carries_patch() {
        let records = decode(json!({
            "type": "response_item",
            "payload": {"type": "custom_tool_call", "status": "completed", "name": "apply_patch", "call_id": "c2",
                        "input": "*** Begin Patch\n*** Add File: a.rs\n+fn a() {}\n*** End Patch"}
        }));
        match &records[0] {
            LogRecord::ToolCall(call) => assert!(call.patch.as_deref().unwrap().contains("Add File: a.rs")),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_shell_apply_patch_is_detected() {
        let args = json!({"command": ["apply_patch", "*** Begin Patch\n*** Update File: b.rs\n*** End Patch"]});
        assert!(patch_text("shell", &args).unwrap().contains("b.rs"));
        assert!(patch_text("shell", &json!({"command": ["ls"]})).is_none());
    }

    #[test]
    fn test_function_output_exit_code() {
        let records = decode(json!({
            "type": "response_item",
            "payload": {"type": "function_call_output", "call_id": "c1",
                        "output": "{\"output\":\"not found\",\"metadata\":{\"exit_code\":1}}"}
        }));
        match &records[0] {
            LogRecord::ToolOutput(result) => assert_eq!(result.exit_code, Some(1)),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_user_message_requires_message() {
        assert!(CodexFormat
            .decode(&json!({"type": "event_msg", "payload": {"type": "user_message"}}))
            .is_err());
    }

    #[test]
    fn test_unknown_kinds_decode_to_nothing() {
        assert!(decode(json!({"type": "event_msg", "payload": {"type": "task_started"}})).is_empty());
        assert!(decode(json!({"type": "compacted", "payload": {"message": "x"}})).is_empty());
        assert!(decode(json!({"type": "response_item", "payload": {"type": "ghost_snapshot"}})).is_empty());
    }
}
