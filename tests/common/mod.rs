#![allow(dead_code)]

use agent_usage::{EngineConfig, FileParser, PricingTable};
use anyhow::Result;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prices chosen so costs are easy to check by hand: $1/M input, $2/M output.
pub const TEST_PRICING: &str = r#"
[models."gpt-5-codex"]
input = 1.0
output = 2.0
cache_read = 0.5

[models."claude-sonnet-4-5"]
input = 3.0
output = 15.0
cache_read = 0.3
cache_write = 3.75
"#;

pub fn test_engine() -> EngineConfig {
    let pricing = PricingTable::from_toml_str(TEST_PRICING).expect("test pricing parses");
    EngineConfig::builtin()
        .expect("built-in tables load")
        .with_pricing(pricing)
}

pub fn test_parser() -> FileParser {
    FileParser::new(Arc::new(test_engine()))
}

pub fn create_test_jsonl(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

pub fn jsonl(lines: &[Value]) -> String {
    lines
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn ts(second: u32) -> String {
    format!("2025-10-01T10:{:02}:{:02}Z", second / 60, second % 60)
}

pub fn codex(second: u32, kind: &str, payload: Value) -> Value {
    json!({ "timestamp": ts(second), "type": kind, "payload": payload })
}

pub fn codex_session_meta(second: u32, cwd: &str) -> Value {
    codex(
        second,
        "session_meta",
        json!({ "id": "session-1", "cwd": cwd, "git": { "branch": "main" } }),
    )
}

pub fn codex_turn_context(second: u32, model: &str) -> Value {
    codex(
        second,
        "turn_context",
        json!({
            "cwd": "/work/app",
            "model": model,
            "effort": "high",
            "approval_policy": "on-request",
            "sandbox_policy": { "type": "workspace-write" }
        }),
    )
}

pub fn codex_user(second: u32, text: &str) -> Value {
    codex(second, "event_msg", json!({ "type": "user_message", "message": text }))
}

pub fn codex_agent(second: u32, text: &str) -> Value {
    codex(second, "event_msg", json!({ "type": "agent_message", "message": text }))
}

/// A `token_count` event with running totals; `last` is the request that produced them.
pub fn codex_tokens(second: u32, input: u64, cached: u64, output: u64, last: Option<(u64, u64, u64)>) -> Value {
    let usage = |input: u64, cached: u64, output: u64| {
        json!({
            "input_tokens": input,
            "cached_input_tokens": cached,
            "output_tokens": output,
            "reasoning_output_tokens": 0,
            "total_tokens": input + output
        })
    };
    let mut info = json!({ "total_token_usage": usage(input, cached, output) });
    if let Some((input, cached, output)) = last {
        info["last_token_usage"] = usage(input, cached, output);
    }
    codex(second, "event_msg", json!({ "type": "token_count", "info": info }))
}

pub fn codex_call(second: u32, call_id: &str, name: &str, arguments: Value) -> Value {
    codex(
        second,
        "response_item",
        json!({
            "type": "function_call",
            "name": name,
            "arguments": arguments.to_string(),
            "call_id": call_id
        }),
    )
}

pub fn codex_output(second: u32, call_id: &str, output: &str) -> Value {
    codex(
        second,
        "response_item",
        json!({ "type": "function_call_output", "call_id": call_id, "output": output }),
    )
}

pub fn claude_user(second: u32, text: &str) -> Value {
    json!({
        "type": "user",
        "timestamp": ts(second),
        "cwd": "/work/site",
        "gitBranch": "feature",
        "isSidechain": false,
        "message": { "role": "user", "content": text }
    })
}

pub fn claude_assistant(second: u32, id: &str, request: &str, content: Value, usage: Value) -> Value {
    json!({
        "type": "assistant",
        "timestamp": ts(second),
        "requestId": request,
        "message": {
            "id": id,
            "role": "assistant",
            "model": "claude-sonnet-4-5-20250929",
            "content": content,
            "usage": usage
        }
    })
}

pub fn claude_tool_result(second: u32, tool_use_id: &str, content: &str, is_error: bool) -> Value {
    json!({
        "type": "user",
        "timestamp": ts(second),
        "message": {
            "role": "user",
            "content": [{ "type": "tool_result", "tool_use_id": tool_use_id, "content": content, "is_error": is_error }]
        }
    })
}
