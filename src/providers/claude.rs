//! Claude Code project transcripts (`~/.claude/projects/<project>/<session>.jsonl`).
//!
//! Each assistant line carries one API message with its own usage; the same
//! message is often written several times (once per content block), so usage
//! is keyed by `message.id:requestId` and counted once.

use super::{non_empty, ToolRules, TranscriptFormat};
use crate::models::{Provider, SessionRole, TokenSnapshot};
use crate::record::{LogRecord, SessionMeta, ToolInvocation, ToolResult, TurnContext, UsageReport};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

/// Model id Claude Code writes for locally generated placeholder messages.
const SYNTHETIC_MODEL: &str = "<synthetic>";

static CLAUDE_TOOLS: ToolRules = ToolRules {
    core_tools: &[
        "Read",
        "Write",
        "Edit",
        "MultiEdit",
        "Bash",
        "BashOutput",
        "KillShell",
        "Glob",
        "Grep",
        "LS",
        "NotebookRead",
        "NotebookEdit",
        "WebFetch",
        "WebSearch",
        "TodoWrite",
        "ExitPlanMode",
        "AskUserQuestion",
    ],
    read_tools: &["Read", "NotebookRead"],
    write_tools: &["Write", "Edit", "MultiEdit", "NotebookEdit"],
    search_tools: &["Grep", "Glob", "LS"],
    patch_tools: &[],
    skill_tools: &["Skill"],
    agent_tools: &["Task", "Agent"],
    mcp_prefix: "mcp__",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCodeFormat;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeLine {
    User(ConversationLine),
    Assistant(ConversationLine),
    Summary { summary: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationLine {
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    is_sidechain: Option<bool>,
    #[serde(default)]
    is_meta: Option<bool>,
    #[serde(default)]
    permission_mode: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    message: ClaudeMessage,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: MessageContent,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking(IgnoredAny),
    RedactedThinking(IgnoredAny),
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

impl ClaudeUsage {
    fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            reasoning_tokens: 0,
            cache_read_tokens: self.cache_read_input_tokens,
            cache_write_tokens: self.cache_creation_input_tokens,
            total_tokens: self
                .input_tokens
                .saturating_add(self.output_tokens)
                .saturating_add(self.cache_read_input_tokens)
                .saturating_add(self.cache_creation_input_tokens),
        }
    }
}

impl TranscriptFormat for ClaudeCodeFormat {
    fn provider(&self) -> Provider {
        Provider::ClaudeCode
    }

    fn recognizes(&self, line: &Value) -> bool {
        match line.get("type").and_then(Value::as_str) {
            Some("user") | Some("assistant") => line.get("message").map_or(false, Value::is_object),
            Some("summary") => line.get("summary").map_or(false, Value::is_string),
            _ => false,
        }
    }

    fn decode(&self, line: &Value) -> Result<Vec<LogRecord>, serde_json::Error> {
        let records = match ClaudeLine::deserialize(line)? {
            ClaudeLine::User(line) => user_records(line),
            ClaudeLine::Assistant(line) => assistant_records(line),
            ClaudeLine::Summary { summary } => non_empty(Some(summary))
                .map(|text| LogRecord::Summary { text })
                .into_iter()
                .collect(),
            ClaudeLine::Unknown => Vec::new(),
        };
        Ok(records)
    }

    fn tool_rules(&self) -> &'static ToolRules {
        &CLAUDE_TOOLS
    }

    fn exit_code_pattern(&self) -> &'static str {
        r"(?i)(?:exit code|exited with code|exit status)[:\s]+(-?\d+)"
    }
}

/// Session and turn context carried on every conversation line.
fn context_records(line: &ConversationLine) -> Vec<LogRecord> {
    let mut records = Vec::new();

    let meta = SessionMeta {
        cwd: non_empty(line.cwd.clone()),
        git_branch: non_empty(line.git_branch.clone()),
        role: line.is_sidechain.map(|sidechain| {
            if sidechain {
                SessionRole::Subagent
            } else {
                SessionRole::Standalone
            }
        }),
        model: None,
    };
    if meta != SessionMeta::default() {
        records.push(LogRecord::SessionMeta(meta));
    }

    if let Some(mode) = non_empty(line.permission_mode.clone()) {
        records.push(LogRecord::TurnContext(TurnContext {
            approval_policy: Some(mode),
            ..TurnContext::default()
        }));
    }

    records
}

fn user_records(line: ConversationLine) -> Vec<LogRecord> {
    let mut records = context_records(&line);
    let is_meta = line.is_meta.unwrap_or(false);

    let mut texts = Vec::new();
    match line.message.content {
        MessageContent::Text(text) => texts.push(text),
        MessageContent::Blocks(blocks) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => texts.push(text),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => records.push(LogRecord::ToolOutput(ToolResult {
                        call_id: tool_use_id,
                        is_error: is_error.unwrap_or(false),
                        text: result_text(&content),
                        ..ToolResult::default()
                    })),
                    _ => {}
                }
            }
        }
    }

    let text = texts.join("\n");
    if !is_meta && !text.trim().is_empty() {
        records.push(LogRecord::UserMessage { text });
    }

    records
}

fn assistant_records(line: ConversationLine) -> Vec<LogRecord> {
    let mut records = context_records(&line);
    let model = line
        .message
        .model
        .filter(|model| model != SYNTHETIC_MODEL && !model.trim().is_empty());

    records.push(LogRecord::AgentMessage {
        message_id: line.message.id.clone(),
        model: model.clone(),
    });

    if let MessageContent::Blocks(blocks) = line.message.content {
        for block in blocks {
            match block {
                ContentBlock::Thinking(_) | ContentBlock::RedactedThinking(_) => {
                    records.push(LogRecord::Reasoning)
                }
                ContentBlock::ToolUse { id, name, input } => {
                    records.push(LogRecord::ToolCall(ToolInvocation {
                        call_id: id,
                        name,
                        arguments: input,
                        patch: None,
                    }))
                }
                _ => {}
            }
        }
    }

    if let Some(usage) = line.message.usage {
        let dedup_key = match (&line.message.id, &line.request_id) {
            (Some(id), Some(request)) => Some(format!("{}:{}", id, request)),
            _ => None,
        };
        records.push(LogRecord::TokenUsage {
            model,
            report: UsageReport::Incremental {
                usage: usage.snapshot(),
                dedup_key,
            },
        });
    }

    records
}

/// Tool result content is a string or a list of `{"type": "text", "text": ...}` blocks.
fn result_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
