//! File categories, patch path extraction and session tags.

use crate::models::{FileCategory, SessionStats};
use std::collections::BTreeSet;

pub const DEFAULT_TAG_VALUE_LEN: usize = 32;

const INSTRUCTION_FILES: &[&str] = &["agents.md", "claude.md", "gemini.md", "copilot-instructions.md"];

const CONFIG_FILES: &[&str] = &[
    "cargo.toml",
    "package.json",
    "tsconfig.json",
    "pyproject.toml",
    "setup.cfg",
    "go.mod",
    "makefile",
    "dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".env",
    ".gitignore",
    ".editorconfig",
    ".npmrc",
];

const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json", "jsonc", "ini", "cfg", "conf", "env", "lock"];

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "mjs", "cjs", "ts", "tsx", "jsx", "go", "java", "kt", "kts", "c", "h", "cc", "cpp", "hpp",
    "cs", "rb", "php", "swift", "scala", "sh", "bash", "zsh", "sql", "html", "css", "scss", "vue", "svelte", "lua",
    "dart", "ex", "exs", "zig", "m", "mm", "r", "jl", "hs", "ml", "clj",
];

const PATCH_MARKERS: &[&str] = &["*** Add File:", "*** Update File:", "*** Delete File:", "*** Move to:"];

/// Buckets a path by its directory segments, then its file name, then its extension.
pub fn categorize_path(path: &str) -> FileCategory {
    let segments: Vec<String> = path
        .split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect();
    let file_name = segments.last().map(String::as_str).unwrap_or("");
    let has_segment = |name: &str| segments.iter().any(|s| s == name);

    if has_segment("knowledge") {
        return FileCategory::Knowledge;
    }
    if has_segment("instructions") || INSTRUCTION_FILES.contains(&file_name) {
        return FileCategory::Instruction;
    }
    if has_segment("agents") {
        return FileCategory::Agent;
    }
    if CONFIG_FILES.contains(&file_name) {
        return FileCategory::Config;
    }

    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    if CONFIG_EXTENSIONS.contains(&extension) {
        FileCategory::Config
    } else if CODE_EXTENSIONS.contains(&extension) {
        FileCategory::Code
    } else {
        FileCategory::Other
    }
}

/// Paths named by the file markers of an `apply_patch` envelope, in order, without repeats.
pub fn patch_paths(patch: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for line in patch.lines() {
        let line = line.trim_start();
        let found = PATCH_MARKERS
            .iter()
            .find_map(|marker| line.strip_prefix(marker))
            .map(str::trim)
            .filter(|path| !path.is_empty());
        if let Some(path) = found {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
    }
    paths
}

/// Lowercases, keeps `[a-z0-9_-]` and truncates. Empty results produce no tag.
pub fn normalize_tag_value(value: &str, max_len: usize) -> Option<String> {
    let normalized: String = value
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(max_len)
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

/// Sorted, de-duplicated `prefix:value` tags.
#[derive(Debug, Default)]
pub struct TagSet {
    tags: BTreeSet<String>,
    max_len: usize,
}

impl TagSet {
    pub fn new(max_len: usize) -> Self {
        Self {
            tags: BTreeSet::new(),
            max_len,
        }
    }

    pub fn add(&mut self, prefix: &str, value: &str) {
        if let Some(value) = normalize_tag_value(value, self.max_len) {
            self.tags.insert(format!("{}:{}", prefix, value));
        }
    }

    pub fn add_opt(&mut self, prefix: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.add(prefix, value);
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.tags.into_iter().collect()
    }
}

/// Tags derived from a finished session: spawned agent types, skills and run settings.
pub fn session_tags(stats: &SessionStats, max_len: usize) -> Vec<String> {
    let mut tags = TagSet::new(max_len);
    for agent_type in stats.tools.agent_types.keys() {
        tags.add("spawns", agent_type);
    }
    for skill in &stats.tools.skills {
        tags.add("skill", &skill.name);
    }
    tags.add_opt("approval", stats.approval_policy.as_deref());
    tags.add_opt("sandbox", stats.sandbox_mode.as_deref());
    tags.add_opt("mode", stats.collaboration_mode.as_deref());
    tags.add_opt("effort", stats.effort_mode.as_deref());
    tags.into_vec()
}
