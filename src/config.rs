//! Configuration system
//!
//! Provides centralized configuration management with:
//! - Config file loading (optional, TOML)
//! - Environment variable overrides
//! - Runtime defaults
//! - Validation
//!
//! [`Config`] is the user-facing, serializable settings tree. [`EngineConfig`]
//! is the immutable projection a parse actually needs (loaded pricing table,
//! compiled provider rules); it is built once and shared read-only between
//! concurrent parses.

use crate::categorize::DEFAULT_TAG_VALUE_LEN;
use crate::error::EngineError;
use crate::models::Provider;
use crate::pricing::PricingTable;
use crate::providers::{ProviderRules, CLAUDE_CODE, CODEX};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub processing: ProcessingConfig,
    pub pricing: PricingConfig,
    pub tags: TagsConfig,
    pub providers: ProvidersConfig,
    pub output: OutputConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// `console`, `file` or `both`
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Transcripts parsed concurrently by the batch analyzer.
    pub parallel_parses: usize,
    pub buffer_size_kb: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Replacement pricing table (`.toml`, or LiteLLM `.json`).
    pub table_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    pub max_value_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub codex: ProviderOverrides,
    pub claude_code: ProviderOverrides,
}

/// Per-provider replacements for the built-in tool tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverrides {
    pub core_tools: Option<Vec<String>>,
    pub exit_code_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_parses: 4,
            buffer_size_kb: 64,
        }
    }
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            max_value_len: DEFAULT_TAG_VALUE_LEN,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            Some(PathBuf::from("agent-usage.toml")),
            Some(PathBuf::from(".agent-usage.toml")),
            dirs::config_dir().map(|d| d.join("agent-usage").join("config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("AGENT_USAGE_PARALLEL_PARSES") {
            self.processing.parallel_parses = val
                .parse()
                .context("Invalid AGENT_USAGE_PARALLEL_PARSES")?;
        }
        if let Ok(val) = env::var("AGENT_USAGE_BUFFER_SIZE_KB") {
            self.processing.buffer_size_kb = val
                .parse()
                .context("Invalid AGENT_USAGE_BUFFER_SIZE_KB")?;
        }
        if let Ok(val) = env::var("AGENT_USAGE_TAG_MAX_LEN") {
            self.tags.max_value_len = val.parse().context("Invalid AGENT_USAGE_TAG_MAX_LEN")?;
        }
        if let Ok(val) = env::var("AGENT_USAGE_PRICING_FILE") {
            self.pricing.table_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = env::var("AGENT_USAGE_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.processing.buffer_size_kb < 1 || self.processing.buffer_size_kb > 1024 {
            anyhow::bail!(
                "Buffer size must be between 1KB and 1024KB, got {}KB",
                self.processing.buffer_size_kb
            );
        }

        if self.processing.parallel_parses == 0 {
            anyhow::bail!("Parallel parses must be greater than 0");
        }

        if self.tags.max_value_len == 0 {
            anyhow::bail!("Tag value length must be greater than 0");
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            anyhow::bail!(
                "Log output must be one of console, file, both; got {}",
                self.logging.output
            );
        }

        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }
}

/// Read-only settings for one or more parses.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub pricing: PricingTable,
    pub codex: ProviderRules,
    pub claude_code: ProviderRules,
    pub tag_value_len: usize,
    /// Reader buffer capacity in bytes.
    pub buffer_size: usize,
}

impl EngineConfig {
    /// Built-in pricing and tool tables with default limits.
    pub fn builtin() -> Result<Self, EngineError> {
        Ok(Self {
            pricing: PricingTable::builtin()?,
            codex: ProviderRules::for_format(&CODEX)?,
            claude_code: ProviderRules::for_format(&CLAUDE_CODE)?,
            tag_value_len: DEFAULT_TAG_VALUE_LEN,
            buffer_size: ProcessingConfig::default().buffer_size_kb * 1024,
        })
    }

    /// `pricing_file` takes precedence over `pricing.table_path`.
    pub fn from_config(config: &Config, pricing_file: Option<&Path>) -> Result<Self, EngineError> {
        let pricing = match pricing_file.or(config.pricing.table_path.as_deref()) {
            Some(path) => PricingTable::load(path)?,
            None => PricingTable::builtin()?,
        };

        let codex = &config.providers.codex;
        let claude = &config.providers.claude_code;

        Ok(Self {
            pricing,
            codex: ProviderRules::with_overrides(
                &CODEX,
                codex.core_tools.as_deref(),
                codex.exit_code_pattern.as_deref(),
            )?,
            claude_code: ProviderRules::with_overrides(
                &CLAUDE_CODE,
                claude.core_tools.as_deref(),
                claude.exit_code_pattern.as_deref(),
            )?,
            tag_value_len: config.tags.max_value_len,
            buffer_size: config.processing.buffer_size_kb * 1024,
        })
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn rules(&self, provider: Provider) -> &ProviderRules {
        match provider {
            Provider::Codex => &self.codex,
            Provider::ClaudeCode => &self.claude_code,
        }
    }
}
