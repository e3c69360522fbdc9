//! Agent Usage Library
//!
//! Parses the JSONL session transcripts written by AI coding-agent CLIs
//! (Codex CLI and Claude Code) into per-session statistics: reconciled token
//! usage, cost, tool activity, file access, latency and derived tags.
//!
//! ## Core Features
//!
//! - **Streaming parse**: transcripts are read line by line with bounded memory;
//!   malformed lines are skipped, never fatal
//! - **Usage reconciliation**: cumulative and incremental token reports become
//!   non-negative per-model deltas, surviving counter resets and duplicate reports
//! - **Tool correlation**: calls are matched to outputs by call id, errors
//!   detected, and skills, sub-agents and file access extracted
//! - **Cost calculation**: built-in or user-supplied pricing tables, with explicit
//!   pricing status when a model is unknown
//! - **Concurrent batches**: many transcripts parsed in parallel with
//!   cooperative cancellation
//!
//! ## Architecture Overview
//!
//! - [`reader`] - Line-oriented JSONL reading with malformed-line recovery
//! - [`providers`] - Per-format decoding of raw lines into [`record::LogRecord`]s
//! - [`reconcile`] - Token counter reconciliation
//! - [`correlate`] - Tool call / output correlation and enrichment
//! - [`latency`] - Turn latency and session duration
//! - [`categorize`] - File categorization, patch parsing and tag derivation
//! - [`aggregator`] - Folds records into [`SessionStats`]
//! - [`parser`] - Single-file parsing entry points
//! - [`analyzer`] - Concurrent batch parsing
//! - [`pricing`] - Pricing tables and cost calculation
//! - [`config`] - Configuration with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//! - [`report`] - Terminal and JSON output
//!
//! ## Main Entry Point
//!
//! ```no_run
//! use agent_usage::{EngineConfig, FileParser};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let parser = FileParser::new(Arc::new(EngineConfig::builtin()?));
//! let stats = parser.parse_file(Path::new("rollout-2025-10-01.jsonl"))?;
//! println!("{} tokens, ${:.4}", stats.total_tokens(), stats.total_cost);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod categorize;
pub mod config;
pub mod correlate;
pub mod error;
pub mod latency;
pub mod logging;
pub mod models;
pub mod parser;
pub mod pricing;
pub mod providers;
pub mod reader;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod timestamp_parser;

pub use analyzer::{SessionReport, UsageAnalyzer};
pub use config::{Config, EngineConfig};
pub use error::{EngineError, ParseError, PricingError};
pub use models::*;
pub use parser::{CancelFlag, FileParser, ProviderSelection, SessionParser};
pub use pricing::PricingTable;
