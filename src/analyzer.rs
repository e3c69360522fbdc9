//! Batch Analysis Engine
//!
//! Parses many independent transcripts concurrently. Each parse runs on a
//! blocking worker thread with its own aggregator; the only shared values are
//! the read-only [`EngineConfig`](crate::config::EngineConfig) and the
//! [`CancelFlag`]. Results come back in input order.
//!
//! ## Usage Example
//!
//! ```no_run
//! use agent_usage::{CancelFlag, EngineConfig, FileParser, UsageAnalyzer};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let parser = FileParser::new(Arc::new(EngineConfig::builtin()?));
//! let analyzer = UsageAnalyzer::new(parser, 4);
//! let reports = analyzer
//!     .parse_files(vec![PathBuf::from("rollout.jsonl")], CancelFlag::new())
//!     .await;
//! for report in &reports {
//!     if let Ok(stats) = &report.result {
//!         println!("{}: ${:.4}", report.path.display(), stats.total_cost);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::ParseError;
use crate::models::SessionStats;
use crate::parser::{CancelFlag, FileParser};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use glob::glob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of parsing one transcript.
#[derive(Debug)]
pub struct SessionReport {
    pub path: PathBuf,
    pub result: Result<SessionStats, ParseError>,
}

impl SessionReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct UsageAnalyzer {
    parser: Arc<FileParser>,
    parallel_parses: usize,
}

impl UsageAnalyzer {
    pub fn new(parser: FileParser, parallel_parses: usize) -> Self {
        Self {
            parser: Arc::new(parser),
            parallel_parses: parallel_parses.max(1),
        }
    }

    pub async fn parse_files(&self, paths: Vec<PathBuf>, cancel: CancelFlag) -> Vec<SessionReport> {
        info!(files = paths.len(), parallel = self.parallel_parses, "Parsing transcripts");

        let reports: Vec<SessionReport> = stream::iter(paths.into_iter().map(|path| {
            let parser = Arc::clone(&self.parser);
            let cancel = cancel.clone();
            async move {
                let task_path = path.clone();
                let result =
                    parse_blocking(&path, move || parser.parse_file_with_cancel(&task_path, &cancel)).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Transcript parse failed");
                }
                SessionReport { path, result }
            }
        }))
        .buffered(self.parallel_parses)
        .collect()
        .await;

        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        info!(parsed = reports.len() - failed, failed, "Finished parsing transcripts");
        reports
    }
}

/// Runs one parse on a blocking worker. A worker that panics or is torn down
/// reports [`ParseError::Aborted`] for its path.
async fn parse_blocking<F>(path: &Path, parse: F) -> Result<SessionStats, ParseError>
where
    F: FnOnce() -> Result<SessionStats, ParseError> + Send + 'static,
{
    tokio::task::spawn_blocking(parse).await.unwrap_or_else(|e| {
        Err(ParseError::Aborted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

/// Expands CLI inputs: glob patterns, directories (all `*.jsonl` below them)
/// and plain paths. Plain paths are kept even if missing so the parse reports them.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let pattern = path.join("**").join("*.jsonl");
            paths.extend(glob_paths(&pattern.to_string_lossy())?);
        } else if input.contains(|c| matches!(c, '*' | '?' | '[')) {
            let matched = glob_paths(input)?;
            if matched.is_empty() {
                warn!(pattern = %input, "Pattern matched no files");
            }
            paths.extend(matched);
        } else {
            paths.push(path.to_path_buf());
        }
    }

    Ok(paths)
}

fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut matched: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                None
            }
        })
        .collect();
    matched.sort();
    Ok(matched)
}
