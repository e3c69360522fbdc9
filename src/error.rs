//! Error types surfaced at the library boundary.
//!
//! Everything that is line-local (bad JSON, unknown record kinds, counter resets,
//! unpriced models) is absorbed inside the parser. Only whole-file failures
//! reach the caller, and they never carry partial statistics.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failure of a single transcript parse.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot open transcript {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading transcript {} at line {line}: {source}", path.display())]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("parse of {} was cancelled", path.display())]
    Cancelled { path: PathBuf },

    #[error("parse of {} aborted: {reason}", path.display())]
    Aborted { path: PathBuf, reason: String },
}

impl ParseError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            ParseError::Open { path, .. }
            | ParseError::Read { path, .. }
            | ParseError::Cancelled { path }
            | ParseError::Aborted { path, .. } => path,
        }
    }
}

/// Failure to load a pricing table.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("failed to read pricing file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML pricing table: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid LiteLLM pricing JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to assemble the parse-scoped engine configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("invalid exit-code pattern for {provider}: {source}")]
    Pattern {
        provider: String,
        #[source]
        source: regex::Error,
    },
}
