use agent_usage::analyzer::expand_inputs;
use agent_usage::config::Config;
use agent_usage::logging::{init_logging, run_span};
use agent_usage::report::ReportDisplay;
use agent_usage::{CancelFlag, EngineConfig, FileParser, PricingTable, ProviderSelection, UsageAnalyzer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

#[derive(Parser)]
#[command(name = "agent-usage")]
#[command(about = "Token usage, cost and tool statistics from AI coding-agent session transcripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse session transcripts and report per-session statistics
    Parse {
        /// Transcript files, directories or glob patterns
        #[arg(required = true)]
        paths: Vec<String>,
        /// Transcript format
        #[arg(long, value_enum, default_value_t = ProviderSelection::Auto)]
        provider: ProviderSelection,
        /// Pricing table to use instead of the built-in one (.toml or LiteLLM .json)
        #[arg(long)]
        pricing: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List the models the pricing table knows about
    Models {
        /// Pricing table to use instead of the built-in one (.toml or LiteLLM .json)
        #[arg(long)]
        pricing: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    };
    let _log_guard = init_logging(&config);
    let display = ReportDisplay::new(config.output.json_pretty);

    match cli.command {
        Commands::Parse {
            paths,
            provider,
            pricing,
            json,
        } => {
            let span = run_span("parse");
            let outcome = run_parse(&config, &display, paths, provider, pricing, json)
                .instrument(span)
                .await;
            match outcome {
                Ok(true) => Ok(()),
                Ok(false) => process::exit(1),
                Err(e) => handle_error(e, json),
            }
        }
        Commands::Models { pricing, json } => {
            let _entered = run_span("models").entered();
            let table = match pricing.or_else(|| config.pricing.table_path.clone()) {
                Some(path) => PricingTable::load(&path).with_context(|| format!("Loading {}", path.display())),
                None => PricingTable::builtin().context("Loading built-in pricing"),
            };
            match table.and_then(|table| display.display_models(&table, json)) {
                Ok(()) => Ok(()),
                Err(e) => handle_error(e, json),
            }
        }
    }
}

/// Returns `Ok(false)` when at least one transcript failed to parse.
async fn run_parse(
    config: &Config,
    display: &ReportDisplay,
    inputs: Vec<String>,
    provider: ProviderSelection,
    pricing: Option<PathBuf>,
    json: bool,
) -> Result<bool> {
    let engine = EngineConfig::from_config(config, pricing.as_deref())?;
    let paths = expand_inputs(&inputs)?;
    if paths.is_empty() {
        anyhow::bail!("No transcripts found for {}", inputs.join(", "));
    }

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining parses");
            on_interrupt.cancel();
        }
    });

    let parser = FileParser::new(Arc::new(engine)).with_provider(provider);
    let analyzer = UsageAnalyzer::new(parser, config.processing.parallel_parses);
    let reports = analyzer.parse_files(paths, cancel).await;

    display.display_sessions(&reports, json)?;

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    info!(sessions = reports.len(), failed, "Run complete");
    Ok(failed == 0)
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}
