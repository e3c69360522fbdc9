//! Output Formatting
//!
//! Human-readable terminal output with colors, or structured JSON on stdout
//! for programmatic consumption.
//!
//! ### JSON Output
//! One object per input path, in input order:
//! ```json
//! [
//!   {"path": "rollout-1.jsonl", "stats": {"provider": "codex", "totalCost": 0.42, "...": "..."}},
//!   {"path": "missing.jsonl", "error": "cannot open transcript missing.jsonl: ..."}
//! ]
//! ```

use crate::analyzer::SessionReport;
use crate::models::{PricingStatus, SessionStats};
use crate::pricing::PricingTable;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ReportJson<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a SessionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelPriceJson<'a> {
    model: &'a str,
    input: Option<f64>,
    output: Option<f64>,
    cache_read: Option<f64>,
    cache_write: Option<f64>,
}

pub fn reports_json(reports: &[SessionReport], pretty: bool) -> serde_json::Result<String> {
    let rows: Vec<ReportJson<'_>> = reports
        .iter()
        .map(|report| match &report.result {
            Ok(stats) => ReportJson {
                path: &report.path,
                stats: Some(stats),
                error: None,
            },
            Err(e) => ReportJson {
                path: &report.path,
                stats: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    to_json(&rows, pretty)
}

pub fn models_json(table: &PricingTable, pretty: bool) -> serde_json::Result<String> {
    let rows: Vec<ModelPriceJson<'_>> = table
        .models()
        .map(|(model, pricing)| ModelPriceJson {
            model,
            input: pricing.input,
            output: pricing.output,
            cache_read: pricing.cache_read,
            cache_write: pricing.cache_write,
        })
        .collect();
    to_json(&rows, pretty)
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

pub struct ReportDisplay {
    json_pretty: bool,
}

impl ReportDisplay {
    pub fn new(json_pretty: bool) -> Self {
        Self { json_pretty }
    }

    pub fn display_sessions(&self, reports: &[SessionReport], json_output: bool) -> anyhow::Result<()> {
        if json_output {
            println!("{}", reports_json(reports, self.json_pretty)?);
            return Ok(());
        }

        println!("\n{}", "=".repeat(80).bright_cyan());
        println!("{}", "Agent Session Usage Report".bright_white().bold());
        println!("{}", "=".repeat(80).bright_cyan());

        let parsed: Vec<&SessionStats> = reports.iter().filter_map(|r| r.result.as_ref().ok()).collect();
        let total_cost: f64 = parsed.iter().map(|s| s.total_cost).sum();
        let total_tokens = parsed.iter().fold(0u64, |acc, s| acc.saturating_add(s.total_tokens()));

        println!(
            "\n{} sessions • {} tokens • {} total\n",
            parsed.len().to_string().bright_white().bold(),
            total_tokens.to_string().bright_white().bold(),
            format!("${:.4}", total_cost).bright_green().bold()
        );

        for report in reports {
            match &report.result {
                Ok(stats) => self.display_session(&report.path, stats),
                Err(e) => println!("{} {}\n", "✗".bright_red(), e.to_string().red()),
            }
        }

        Ok(())
    }

    fn display_session(&self, path: &Path, stats: &SessionStats) {
        let provider = stats.provider.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
        println!(
            "{} {} [{}] • {} {}",
            "📄".bright_blue(),
            path.display().to_string().bright_white().bold(),
            provider.bright_cyan(),
            format!("${:.4}", stats.total_cost).bright_green().bold(),
            pricing_label(stats.pricing_status)
        );

        if let Some(project) = &stats.project_path {
            let branch = stats.git_branch.as_deref().unwrap_or("-");
            println!("   project: {} ({})", project.bright_cyan(), branch);
        }
        if let Some(first) = &stats.first_message {
            println!("   first message: {}", first.dimmed());
        }

        println!(
            "   messages: {} ({} user / {} agent) • tool calls: {} • thinking: {}",
            stats.message_count.to_string().bright_white(),
            stats.user_message_count,
            stats.agent_message_count,
            stats.tool_call_count.to_string().bright_white(),
            stats.thinking_block_count
        );
        println!(
            "   tokens: in {} • out {} • cache read {} • cache write {} • reasoning {}",
            stats.input_tokens.to_string().bright_white(),
            stats.output_tokens.to_string().bright_white(),
            stats.cache_read_tokens,
            stats.cache_write_tokens,
            stats.reasoning_tokens
        );
        println!(
            "   latency: avg {:.0}ms • p50 {}ms • p95 {}ms • max {}ms ({} turns) • duration {}s",
            stats.latency.avg_ms,
            stats.latency.p50_ms,
            stats.latency.p95_ms,
            stats.latency.max_ms,
            stats.latency.samples,
            stats.duration_ms / 1000
        );

        for entry in stats.model_usage.values() {
            println!(
                "   {}: {} ({} tokens, {} messages) {}",
                entry.model.bright_cyan(),
                format!("${:.4}", entry.cost).bright_green(),
                entry.total_tokens(),
                entry.message_count,
                pricing_label(entry.pricing_status)
            );
        }

        let mut tools: Vec<_> = stats.tool_usage.values().collect();
        tools.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        for tool in tools.iter().take(10) {
            let errors = if tool.error_count > 0 {
                format!(", {} errors", tool.error_count).bright_red().to_string()
            } else {
                String::new()
            };
            println!(
                "   {} {} calls{}",
                tool.name.bright_yellow(),
                tool.count,
                errors
            );
        }

        if !stats.tags.is_empty() {
            println!("   tags: {}", stats.tags.join(", ").bright_magenta());
        }
        println!();
    }

    pub fn display_models(&self, table: &PricingTable, json_output: bool) -> anyhow::Result<()> {
        if json_output {
            println!("{}", models_json(table, self.json_pretty)?);
            return Ok(());
        }

        println!(
            "{:<32} {:>10} {:>10} {:>12} {:>12}",
            "model".bright_white().bold(),
            "input",
            "output",
            "cache read",
            "cache write"
        );
        for (model, pricing) in table.models() {
            println!(
                "{:<32} {:>10} {:>10} {:>12} {:>12}",
                model.bright_cyan(),
                price(pricing.input),
                price(pricing.output),
                price(pricing.cache_read.or(pricing.input)),
                price(pricing.cache_write.or(pricing.input))
            );
        }
        println!("\n{} models, USD per million tokens", table.len());
        Ok(())
    }
}

fn price(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |p| format!("{:.3}", p))
}

fn pricing_label(status: PricingStatus) -> colored::ColoredString {
    match status {
        PricingStatus::Priced => "".normal(),
        PricingStatus::Mixed => "(partially priced)".yellow(),
        PricingStatus::Unpriced => "(unpriced)".red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use std::path::PathBuf;

    #[test]
    fn test_reports_json_shape() {
        let reports = vec![
            SessionReport {
                path: PathBuf::from("a.jsonl"),
                result: Ok(SessionStats::default()),
            },
            SessionReport {
                path: PathBuf::from("b.jsonl"),
                result: Err(ParseError::Cancelled {
                    path: PathBuf::from("b.jsonl"),
                }),
            },
        ];
        let value: serde_json::Value = serde_json::from_str(&reports_json(&reports, false).unwrap()).unwrap();
        assert_eq!(value[0]["path"], "a.jsonl");
        assert_eq!(value[0]["stats"]["pricingStatus"], "priced");
        assert!(value[0].get("error").is_none());
        assert!(value[1]["error"].as_str().unwrap().contains("cancelled"));
    }

    #[test]
    fn test_models_json() {
        let table = PricingTable::from_toml_str("[models.\"m\"]\ninput = 1.0\n").unwrap();
        let value: serde_json::Value = serde_json::from_str(&models_json(&table, true).unwrap()).unwrap();
        assert_eq!(value[0]["model"], "m");
        assert_eq!(value[0]["output"], serde_json::Value::Null);
    }
}
