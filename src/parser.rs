use crate::aggregator::SessionAggregator;
use crate::config::EngineConfig;
use crate::error::ParseError;
use crate::models::{Provider, SessionStats};
use crate::providers::{self, TranscriptFormat};
use crate::reader::TranscriptReader;
use crate::record::DecodedLine;
use crate::timestamp_parser::TimestampParser;
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

// Trait for custom JSONL processing
pub trait JsonlProcessor {
    type Output;

    fn process_entry(&mut self, entry: &Value, line_number: usize);
    fn finalize(self) -> Self::Output;
}

/// Which transcript format to decode with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderSelection {
    /// Decide from the first recognizable line
    #[default]
    Auto,
    Codex,
    ClaudeCode,
}

impl ProviderSelection {
    pub fn format(&self) -> Option<&'static dyn TranscriptFormat> {
        match self {
            ProviderSelection::Auto => None,
            ProviderSelection::Codex => Some(providers::format_for(Provider::Codex)),
            ProviderSelection::ClaudeCode => Some(providers::format_for(Provider::ClaudeCode)),
        }
    }
}

impl From<Provider> for ProviderSelection {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Codex => ProviderSelection::Codex,
            Provider::ClaudeCode => ProviderSelection::ClaudeCode,
        }
    }
}

/// Cooperative cancellation shared between a caller and running parses.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decodes lines with one provider format and feeds a [`SessionAggregator`].
///
/// Without a fixed format the first line any known format recognizes picks
/// it; earlier lines only contribute their timestamps.
pub struct StatsProcessor<'a> {
    aggregator: SessionAggregator<'a>,
    format: Option<&'a dyn TranscriptFormat>,
}

impl<'a> StatsProcessor<'a> {
    pub fn new(config: &'a EngineConfig, format: Option<&'a dyn TranscriptFormat>) -> Self {
        let mut aggregator = SessionAggregator::new(config);
        if let Some(format) = format {
            aggregator.set_provider(format.provider());
        }
        Self { aggregator, format }
    }

    fn select_format(&mut self, entry: &Value) -> Option<&'a dyn TranscriptFormat> {
        if self.format.is_none() {
            if let Some(format) = providers::detect(entry) {
                debug!(provider = %format.provider(), "Detected transcript format");
                self.format = Some(format);
                self.aggregator.set_provider(format.provider());
            }
        }
        self.format
    }
}

impl<'a> JsonlProcessor for StatsProcessor<'a> {
    type Output = SessionStats;

    fn process_entry(&mut self, entry: &Value, line_number: usize) {
        let timestamp = TimestampParser::from_line(entry);

        let records = match self.select_format(entry) {
            Some(format) => match format.decode(entry) {
                Ok(records) => records,
                Err(e) => {
                    debug!(line = line_number, error = %e, "Skipping undecodable record");
                    return;
                }
            },
            None => Vec::new(),
        };

        self.aggregator.apply_line(&DecodedLine { timestamp, records });
    }

    fn finalize(self) -> Self::Output {
        self.aggregator.finish()
    }
}

/// Parse one transcript into statistics with a given format.
pub trait SessionParser {
    fn parse_session(&self, path: &Path, config: &EngineConfig) -> Result<SessionStats, ParseError>;
}

impl<T: TranscriptFormat> SessionParser for T {
    fn parse_session(&self, path: &Path, config: &EngineConfig) -> Result<SessionStats, ParseError> {
        let reader = TranscriptReader::open(path, config.buffer_size)?;
        drive(reader, StatsProcessor::new(config, Some(self)), None)
    }
}

pub struct FileParser {
    config: Arc<EngineConfig>,
    selection: ProviderSelection,
}

impl FileParser {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            selection: ProviderSelection::Auto,
        }
    }

    pub fn with_provider(mut self, selection: ProviderSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parse_file(&self, path: &Path) -> Result<SessionStats, ParseError> {
        let processor = StatsProcessor::new(&self.config, self.selection.format());
        self.process_jsonl_file(path, processor, None)
    }

    pub fn parse_file_with_cancel(&self, path: &Path, cancel: &CancelFlag) -> Result<SessionStats, ParseError> {
        let processor = StatsProcessor::new(&self.config, self.selection.format());
        self.process_jsonl_file(path, processor, Some(cancel))
    }

    /// Parse an already-open transcript; `source` names it in logs and errors.
    pub fn parse_reader<R: BufRead>(
        &self,
        reader: R,
        source: &Path,
        cancel: Option<&CancelFlag>,
    ) -> Result<SessionStats, ParseError> {
        let processor = StatsProcessor::new(&self.config, self.selection.format());
        drive(TranscriptReader::new(reader, source), processor, cancel)
    }

    // Generic method that accepts any processor
    pub fn process_jsonl_file<P: JsonlProcessor>(
        &self,
        path: &Path,
        processor: P,
        cancel: Option<&CancelFlag>,
    ) -> Result<P::Output, ParseError> {
        let reader = TranscriptReader::open(path, self.config.buffer_size)?;
        drive(reader, processor, cancel)
    }
}

fn drive<R: BufRead, P: JsonlProcessor>(
    mut reader: TranscriptReader<R>,
    mut processor: P,
    cancel: Option<&CancelFlag>,
) -> Result<P::Output, ParseError> {
    let mut records = 0usize;
    loop {
        if cancel.map_or(false, CancelFlag::is_cancelled) {
            return Err(ParseError::Cancelled {
                path: reader.source().to_path_buf(),
            });
        }
        match reader.next() {
            Some(item) => {
                let (line_number, entry) = item?;
                processor.process_entry(&entry, line_number);
                records += 1;
            }
            None => break,
        }
    }

    debug!(
        file = %reader.source().display(),
        lines = reader.line_number(),
        records,
        skipped = reader.skipped_lines(),
        "Finished reading transcript"
    );

    Ok(processor.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parser() -> FileParser {
        FileParser::new(Arc::new(EngineConfig::builtin().unwrap()))
    }

    const CODEX_LINES: &str = concat!(
        r#"{"timestamp":"2025-10-01T10:00:00Z","type":"session_meta","payload":{"cwd":"/w"}}"#,
        "\n",
        r#"{"timestamp":"2025-10-01T10:00:01Z","type":"event_msg","payload":{"type":"user_message","message":"hi"}}"#,
        "\n",
        r#"{"timestamp":"2025-10-01T10:00:04Z","type":"event_msg","payload":{"type":"agent_message","message":"hello"}}"#,
        "\n"
    );

    #[test]
    fn test_auto_detects_codex() {
        let stats = parser()
            .parse_reader(Cursor::new(CODEX_LINES), Path::new("mem.jsonl"), None)
            .unwrap();
        assert_eq!(stats.provider, Some(Provider::Codex));
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.latency.samples, 1);
        assert_eq!(stats.latency.max_ms, 3000);
        assert_eq!(stats.duration_ms, 4000);
    }

    #[test]
    fn test_lines_before_detection_count_for_duration() {
        let input = format!(
            "{}\n{}",
            r#"{"timestamp":"2025-10-01T09:59:00Z","note":"preamble"}"#,
            CODEX_LINES
        );
        let stats = parser()
            .parse_reader(Cursor::new(input), Path::new("mem.jsonl"), None)
            .unwrap();
        assert_eq!(stats.duration_ms, 64_000);
    }

    #[test]
    fn test_fixed_provider_ignores_foreign_lines() {
        let stats = parser()
            .with_provider(ProviderSelection::ClaudeCode)
            .parse_reader(Cursor::new(CODEX_LINES), Path::new("mem.jsonl"), None)
            .unwrap();
        assert_eq!(stats.provider, Some(Provider::ClaudeCode));
        assert_eq!(stats.message_count, 0);
    }

    #[test]
    fn test_cancelled_parse_returns_no_stats() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = parser()
            .parse_reader(Cursor::new(CODEX_LINES), Path::new("mem.jsonl"), Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, ParseError::Cancelled { .. }));
    }

    #[test]
    fn test_unrecognized_input_yields_empty_stats() {
        let stats = parser()
            .parse_reader(Cursor::new("{\"a\":1}\n[1,2]\n"), Path::new("mem.jsonl"), None)
            .unwrap();
        assert_eq!(stats.provider, None);
        assert_eq!(stats, SessionStats::default());
    }

    struct LineCounter(usize);

    impl JsonlProcessor for LineCounter {
        type Output = usize;

        fn process_entry(&mut self, _entry: &Value, _line_number: usize) {
            self.0 += 1;
        }

        fn finalize(self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_custom_processor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::write(&path, format!("{}garbage\n\n", CODEX_LINES)).unwrap();
        assert_eq!(parser().process_jsonl_file(&path, LineCounter(0), None).unwrap(), 3);
    }
}
