//! Line-oriented JSONL reading.

use crate::error::ParseError;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lazily yields one JSON value per non-empty line, in file order.
///
/// Lines that are not valid JSON (including invalid UTF-8) are skipped with a
/// warning. Any other I/O failure ends the iteration with [`ParseError::Read`].
pub struct TranscriptReader<R> {
    reader: R,
    source: PathBuf,
    buf: Vec<u8>,
    line_number: usize,
    skipped: usize,
    done: bool,
}

impl TranscriptReader<BufReader<File>> {
    pub fn open(path: &Path, buffer_size: usize) -> Result<Self, ParseError> {
        let file = File::open(path).map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::with_capacity(buffer_size.max(1), file), path))
    }
}

impl<R: BufRead> TranscriptReader<R> {
    pub fn new(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            source: source.into(),
            buf: Vec::new(),
            line_number: 0,
            skipped: 0,
            done: false,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Number of the last line read (1-based).
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Non-empty lines dropped because they did not decode.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for TranscriptReader<R> {
    type Item = Result<(usize, Value), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_number += 1;
                    let line = trim_line(&self.buf);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<Value>(line) {
                        Ok(value) => return Some(Ok((self.line_number, value))),
                        Err(e) => {
                            self.skipped += 1;
                            warn!(
                                file = %self.source.display(),
                                line = self.line_number,
                                error = %e,
                                "Skipping malformed transcript line"
                            );
                        }
                    }
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(ParseError::Read {
                        path: self.source.clone(),
                        line: self.line_number + 1,
                        source,
                    }));
                }
            }
        }
        None
    }
}

fn trim_line(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
