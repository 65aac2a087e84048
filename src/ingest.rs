//! Dataset reader
//!
//! Reads posts from a JSON Lines file (one post per line) or from a file
//! holding a single JSON array of posts. Every record carries its 1-based
//! position so malformed records can be reported and skipped individually
//! and checkpoints can name how far a run got.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};

use crate::models::{Post, RawPost};
use crate::utils::error::RecordError;

/// Layout of a dataset file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    JsonLines,
    JsonArray,
}

/// One dataset record, parsed or rejected
#[derive(Debug)]
pub struct SourceRecord {
    /// Line number (JSON Lines) or element number (JSON array), 1-based
    pub line: usize,
    pub result: Result<Post, RecordError>,
}

/// Parse one JSON Lines line; blank lines yield `None`
pub fn parse_line(line: usize, text: &str) -> Option<SourceRecord> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let result = serde_json::from_str::<RawPost>(text)
        .map_err(|source| RecordError::InvalidJson { line, source })
        .and_then(Post::try_from);
    Some(SourceRecord { line, result })
}

/// Parse one element of a JSON array dataset
pub fn parse_value(line: usize, value: serde_json::Value) -> SourceRecord {
    let result = serde_json::from_value::<RawPost>(value)
        .map_err(|source| RecordError::InvalidJson { line, source })
        .and_then(Post::try_from);
    SourceRecord { line, result }
}

enum Source {
    Lines {
        lines: Lines<BufReader<File>>,
        line: usize,
    },
    Array {
        values: std::vec::IntoIter<serde_json::Value>,
        line: usize,
    },
}

/// Streaming reader over a dataset file
pub struct DatasetReader {
    source: Source,
    format: DatasetFormat,
    batch_size: usize,
}

impl DatasetReader {
    /// Open a dataset, detecting its format from the first non-blank byte
    pub async fn open(path: &Path, batch_size: usize) -> io::Result<Self> {
        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);

        let starts_with_array = {
            let buf = reader.fill_buf().await?;
            buf.iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'[')
        };

        let (source, format) = if starts_with_array {
            let mut content = String::new();
            reader.read_to_string(&mut content).await?;
            let values: Vec<serde_json::Value> = serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            (
                Source::Array {
                    values: values.into_iter(),
                    line: 0,
                },
                DatasetFormat::JsonArray,
            )
        } else {
            (
                Source::Lines {
                    lines: reader.lines(),
                    line: 0,
                },
                DatasetFormat::JsonLines,
            )
        };

        tracing::debug!(path = %path.display(), ?format, "Dataset opened");
        Ok(Self {
            source,
            format,
            batch_size: batch_size.max(1),
        })
    }

    pub fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Next record, or `None` at end of file
    pub async fn next_record(&mut self) -> io::Result<Option<SourceRecord>> {
        match &mut self.source {
            Source::Lines { lines, line } => {
                while let Some(text) = lines.next_line().await? {
                    *line += 1;
                    if let Some(record) = parse_line(*line, &text) {
                        return Ok(Some(record));
                    }
                }
                Ok(None)
            }
            Source::Array { values, line } => Ok(values.next().map(|value| {
                *line += 1;
                parse_value(*line, value)
            })),
        }
    }

    /// Up to `batch_size` records; empty at end of file
    pub async fn next_batch(&mut self) -> io::Result<Vec<SourceRecord>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.next_record().await? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        Ok(batch)
    }
}
