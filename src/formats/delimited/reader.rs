use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::Value;
use std::fs::File;
use std::path::Path;

use crate::config::MAX_BATCH_PREALLOCATION;
use crate::error::{BridgeError, Result};
use crate::formats::reader::{Batch, DelimitedConfig, Record};
use crate::io::LocalFile;

/// Delimited file reader (CSV, TSV, ...) over a local file
///
/// The first line is the header. Every record is keyed by the trimmed header
/// names in file order.
pub struct DelimitedReader {
    file: LocalFile,
    config: DelimitedConfig,
}

impl DelimitedReader {
    pub fn new(path: impl AsRef<Path>, config: DelimitedConfig) -> Self {
        Self {
            file: LocalFile::new(path),
            config,
        }
    }

    /// Column names from the first line, split on the delimiter and trimmed
    ///
    /// This is a plain split: a delimiter inside quotes still splits. One pair
    /// of surrounding quotes is removed from each name so the names match the
    /// keys of parsed records. A header without the delimiter yields a single
    /// column.
    pub async fn read_header(&self) -> Result<Vec<String>> {
        let line = self.file.read_first_line().await?;
        let delimiter = self.config.delimiter_as_string();

        Ok(line
            .split(delimiter.as_str())
            .map(|column| unquote(column.trim(), self.config.quote as char).to_string())
            .collect())
    }

    /// Read at most `max_rows` records, leaving the rest of the file unread
    pub async fn read_preview(&self, max_rows: usize) -> Result<Vec<Record>> {
        let reader = self.open_batches(max_rows).await?;
        if max_rows == 0 {
            return Ok(Vec::new());
        }

        let (_, batch) = reader.next_batch_async().await?;
        Ok(batch.unwrap_or_default())
    }

    /// Open the file for batched reading
    pub async fn open_batches(&self, batch_size: usize) -> Result<BatchReader> {
        self.file.ensure_readable().await?;

        let path = self.file.path().to_path_buf();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || BatchReader::open(&path, &config, batch_size)).await?
    }
}

/// Pull-based batch sequence over an open delimited file
///
/// Holds one parsed record and at most one batch in memory at a time.
pub struct BatchReader {
    reader: csv::Reader<File>,
    headers: Vec<String>,
    batch_size: usize,
    record: StringRecord,
    records_read: u64,
    exhausted: bool,
}

impl BatchReader {
    fn open(path: &Path, config: &DelimitedConfig, batch_size: usize) -> Result<Self> {
        let file = File::open(path)?;

        // Field counts are checked against the header here rather than by the
        // csv crate so that whitespace-only lines can be skipped.
        let mut reader = ReaderBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(file);

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        Ok(Self {
            reader,
            headers,
            batch_size: batch_size.max(1),
            record: StringRecord::new(),
            records_read: 0,
            exhausted: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data records handed out so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Byte offset the parser has reached in the file
    pub fn bytes_consumed(&self) -> u64 {
        self.reader.position().byte()
    }

    /// Read the next batch, blocking on file I/O
    ///
    /// Returns a full batch while enough records remain, then one shorter
    /// batch with the remainder, then `None`. A malformed row ends the
    /// sequence with an error.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        match self.fill_batch() {
            Ok(batch) if batch.is_empty() => Ok(None),
            Ok(batch) => Ok(Some(batch)),
            Err(e) => {
                self.exhausted = true;
                Err(e)
            }
        }
    }

    /// Read the next batch on the blocking thread pool
    ///
    /// The reader moves into the blocking task and is handed back with the
    /// batch, so no two reads of the same file ever overlap.
    pub async fn next_batch_async(mut self) -> Result<(Self, Option<Batch>)> {
        let (reader, batch) = tokio::task::spawn_blocking(move || {
            let batch = self.next_batch();
            (self, batch)
        })
        .await?;

        Ok((reader, batch?))
    }

    fn fill_batch(&mut self) -> Result<Batch> {
        let mut batch = Vec::with_capacity(self.batch_size.min(MAX_BATCH_PREALLOCATION));

        while batch.len() < self.batch_size {
            if !self.reader.read_record(&mut self.record)? {
                self.exhausted = true;
                break;
            }

            if is_blank(&self.record) {
                continue;
            }

            if self.record.len() != self.headers.len() {
                let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                return Err(BridgeError::Parse(format!(
                    "Invalid record length on line {}: expected {} fields, found {}",
                    line,
                    self.headers.len(),
                    self.record.len()
                )));
            }

            batch.push(build_record(&self.headers, &self.record));
            self.records_read += 1;
        }

        Ok(batch)
    }
}

impl Iterator for BatchReader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

fn unquote(field: &str, quote: char) -> &str {
    field
        .strip_prefix(quote)
        .and_then(|inner| inner.strip_suffix(quote))
        .unwrap_or(field)
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.is_empty()) && record.len() <= 1
}

fn build_record(headers: &[String], fields: &StringRecord) -> Record {
    headers
        .iter()
        .zip(fields.iter())
        .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
        .collect()
}
