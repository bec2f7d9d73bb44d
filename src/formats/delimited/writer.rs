use csv::WriterBuilder;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::formats::reader::{Batch, DelimitedConfig, Record};

/// Batched CSV writer for query results
///
/// The header row is the projected column list. Values are written as their
/// plain text representation; CSV carries no types.
pub struct CsvBatchWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    columns: Vec<String>,
    rows_written: u64,
}

impl CsvBatchWriter {
    /// Create (or truncate) the file, creating parent directories as needed,
    /// and write the header row
    pub async fn create(
        path: impl AsRef<Path>,
        columns: Vec<String>,
        config: DelimitedConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::task::spawn_blocking(move || Self::create_blocking(path, columns, &config)).await?
    }

    fn create_blocking(path: PathBuf, columns: Vec<String>, config: &DelimitedConfig) -> Result<Self> {
        let file = File::create(&path)?;
        let mut writer = WriterBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .from_writer(file);
        writer.write_record(&columns)?;

        Ok(Self {
            writer,
            path,
            columns,
            rows_written: 0,
        })
    }

    /// Append a batch, blocking on file I/O. Returns the rows written.
    ///
    /// Each column is looked up by name and falls back to the value at the
    /// same position, since ClickHouse may report `t.col` as `col`.
    pub fn write_batch(&mut self, batch: &[Record]) -> Result<u64> {
        for row in batch {
            let fields = self
                .columns
                .iter()
                .enumerate()
                .map(|(idx, column)| field_text(row.get(column).or_else(|| row.values().nth(idx))));
            self.writer.write_record(fields)?;
        }

        self.rows_written += batch.len() as u64;
        Ok(batch.len() as u64)
    }

    /// Append a batch on the blocking thread pool, handing the writer back
    pub async fn write_batch_async(mut self, batch: Batch) -> Result<(Self, u64)> {
        let (writer, written) = tokio::task::spawn_blocking(move || {
            let written = self.write_batch(&batch);
            (self, written)
        })
        .await?;

        Ok((writer, written?))
    }

    /// Flush buffered rows and sync the file to storage
    ///
    /// Only after this returns are all rows durable; the total row count is
    /// returned.
    pub fn finish(self) -> Result<u64> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| BridgeError::File(format!("Failed to flush CSV output: {}", e)))?;
        file.sync_all()?;
        debug!(path = %self.path.display(), rows = self.rows_written, "CSV output synced");
        Ok(self.rows_written)
    }

    pub async fn finish_async(self) -> Result<u64> {
        tokio::task::spawn_blocking(move || self.finish()).await?
    }
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
