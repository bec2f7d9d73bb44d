//! Single-shot reads: capped previews and metadata discovery
//!
//! Nothing here batches, coerces or writes. Errors surface as-is.

use futures::{StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::PREVIEW_ROW_LIMIT;
use crate::db::{ColumnSchema, ConnectionConfig, Connector};
use crate::error::Result;
use crate::formats::{DelimitedConfig, DelimitedReader, Record};
use crate::io::resolve_in;
use crate::pipeline::{Direction, Stage, TransferSpec};

pub struct PreviewService {
    connector: Arc<dyn Connector>,
    base_dir: PathBuf,
}

impl PreviewService {
    pub fn new(connector: Arc<dyn Connector>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            base_dir: base_dir.into(),
        }
    }

    /// Up to [`PREVIEW_ROW_LIMIT`] rows from the transfer source
    pub async fn preview(&self, spec: &TransferSpec) -> Result<Vec<Record>> {
        spec.validate_for(Stage::Preview)?;

        match spec.direction {
            Direction::DatabaseToFile => {
                let warehouse = self.connector.connect(&spec.connection)?;
                let query = spec.select_query(Some(PREVIEW_ROW_LIMIT));
                debug!(query = %query, "Previewing query");

                // The server applies the LIMIT; the stream is capped as well
                warehouse
                    .query_stream(&query)
                    .await?
                    .take(PREVIEW_ROW_LIMIT)
                    .try_collect()
                    .await
            }
            Direction::FileToDatabase => {
                let path = spec.file_path().unwrap_or_default();
                self.preview_file(path, spec.delimiter()).await
            }
        }
    }

    /// First rows of a delimited file, relative to the base directory
    pub async fn preview_file(&self, file: &str, delimiter: DelimitedConfig) -> Result<Vec<Record>> {
        let path = resolve_in(&self.base_dir, file)?;
        DelimitedReader::new(path, delimiter)
            .read_preview(PREVIEW_ROW_LIMIT)
            .await
    }

    /// Header of a delimited file
    pub async fn file_columns(&self, file: &str, delimiter: DelimitedConfig) -> Result<Vec<String>> {
        let path = resolve_in(&self.base_dir, file)?;
        DelimitedReader::new(path, delimiter).read_header().await
    }

    pub async fn list_tables(&self, connection: &ConnectionConfig) -> Result<Vec<String>> {
        let warehouse = self.connector.connect(connection)?;
        warehouse.list_tables().await
    }

    pub async fn describe_table(
        &self,
        connection: &ConnectionConfig,
        table: &str,
    ) -> Result<ColumnSchema> {
        let warehouse = self.connector.connect(connection)?;
        warehouse.describe_table(table).await
    }
}
