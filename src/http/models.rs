use serde::{Deserialize, Serialize};

use crate::db::ConnectionConfig;
use crate::error::Result;
use crate::formats::{DelimitedConfig, Record};
use crate::pipeline::{Direction, FileDescriptor, RunResult, TransferSpec};

/// Query parameters for GET /api/flatfile/columns
#[derive(Debug, Deserialize)]
pub struct FlatFileColumnsParams {
    pub file: Option<String>,
    pub delimiter: Option<String>,
}

/// Request body for POST /api/clickhouse/columns
#[derive(Debug, Deserialize)]
pub struct ColumnsRequest {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub table: String,
}

/// Response body for both column listing routes
#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub columns: Vec<String>,
}

/// Response body for POST /api/clickhouse/tables
#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

/// Connection fields plus the flat file settings of a transfer request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

/// Request body for POST /api/preview and POST /api/ingest
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub config: TransferConfig,
    #[serde(default)]
    pub selected_tables: Option<Vec<String>>,
    #[serde(default)]
    pub join_condition: Option<String>,
    #[serde(default)]
    pub selected_columns: Option<Vec<String>>,
}

impl TransferRequest {
    pub fn into_transfer_spec(self) -> Result<TransferSpec> {
        let direction = Direction::from_source_type(&self.source_type)?;
        let delimiter = DelimitedConfig::from_delimiter(self.config.delimiter.as_deref().unwrap_or_default())?;

        Ok(TransferSpec {
            direction,
            connection: self.config.connection,
            tables: self.selected_tables.unwrap_or_default(),
            join_condition: self.join_condition,
            columns: self.selected_columns.unwrap_or_default(),
            file: self
                .config
                .file_name
                .map(|path| FileDescriptor { path, delimiter }),
        })
    }
}

/// Response body for POST /api/preview
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub data_preview: Vec<Record>,
    pub message: String,
}

/// Response body for POST /api/ingest
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub record_count: u64,
    pub message: String,
    pub run_id: String,
    pub batches_flushed: usize,
    pub coercion_anomalies: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl From<RunResult> for IngestResponse {
    fn from(result: RunResult) -> Self {
        IngestResponse {
            record_count: result.record_count,
            message: "Ingestion successful".to_string(),
            run_id: result.run_id,
            batches_flushed: result.batches_flushed,
            coercion_anomalies: result.coercion_anomalies,
            duration_ms: result.duration.as_millis() as u64,
            output_file: result.output_path.map(|p| p.display().to_string()),
        }
    }
}

/// Response body for POST /api/upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_name: String,
}
