use axum::{
    Json,
    extract::{Multipart, Query as QueryParams, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::ConnectionConfig;
use crate::formats::DelimitedConfig;
use crate::http::app_server::AppState;
use crate::http::error::ApiError;
use crate::http::models::{
    ColumnsRequest, ColumnsResponse, FlatFileColumnsParams, IngestResponse, PreviewResponse,
    TablesResponse, TransferRequest, UploadResponse,
};
use crate::pipeline::Direction;

/// Handler for GET /health
pub async fn health_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "clickhouse-bridge"
        })),
    )
}

/// Handler for GET /api/flatfile/columns
pub async fn flatfile_columns_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(params): QueryParams<FlatFileColumnsParams>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    let file = params
        .file
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("File parameter is required."))?;
    let delimiter = DelimitedConfig::from_delimiter(params.delimiter.as_deref().unwrap_or_default())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let columns = state
        .preview_service()
        .file_columns(&file, delimiter)
        .await
        .map_err(|e| ApiError::from_bridge("Failed to fetch flat file columns", e))?;

    Ok(Json(ColumnsResponse { columns }))
}

/// Handler for POST /api/clickhouse/tables
pub async fn tables_handler(
    State(state): State<Arc<AppState>>,
    Json(connection): Json<ConnectionConfig>,
) -> Result<Json<TablesResponse>, ApiError> {
    let tables = state
        .preview_service()
        .list_tables(&connection)
        .await
        .map_err(|e| ApiError::from_bridge("Failed to fetch tables", e))?;

    Ok(Json(TablesResponse { tables }))
}

/// Handler for POST /api/clickhouse/columns
pub async fn columns_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ColumnsRequest>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    if request.table.trim().is_empty() {
        return Err(ApiError::bad_request(
            "Missing ClickHouse connection parameters or table.",
        ));
    }

    let schema = state
        .preview_service()
        .describe_table(&request.connection, request.table.trim())
        .await
        .map_err(|e| ApiError::from_bridge("Failed to fetch columns", e))?;

    Ok(Json(ColumnsResponse {
        columns: schema.names(),
    }))
}

/// Handler for POST /api/preview
pub async fn preview_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let spec = request
        .into_transfer_spec()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let data_preview = match state.preview_service().preview(&spec).await {
        Ok(rows) => rows,
        Err(e) if e.is_caller_error() => return Err(ApiError::bad_request(e.to_string())),
        // An unreadable file is the caller's file
        Err(e) if spec.direction == Direction::FileToDatabase => {
            return Err(ApiError::bad_request(format!("CSV preview failed: {}", e)));
        }
        Err(e) => return Err(ApiError::from_bridge("Preview failed", e)),
    };

    Ok(Json(PreviewResponse {
        data_preview,
        message: "Preview retrieval successful".to_string(),
    }))
}

/// Handler for POST /api/ingest
///
/// The run executes on its own task. If the client goes away the run is
/// cancelled at its next batch boundary instead of being dropped mid-batch.
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let spec = request
        .into_transfer_spec()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let pipeline = state.pipeline();
    let handle = tokio::spawn(async move { pipeline.run(&spec, &cancel).await });
    let mut result = handle
        .await
        .map_err(|e| ApiError::internal_error(format!("Ingestion failed: {}", e)))?;

    match result.error.take() {
        None => {
            info!(
                run_id = %result.run_id,
                records = result.record_count,
                "Ingestion request completed"
            );
            Ok(Json(result.into()))
        }
        Some(e) => Err(ApiError::from_bridge("Ingestion failed", e)),
    }
}

/// Handler for POST /api/upload
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("File upload failed: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("File upload failed: {}", e)))?;

        let file_name = state
            .uploads()
            .save(&file_name, &contents)
            .await
            .map_err(|e| ApiError::from_bridge("File upload failed", e))?;

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully.".to_string(),
            file_name,
        }));
    }

    warn!("Upload request without a file field");
    Err(ApiError::bad_request("No file uploaded."))
}
