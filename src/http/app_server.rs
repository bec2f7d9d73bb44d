use crate::config::MAX_UPLOAD_SIZE;
use crate::db::Connector;
use crate::http::handlers::{
    columns_handler, flatfile_columns_handler, health_handler, ingest_handler, preview_handler,
    tables_handler, upload_handler,
};
use crate::io::UploadStore;
use crate::pipeline::{Pipeline, PipelineOptions};
use crate::preview::PreviewService;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared, immutable server state. Runs build their own clients from it.
pub struct AppState {
    pub connector: Arc<dyn Connector>,
    pub options: PipelineOptions,
    /// Cancelled on server shutdown; every ingestion run listens on a child
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.connector), self.options.clone())
    }

    pub fn preview_service(&self) -> PreviewService {
        PreviewService::new(Arc::clone(&self.connector), self.options.base_dir.clone())
    }

    pub fn uploads(&self) -> UploadStore {
        UploadStore::new(&self.options.base_dir)
    }
}

pub struct AppServer {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub const PATH_HEALTH: &str = "/health";
pub const PATH_FLATFILE_COLUMNS: &str = "/api/flatfile/columns";
pub const PATH_CLICKHOUSE_TABLES: &str = "/api/clickhouse/tables";
pub const PATH_CLICKHOUSE_COLUMNS: &str = "/api/clickhouse/columns";
pub const PATH_PREVIEW: &str = "/api/preview";
pub const PATH_INGEST: &str = "/api/ingest";
pub const PATH_UPLOAD: &str = "/api/upload";

impl AppServer {
    pub fn new(state: AppState) -> Self {
        let state = Arc::new(state);
        AppServer {
            router: Router::new()
                .route(PATH_HEALTH, get(health_handler))
                .route(PATH_FLATFILE_COLUMNS, get(flatfile_columns_handler))
                .route(PATH_CLICKHOUSE_TABLES, post(tables_handler))
                .route(PATH_CLICKHOUSE_COLUMNS, post(columns_handler))
                .route(PATH_PREVIEW, post(preview_handler))
                .route(PATH_INGEST, post(ingest_handler))
                .route(
                    PATH_UPLOAD,
                    post(upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
                )
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .with_state(state.clone()),
            state,
        }
    }
}
