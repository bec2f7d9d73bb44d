//! High-level runner API for the ClickHouse bridge.
//!
//! Wraps connector setup, telemetry aggregation, interrupt handling and the
//! HTTP server behind a handful of functions. This is the API the CLI uses.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::{ClickHouseConnector, ColumnSchema, ConnectionConfig, Connector};
use crate::formats::{DelimitedConfig, Record};
use crate::http::{AppServer, AppState};
use crate::pipeline::{FileDescriptor, Pipeline, PipelineOptions, PipelineOptionsBuilder, TransferSpec};
use crate::preview::PreviewService;
use crate::telemetry::{ProgressStats, TelemetryEvent};

pub use crate::coercion::CoercionPolicy;
pub use crate::pipeline::Direction;

/// ClickHouse connection settings
#[derive(Debug, Clone, Default)]
pub struct ConnectionArgs {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub jwt: Option<String>,
    pub use_tls: bool,
}

impl ConnectionArgs {
    fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port.to_string(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            jwt: self.jwt.clone(),
            use_tls: self.use_tls,
            timeout_secs: None,
        }
    }
}

/// Arguments for a transfer or a preview
#[derive(Clone)]
pub struct TransferArgs {
    pub connection: ConnectionArgs,
    pub direction: Direction,

    // Database side: source tables, or the destination table for imports
    pub tables: Vec<String>,
    pub join_condition: Option<String>,
    pub columns: Vec<String>,

    // File side, relative to base_dir
    pub file: Option<String>,
    pub delimiter: String,
    pub base_dir: PathBuf,

    pub batch_size: usize,
    pub coercion_policy: CoercionPolicy,

    // Test-only: replace the ClickHouse connector
    #[cfg(test)]
    pub test_connector: Option<Arc<dyn Connector>>,
}

impl TransferArgs {
    fn transfer_spec(&self) -> Result<TransferSpec> {
        let delimiter = DelimitedConfig::from_delimiter(&self.delimiter)?;
        Ok(TransferSpec {
            direction: self.direction,
            connection: self.connection.to_config(),
            tables: self.tables.clone(),
            join_condition: self.join_condition.clone(),
            columns: self.columns.clone(),
            file: self.file.clone().map(|path| FileDescriptor { path, delimiter }),
        })
    }

    fn pipeline_options(&self) -> Result<PipelineOptions> {
        PipelineOptionsBuilder::default()
            .base_dir(self.base_dir.clone())
            .batch_size(self.batch_size)
            .coercion_policy(self.coercion_policy)
            .build()
            .context("Invalid pipeline options")
    }

    fn connector(&self) -> Arc<dyn Connector> {
        #[cfg(test)]
        if let Some(connector) = &self.test_connector {
            return Arc::clone(connector);
        }

        Arc::new(ClickHouseConnector)
    }
}

/// Outcome of a successful transfer
#[derive(Debug)]
pub struct TransferSummary {
    pub run_id: String,
    pub direction: Direction,
    pub record_count: u64,
    pub batches_flushed: usize,
    pub coercion_anomalies: u64,
    pub duration: Duration,
    /// Export file for ClickHouse to file transfers
    pub output_path: Option<PathBuf>,
    /// p50, p90, p99 batch flush latency in milliseconds
    pub batch_latency_ms: (Option<u64>, Option<u64>, Option<u64>),
}

/// Run a full transfer
///
/// Ctrl-C cancels the run at the next batch boundary. Batches already
/// written stay written.
///
/// # Example
///
/// ```no_run
/// use clickhouse_bridge::runner::{CoercionPolicy, ConnectionArgs, Direction, TransferArgs, run_transfer};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = TransferArgs {
///     connection: ConnectionArgs {
///         host: "localhost".to_string(),
///         port: 8123,
///         database: "default".to_string(),
///         user: "default".to_string(),
///         password: None,
///         jwt: Some("token".to_string()),
///         use_tls: false,
///     },
///     direction: Direction::FileToDatabase,
///     tables: vec!["events".to_string()],
///     join_condition: None,
///     columns: vec!["id".to_string(), "name".to_string()],
///     file: Some("uploads/events.csv".to_string()),
///     delimiter: ",".to_string(),
///     base_dir: ".".into(),
///     batch_size: 1000,
///     coercion_policy: CoercionPolicy::Lenient,
/// };
///
/// let summary = run_transfer(args).await?;
/// println!("Moved {} records in {:?}", summary.record_count, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_transfer(args: TransferArgs) -> Result<TransferSummary> {
    let spec = args.transfer_spec()?;
    let options = args.pipeline_options()?;

    // Aggregate telemetry until the pipeline drops its sender
    let (telemetry_tx, mut telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
    let stats_handle = tokio::spawn(async move {
        let mut stats = ProgressStats::new();
        while let Some(event) = telemetry_rx.recv().await {
            stats.update(&event);
        }
        stats
    });

    let cancel = CancellationToken::new();
    let interrupt_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping at the next batch boundary");
                cancel.cancel();
            }
        })
    };

    let pipeline = Pipeline::new(args.connector(), options).with_telemetry(telemetry_tx);
    let result = pipeline.run(&spec, &cancel).await;
    drop(pipeline);
    interrupt_handle.abort();

    let stats = stats_handle
        .await
        .context("Telemetry aggregation task failed")?;

    if let Some(e) = result.error {
        return Err(anyhow::Error::new(e).context("Ingestion failed"));
    }

    Ok(TransferSummary {
        run_id: result.run_id,
        direction: result.direction,
        record_count: result.record_count,
        batches_flushed: result.batches_flushed,
        coercion_anomalies: result.coercion_anomalies,
        duration: result.duration,
        output_path: result.output_path,
        batch_latency_ms: stats.get_percentiles(),
    })
}

/// Fetch at most 100 rows from the transfer source
pub async fn run_preview(args: TransferArgs) -> Result<Vec<Record>> {
    let spec = args.transfer_spec()?;
    let service = PreviewService::new(args.connector(), args.base_dir.clone());
    service.preview(&spec).await.context("Preview failed")
}

/// Tables in the configured database
pub async fn list_tables(connection: &ConnectionArgs) -> Result<Vec<String>> {
    let service = PreviewService::new(Arc::new(ClickHouseConnector), PathBuf::new());
    service
        .list_tables(&connection.to_config())
        .await
        .context("Failed to fetch tables")
}

/// Column names and types of a table
pub async fn describe_columns(connection: &ConnectionArgs, table: &str) -> Result<ColumnSchema> {
    let service = PreviewService::new(Arc::new(ClickHouseConnector), PathBuf::new());
    service
        .describe_table(&connection.to_config(), table)
        .await
        .context("Failed to fetch columns")
}

/// Header of a delimited file under `base_dir`
pub async fn read_header(base_dir: PathBuf, file: &str, delimiter: &str) -> Result<Vec<String>> {
    let delimiter = DelimitedConfig::from_delimiter(delimiter)?;
    let service = PreviewService::new(Arc::new(ClickHouseConnector), base_dir);
    service
        .file_columns(file, delimiter)
        .await
        .context("Failed to fetch flat file columns")
}

/// Arguments for the HTTP server
#[derive(Debug, Clone)]
pub struct ServeArgs {
    pub bind: String,
    pub base_dir: PathBuf,
    pub batch_size: usize,
    pub coercion_policy: CoercionPolicy,
}

/// Serve the HTTP API until Ctrl-C
///
/// On shutdown, in-flight ingestion runs are cancelled at their next batch
/// boundary and the server drains open connections.
pub async fn serve(args: ServeArgs) -> Result<()> {
    let options = PipelineOptionsBuilder::default()
        .base_dir(args.base_dir.clone())
        .batch_size(args.batch_size)
        .coercion_policy(args.coercion_policy)
        .build()
        .context("Invalid server options")?;

    let shutdown = CancellationToken::new();
    let server = AppServer::new(AppState {
        connector: Arc::new(ClickHouseConnector),
        options,
        shutdown: shutdown.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(
        address = %listener.local_addr()?,
        base_dir = %args.base_dir.display(),
        "HTTP server listening"
    );

    axum::serve(listener, server.router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
