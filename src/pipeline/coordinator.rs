use derive_builder::Builder;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::transfer::{Direction, Stage, TransferSpec};
use super::{export, import};
use crate::coercion::CoercionPolicy;
use crate::config::{DEFAULT_BATCH_SIZE, OUTPUT_DIR, OUTPUT_FILE_NAME};
use crate::db::Connector;
use crate::error::{BridgeError, Result};
use crate::telemetry::TelemetryEvent;

/// Settings shared by every run of a pipeline
#[derive(Debug, Clone, Builder)]
pub struct PipelineOptions {
    /// Root for caller supplied file paths and for the export file
    #[builder(setter(into))]
    pub base_dir: PathBuf,
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,
    #[builder(default)]
    pub coercion_policy: CoercionPolicy,
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Validating,
    Streaming,
    Flushing,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Validating => "validating",
            RunState::Streaming => "streaming",
            RunState::Flushing => "flushing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Terminal outcome of a run, produced exactly once
#[derive(Debug)]
pub struct RunResult {
    pub run_id: String,
    pub direction: Direction,
    /// Records durably written to the sink
    pub record_count: u64,
    pub batches_flushed: usize,
    /// Values sent as null because they did not fit their column
    pub coercion_anomalies: u64,
    pub duration: Duration,
    pub status: RunStatus,
    pub error: Option<BridgeError>,
    /// Export file, for database to file runs
    pub output_path: Option<PathBuf>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Per-run bookkeeping: state transitions, counters and telemetry
pub(crate) struct RunProgress {
    run_id: String,
    state: RunState,
    records: u64,
    batches: usize,
    anomalies: u64,
    telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl RunProgress {
    fn new(run_id: String, telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            records: 0,
            batches: 0,
            anomalies: 0,
            telemetry_tx,
        }
    }

    pub(crate) fn transition(&mut self, next: RunState) {
        info!(run_id = %self.run_id, from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }

    /// Rows durably written so far
    pub(crate) fn records(&self) -> u64 {
        self.records
    }

    pub(crate) fn batch_flushed(&mut self, records: u64, anomalies: u64, elapsed: Duration) {
        self.records += records;
        self.batches += 1;
        self.anomalies += anomalies;
        info!(
            run_id = %self.run_id,
            batch = self.batches,
            records,
            total = self.records,
            "Batch flushed"
        );
        self.emit(TelemetryEvent::BatchFlushed {
            records,
            coercion_anomalies: anomalies,
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.telemetry_tx {
            // Receiver may have gone away; progress reporting is best effort
            let _ = tx.send(event);
        }
    }
}

/// Runs transfers. Each run connects on its own and shares nothing mutable.
pub struct Pipeline {
    connector: Arc<dyn Connector>,
    options: PipelineOptions,
    telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl Pipeline {
    pub fn new(connector: Arc<dyn Connector>, options: PipelineOptions) -> Self {
        Self {
            connector,
            options,
            telemetry_tx: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        self.telemetry_tx = Some(telemetry_tx);
        self
    }

    /// Where database to file runs write
    pub fn output_path(&self) -> PathBuf {
        self.options.base_dir.join(OUTPUT_DIR).join(OUTPUT_FILE_NAME)
    }

    /// Execute one transfer to completion
    ///
    /// Never returns early with an error: every outcome, validation failures
    /// included, is folded into the returned [`RunResult`].
    pub async fn run(&self, spec: &TransferSpec, cancel: &CancellationToken) -> RunResult {
        let start_time = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let mut progress = RunProgress::new(run_id.clone(), self.telemetry_tx.clone());

        info!(run_id = %run_id, direction = %spec.direction, "Starting transfer");

        let outcome = self.execute(spec, cancel, &mut progress).await;
        let (status, error) = match outcome {
            Ok(()) => {
                progress.transition(RunState::Completed);
                info!(
                    run_id = %run_id,
                    records = progress.records,
                    batches = progress.batches,
                    "Transfer completed"
                );
                (RunStatus::Success, None)
            }
            Err(e) => {
                progress.transition(RunState::Failed);
                warn!(
                    run_id = %run_id,
                    kind = e.kind(),
                    records = progress.records,
                    "Transfer failed: {}",
                    e
                );
                (RunStatus::Failure, Some(e))
            }
        };

        progress.emit(TelemetryEvent::RunFinished {
            records: progress.records,
            success: status == RunStatus::Success,
        });

        RunResult {
            run_id,
            direction: spec.direction,
            record_count: progress.records,
            batches_flushed: progress.batches,
            coercion_anomalies: progress.anomalies,
            duration: start_time.elapsed(),
            status,
            error,
            output_path: (spec.direction == Direction::DatabaseToFile).then(|| self.output_path()),
        }
    }

    async fn execute(
        &self,
        spec: &TransferSpec,
        cancel: &CancellationToken,
        progress: &mut RunProgress,
    ) -> Result<()> {
        progress.transition(RunState::Validating);
        spec.validate_for(Stage::Ingestion)?;
        if self.options.batch_size == 0 {
            return Err(BridgeError::Validation(
                "Batch size must be greater than zero.".to_string(),
            ));
        }

        let warehouse = self.connector.connect(&spec.connection)?;
        progress.emit(TelemetryEvent::RunStarted {
            run_id: progress.run_id.clone(),
        });
        progress.transition(RunState::Streaming);

        match spec.direction {
            Direction::DatabaseToFile => {
                export::export_to_file(
                    warehouse.as_ref(),
                    spec,
                    &self.output_path(),
                    self.options.batch_size,
                    cancel,
                    progress,
                )
                .await
            }
            Direction::FileToDatabase => {
                import::import_from_file(
                    warehouse.as_ref(),
                    spec,
                    &self.options,
                    cancel,
                    progress,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemoryWarehouse, MemoryConnector};
    use crate::pipeline::transfer::tests::connection;
    use tempfile::TempDir;

    #[test]
    fn test_options_builder_defaults() {
        let options = PipelineOptionsBuilder::default()
            .base_dir("/srv/bridge")
            .build()
            .unwrap();
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.coercion_policy, CoercionPolicy::Lenient);
        assert!(PipelineOptionsBuilder::default().build().is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_is_a_failed_run() {
        let dir = TempDir::new().unwrap();
        let connector = Arc::new(MemoryConnector::new(InMemoryWarehouse::new()));
        let options = PipelineOptionsBuilder::default()
            .base_dir(dir.path())
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(connector.clone(), options).with_telemetry(tx);

        let spec = TransferSpec {
            direction: Direction::DatabaseToFile,
            connection: connection(),
            tables: vec!["events".into()],
            join_condition: None,
            columns: vec![],
            file: None,
        };
        let result = pipeline.run(&spec, &CancellationToken::new()).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.record_count, 0);
        assert!(result.error.as_ref().unwrap().is_caller_error());
        assert_eq!(connector.connects(), 0);

        // Only the terminal event is sent for a run that never started
        drop(pipeline);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TelemetryEvent::RunFinished {
                records: 0,
                success: false
            }
        ));
    }

    #[test]
    fn test_output_path() {
        let connector = Arc::new(MemoryConnector::new(InMemoryWarehouse::new()));
        let options = PipelineOptionsBuilder::default()
            .base_dir("/data")
            .build()
            .unwrap();
        let pipeline = Pipeline::new(connector, options);
        assert_eq!(
            pipeline.output_path(),
            PathBuf::from("/data/output/clickhouse_to_flatfile.csv")
        );
    }
}
