/// Progress events emitted by a pipeline run
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// Run passed validation and began streaming
    RunStarted { run_id: String },
    /// One batch was written to its sink
    BatchFlushed {
        records: u64,
        coercion_anomalies: u64,
        duration_ms: u64,
    },
    /// Terminal event, sent exactly once per run
    RunFinished { records: u64, success: bool },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub runs_started: usize,
    pub runs_finished: usize,
    pub runs_failed: usize,
    pub batches_flushed: usize,
    pub records_flushed: u64,
    pub coercion_anomalies: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::RunStarted { .. } => {
                self.runs_started += 1;
            }
            TelemetryEvent::BatchFlushed {
                records,
                coercion_anomalies,
                duration_ms,
            } => {
                self.batches_flushed += 1;
                self.records_flushed += records;
                self.coercion_anomalies += coercion_anomalies;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::RunFinished { success, .. } => {
                // Record totals already arrived through BatchFlushed
                self.runs_finished += 1;
                if !success {
                    self.runs_failed += 1;
                }
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
