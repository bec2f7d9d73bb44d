use futures::TryStreamExt;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::coordinator::{RunProgress, RunState};
use super::transfer::TransferSpec;
use crate::config::MAX_BATCH_PREALLOCATION;
use crate::db::Warehouse;
use crate::error::{BridgeError, Result};
use crate::formats::{Batch, CsvBatchWriter, DelimitedConfig};

/// Stream query results into the export file
///
/// Rows are gathered into batches of `batch_size`; each full batch is written
/// before the next row is pulled from the response. The file is synced before
/// this returns, so the progress count only ever covers durable rows.
pub(crate) async fn export_to_file(
    warehouse: &dyn Warehouse,
    spec: &TransferSpec,
    output_path: &Path,
    batch_size: usize,
    cancel: &CancellationToken,
    progress: &mut RunProgress,
) -> Result<()> {
    let query = spec.select_query(None);
    info!(query = %query, output = %output_path.display(), "Exporting to CSV");

    let mut rows = warehouse.query_stream(&query).await?;
    let mut writer =
        CsvBatchWriter::create(output_path, spec.columns.clone(), DelimitedConfig::default())
            .await?;
    let capacity = batch_size.min(MAX_BATCH_PREALLOCATION);
    let mut batch: Batch = Vec::with_capacity(capacity);

    loop {
        if batch.is_empty() && cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        match rows.try_next().await? {
            Some(row) => {
                batch.push(row);
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(capacity));
                    writer = write_batch(writer, full, progress).await?;
                }
            }
            None => break,
        }
    }

    progress.transition(RunState::Flushing);
    if !batch.is_empty() {
        writer = write_batch(writer, batch, progress).await?;
    }
    writer.finish_async().await?;

    Ok(())
}

async fn write_batch(
    writer: CsvBatchWriter,
    batch: Batch,
    progress: &mut RunProgress,
) -> Result<CsvBatchWriter> {
    let started = Instant::now();
    let (writer, written) = writer.write_batch_async(batch).await?;
    progress.batch_flushed(written, 0, started.elapsed());
    Ok(writer)
}
