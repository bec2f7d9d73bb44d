use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::coordinator::{PipelineOptions, RunProgress, RunState};
use super::transfer::TransferSpec;
use crate::coercion::coerce_batch;
use crate::db::Warehouse;
use crate::error::{BridgeError, Result};
use crate::formats::DelimitedReader;
use crate::io::resolve_in;

/// Load a delimited file into a ClickHouse table, one insert per batch
///
/// The table is described once; its columns that were selected form the
/// insert column list, in table order. A failed insert stops the run and
/// leaves earlier batches in place.
pub(crate) async fn import_from_file(
    warehouse: &dyn Warehouse,
    spec: &TransferSpec,
    options: &PipelineOptions,
    cancel: &CancellationToken,
    progress: &mut RunProgress,
) -> Result<()> {
    let table = spec
        .target_table()
        .ok_or_else(|| BridgeError::Validation("Target ClickHouse table must be specified.".into()))?;
    let file_path = spec
        .file_path()
        .ok_or_else(|| BridgeError::Validation("File name must be provided.".into()))?;
    let path = resolve_in(&options.base_dir, file_path)?;

    let reader = DelimitedReader::new(&path, spec.delimiter());
    let mut batches = reader.open_batches(options.batch_size).await?;

    let schema = warehouse.describe_table(table).await?;
    let columns = schema.project(&spec.columns);
    if columns.is_empty() {
        return Err(BridgeError::Validation(format!(
            "None of the selected columns exist in table '{}'.",
            table
        )));
    }
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let missing: Vec<&str> = column_names
        .iter()
        .filter(|name| !batches.headers().contains(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        warn!(columns = ?missing, "Columns missing from file header will be inserted as null");
    }

    info!(
        file = %path.display(),
        table,
        columns = ?column_names,
        batch_size = options.batch_size,
        "Importing file into ClickHouse"
    );

    let mut batch_index = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let (reader, batch) = batches.next_batch_async().await?;
        batches = reader;
        let Some(batch) = batch else {
            break;
        };
        batch_index += 1;

        let started = Instant::now();
        let (rows, anomalies) = coerce_batch(&batch, &columns, options.coercion_policy)?;
        let inserted = warehouse
            .insert_batch(table, &column_names, &rows)
            .await
            .map_err(|e| annotate_insert_error(e, batch_index, progress.records()))?;
        progress.batch_flushed(inserted, anomalies, started.elapsed());
    }

    // Every batch is inserted as soon as it is read; nothing is left buffered
    progress.transition(RunState::Flushing);
    Ok(())
}

/// Add the failing batch and the rows already committed to an insert error
fn annotate_insert_error(err: BridgeError, batch_index: usize, inserted: u64) -> BridgeError {
    let detail = format!(
        "batch {} failed; {} rows from earlier batches remain inserted",
        batch_index, inserted
    );
    match err {
        BridgeError::Insert(message) => BridgeError::Insert(format!("{} ({})", message, detail)),
        BridgeError::Connection(message) => {
            BridgeError::Connection(format!("{} ({})", message, detail))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_insert_error() {
        let err = annotate_insert_error(BridgeError::Insert("Cannot parse input".into()), 3, 2000);
        assert_eq!(
            err.to_string(),
            "ClickHouse insert error: Cannot parse input (batch 3 failed; 2000 rows from earlier batches remain inserted)"
        );

        let err = annotate_insert_error(BridgeError::Cancelled, 1, 0);
        assert!(matches!(err, BridgeError::Cancelled));
    }
}
