//! Historical Backfill
//!
//! One bulk query against the ledger, normalized and reordered for the
//! reconciler. The gateway returns readings oldest first; the series
//! wants them newest first. No filtering and no deduplication happen
//! here: the batch is trusted as recorded.

use crate::application::ports::{QueryError, ReadingQueryPort, ReadingRecord};
use crate::domain::reading::Reading;

/// Fetch the complete recorded history, newest first.
///
/// # Errors
///
/// Returns the query channel's error untouched; the caller decides how
/// it surfaces.
pub async fn fetch_all(query: &dyn ReadingQueryPort) -> Result<Vec<Reading>, QueryError> {
    let records = query.fetch_all_readings().await?;
    let mut readings: Vec<Reading> = records
        .into_iter()
        .map(ReadingRecord::into_reading)
        .collect();
    readings.reverse();
    tracing::debug!(count = readings.len(), "Historical batch normalized");
    Ok(readings)
}
