//! Collapse remote records that collide on the same local destination

use crate::api::RemoteRecord;
use std::collections::HashSet;
use tracing::debug;

/// Keep one record per destination key: the most recently modified one
///
/// Records are ordered newest first and the first record seen for each key
/// wins. The sort is stable, so records with equal timestamps keep their
/// listing order.
pub fn dedupe<R: RemoteRecord>(mut records: Vec<R>) -> Vec<R> {
    records.sort_by(|a, b| b.modified_at().cmp(&a.modified_at()));

    let total = records.len();
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.destination_key()));

    if records.len() < total {
        debug!(
            "Dropped {} stale duplicate records ({} remain)",
            total - records.len(),
            records.len()
        );
    }

    records
}
