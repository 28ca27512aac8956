// ABOUTME: Table-level change detection from per-table row counts
// ABOUTME: A table is a candidate when the after snapshot holds more rows than before

use std::collections::BTreeMap;

use crate::error::{DiffError, DiffResult};
use crate::snapshot::Snapshot;

/// Row count per table name for one snapshot.
pub type RowCounts = BTreeMap<String, u64>;

/// Result of comparing two sets of row counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDetection {
    /// Tables whose after count is strictly greater than their before count, sorted.
    pub changed: Vec<String>,
    /// Tables present in only one snapshot, sorted. Never diffed.
    pub drifted: Vec<String>,
}

/// Compare row counts between two snapshots.
///
/// A table missing from either side is schema drift: it is reported in
/// `drifted` rather than being mistaken for an unchanged table.
pub fn detect_changed_tables(before: &RowCounts, after: &RowCounts) -> ChangeDetection {
    let mut detection = ChangeDetection::default();

    for (table, before_count) in before {
        match after.get(table) {
            Some(after_count) if after_count > before_count => {
                detection.changed.push(table.clone());
            }
            Some(_) => {}
            None => detection.drifted.push(table.clone()),
        }
    }
    for table in after.keys() {
        if !before.contains_key(table) {
            detection.drifted.push(table.clone());
        }
    }

    // BTreeMap iteration is already ordered and unique; drift merges two lists
    detection.drifted.sort();
    detection.drifted.dedup();

    detection
}

/// Count the rows of every listed table in a snapshot.
pub async fn collect_row_counts<S: Snapshot>(snapshot: &S, tables: &[String]) -> DiffResult<RowCounts> {
    let mut counts = RowCounts::new();
    for table in tables {
        let count = snapshot
            .row_count(table)
            .await
            .map_err(|e| DiffError::query(table, e))?;
        counts.insert(table.clone(), count);
    }
    Ok(counts)
}
