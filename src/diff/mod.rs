// ABOUTME: Diff-and-reconstruct stages: change detection, key resolution, row diff, materialization
// ABOUTME: Each stage consumes only the output of the stage before it

pub mod detector;
pub mod differ;
pub mod materializer;
pub mod resolver;

use std::future::Future;
use std::time::Duration;

use crate::error::{DiffError, DiffResult};

pub use detector::{collect_row_counts, detect_changed_tables, ChangeDetection, RowCounts};
pub use differ::{find_new_rows, ChangeSet, KeyIndex, RowData, RowKey};
pub use materializer::{emit_change_set, materialize_row, render_row};
pub use resolver::{build_table_metadata, resolve_table};

/// Run `fut` under an optional deadline, mapping expiry to a table-scoped timeout.
pub(crate) async fn bounded<T, F>(table: &str, timeout: Option<Duration>, fut: F) -> DiffResult<T>
where
    F: Future<Output = DiffResult<T>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(DiffError::Timeout {
                table: table.to_string(),
                secs: limit.as_secs(),
            }),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded("t", Some(Duration::from_secs(5)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: DiffResult<()> = bounded("slow", Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(DiffError::Timeout { ref table, .. }) if table == "slow"));
    }
}
