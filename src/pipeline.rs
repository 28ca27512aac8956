// ABOUTME: Drives the diff across all tables of two snapshots
// ABOUTME: Tags each table as emitted, unchanged, skipped or failed and aggregates a run summary

use std::time::Instant;

use crate::config::{DiffConfig, FailurePolicy};
use crate::diff::{
    bounded, collect_row_counts, detect_changed_tables, emit_change_set, find_new_rows,
    resolve_table, ChangeSet, RowCounts,
};
use crate::error::{DiffError, DiffResult};
use crate::sink::StatementSink;
use crate::snapshot::Snapshot;
use crate::utils::retry_with_backoff;

/// What happened to one candidate table.
#[derive(Debug)]
pub enum TableOutcome {
    /// New rows were found and written to the sink.
    Emitted { table: String, statements: usize },
    /// The row count grew but no new identity appeared (e.g. deletes plus re-inserts).
    Unchanged { table: String },
    /// The table cannot be diffed; the run continues.
    Skipped { table: String, reason: String },
    /// A table-scoped failure under `FailurePolicy::Skip`.
    Failed { table: String, error: String },
}

impl TableOutcome {
    pub fn table(&self) -> &str {
        match self {
            TableOutcome::Emitted { table, .. }
            | TableOutcome::Unchanged { table }
            | TableOutcome::Skipped { table, .. }
            | TableOutcome::Failed { table, .. } => table,
        }
    }
}

/// Statistics from one diff run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub tables_examined: usize,
    pub tables_changed: usize,
    pub statements_emitted: usize,
    /// Tables present in only one snapshot
    pub drifted: Vec<String>,
    pub outcomes: Vec<TableOutcome>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Check if the run completed without failed tables. Skips do not count.
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TableOutcome::Failed { .. }))
    }
}

/// Compares a before and an after snapshot and reconstructs the inserts between them.
pub struct DiffPipeline<'a, S: Snapshot> {
    before: &'a S,
    after: &'a S,
    config: &'a DiffConfig,
}

impl<'a, S: Snapshot> DiffPipeline<'a, S> {
    pub fn new(before: &'a S, after: &'a S, config: &'a DiffConfig) -> Self {
        Self {
            before,
            after,
            config,
        }
    }

    /// Run the whole diff, streaming statements to `sink`.
    ///
    /// Returns an error for fatal failures, or for the first failing table
    /// under `FailurePolicy::Abort`.
    pub async fn run<K: StatementSink + ?Sized>(&self, sink: &mut K) -> DiffResult<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        let before_tables = self.list_tables(self.before, "before").await?;
        let after_tables = self.list_tables(self.after, "after").await?;

        let mut before_counts = self
            .count_rows(self.before, &before_tables, &mut summary)
            .await?;
        let mut after_counts = self
            .count_rows(self.after, &after_tables, &mut summary)
            .await?;
        for outcome in summary.failed() {
            before_counts.remove(outcome.table());
            after_counts.remove(outcome.table());
        }

        tracing::info!("Examining row counts for {} tables", before_counts.len());
        summary.tables_examined = before_counts.len();

        let detection = detect_changed_tables(&before_counts, &after_counts);
        for table in &detection.drifted {
            tracing::warn!(
                "Table {} exists in only one snapshot; not comparing it",
                table
            );
        }
        summary.drifted = detection.drifted;
        summary.tables_changed = detection.changed.len();
        tracing::info!("{} tables have more rows after", detection.changed.len());

        for table in &detection.changed {
            let outcome = match self.diff_table(table, sink).await {
                Ok(0) => TableOutcome::Unchanged {
                    table: table.clone(),
                },
                Ok(statements) => {
                    summary.statements_emitted += statements;
                    TableOutcome::Emitted {
                        table: table.clone(),
                        statements,
                    }
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping {}: {}", table, e);
                    TableOutcome::Skipped {
                        table: table.clone(),
                        reason: e.to_string(),
                    }
                }
                Err(e) => self.table_failure(table, e)?,
            };
            summary.outcomes.push(outcome);
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn list_tables(&self, snapshot: &S, label: &'static str) -> DiffResult<Vec<String>> {
        let tables = snapshot
            .list_tables()
            .await
            .map_err(|e| DiffError::query(&format!("<{} catalog>", label), e))?;

        Ok(tables
            .into_iter()
            .filter(|t| self.config.should_diff_table(t))
            .collect())
    }

    async fn count_rows(
        &self,
        snapshot: &S,
        tables: &[String],
        summary: &mut RunSummary,
    ) -> DiffResult<RowCounts> {
        if self.config.on_error == FailurePolicy::Abort {
            return collect_row_counts(snapshot, tables).await;
        }

        // Under Skip, an uncountable table is recorded; run() drops it from both sides
        let mut counts = RowCounts::new();
        for table in tables {
            match collect_row_counts(snapshot, std::slice::from_ref(table)).await {
                Ok(single) => counts.extend(single),
                Err(e) => {
                    let outcome = self.table_failure(table, e)?;
                    summary.outcomes.push(outcome);
                }
            }
        }
        Ok(counts)
    }

    /// Convert a table error into an outcome, or propagate it when the run must stop.
    fn table_failure(&self, table: &str, error: DiffError) -> DiffResult<TableOutcome> {
        if error.is_table_scoped() && self.config.on_error == FailurePolicy::Skip {
            tracing::error!("Failed to diff {}: {}", table, error);
            Ok(TableOutcome::Failed {
                table: table.to_string(),
                error: error.to_string(),
            })
        } else {
            Err(error)
        }
    }

    /// Resolve and diff one table, retrying table-scoped failures.
    async fn plan_table(&self, table: &str) -> DiffResult<ChangeSet> {
        let timeout = self.config.query_timeout();
        retry_with_backoff(
            || {
                bounded(table, timeout, async move {
                    let metadata = resolve_table(self.before, self.after, table).await?;
                    find_new_rows(self.before, self.after, &metadata).await
                })
            },
            self.config.table_retries,
            self.config.retry_delay(),
            DiffError::is_table_scoped,
        )
        .await
    }

    /// Process one changed table: count -> keys -> rows -> SQL.
    pub async fn diff_table<K: StatementSink + ?Sized>(
        &self,
        table: &str,
        sink: &mut K,
    ) -> DiffResult<usize> {
        let change_set = self.plan_table(table).await?;
        if change_set.is_empty() {
            tracing::info!("{}: no new rows", table);
            return Ok(0);
        }

        tracing::info!("{}: {} new rows", table, change_set.len());
        emit_change_set(
            self.after,
            change_set,
            sink,
            &self.config.terminator,
            self.config.query_timeout(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_success_ignores_skips() {
        let summary = RunSummary {
            outcomes: vec![
                TableOutcome::Emitted {
                    table: "a".to_string(),
                    statements: 2,
                },
                TableOutcome::Skipped {
                    table: "b".to_string(),
                    reason: "CLOB".to_string(),
                },
            ],
            ..RunSummary::default()
        };
        assert!(summary.is_success());
        assert_eq!(summary.skipped().count(), 1);
        assert_eq!(summary.outcomes[1].table(), "b");
    }

    #[test]
    fn test_summary_failure() {
        let summary = RunSummary {
            outcomes: vec![TableOutcome::Failed {
                table: "a".to_string(),
                error: "boom".to_string(),
            }],
            ..RunSummary::default()
        };
        assert!(!summary.is_success());
        assert_eq!(summary.failed().count(), 1);
    }
}
