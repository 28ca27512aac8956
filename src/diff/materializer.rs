// ABOUTME: Fetches full rows for new keys and renders them as INSERT statements
// ABOUTME: Statements stream to the sink one row at a time in change-set order

use std::time::Duration;

use super::bounded;
use super::differ::{ChangeSet, RowData};
use crate::error::{DiffError, DiffResult};
use crate::schema::TableMetadata;
use crate::sink::StatementSink;
use crate::snapshot::Snapshot;
use crate::sql::{encode_value, render_insert, select_matching, Dialect};

/// Build the lookup predicate for a row from its identity values.
fn identity_predicate(
    table: &TableMetadata,
    data: &RowData,
) -> DiffResult<Vec<(String, Option<String>)>> {
    table
        .identity_columns()
        .map(|column| {
            let literal = match data.get(&column.name) {
                Some(value) => Some(encode_value(table.name(), column, value)?),
                None => None,
            };
            Ok((column.name.clone(), literal))
        })
        .collect()
}

/// Fill `data` with every column value of the matching row in `after`.
///
/// Returns the number of rows the lookup matched. With a non-unique identity
/// the last matching row read wins.
pub async fn materialize_row<S: Snapshot>(
    after: &S,
    table: &TableMetadata,
    data: &mut RowData,
) -> DiffResult<usize> {
    let predicate = identity_predicate(table, data)?;
    let sql = select_matching(table.name(), &predicate, after.dialect());

    let rows = after
        .query(&sql)
        .await
        .map_err(|e| DiffError::query(table.name(), e))?;

    for row in &rows {
        for column in table.columns() {
            match row.get(&column.name).and_then(Option::as_ref) {
                Some(value) => {
                    data.insert(column.name.clone(), value.clone());
                }
                None => {
                    data.remove(&column.name);
                }
            }
        }
    }

    Ok(rows.len())
}

/// Render one materialized row as an INSERT statement.
///
/// Columns appear in name order; columns without a value are left out of both lists.
pub fn render_row(
    table: &TableMetadata,
    data: &RowData,
    dialect: Dialect,
    terminator: &str,
) -> DiffResult<String> {
    let mut columns = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());

    for column in table.columns() {
        if let Some(value) = data.get(&column.name) {
            values.push(encode_value(table.name(), column, value)?);
            columns.push(column.name.clone());
        }
    }

    Ok(render_insert(table.name(), &columns, &values, dialect, terminator))
}

/// Materialize every row of a change set and emit one statement per row.
///
/// Each lookup is bounded by `timeout`. A key that no longer matches any row
/// fails the table rather than emitting a partial row. Returns the number of
/// statements emitted.
pub async fn emit_change_set<S: Snapshot, K: StatementSink + ?Sized>(
    after: &S,
    change_set: ChangeSet,
    sink: &mut K,
    terminator: &str,
    timeout: Option<Duration>,
) -> DiffResult<usize> {
    let table = change_set.table;
    let mut emitted = 0;

    for (key, mut data) in change_set.rows {
        let matched = bounded(
            table.name(),
            timeout,
            materialize_row(after, &table, &mut data),
        )
        .await?;

        match matched {
            0 => {
                return Err(DiffError::query(
                    table.name(),
                    anyhow::anyhow!("lookup of new row {} matched no row", key),
                ))
            }
            1 => {}
            n => tracing::warn!(
                "{} rows of {} match identity {}; using the last one read",
                n,
                table.name(),
                key
            ),
        }

        let statement = render_row(&table, &data, after.dialect(), terminator)?;
        sink.emit(&statement)?;
        emitted += 1;
    }

    Ok(emitted)
}
