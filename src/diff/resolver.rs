// ABOUTME: Resolves the identity columns and full column list of a candidate table
// ABOUTME: Tables without a primary key use every column as identity

use std::collections::HashSet;

use crate::error::{DiffError, DiffResult};
use crate::schema::{ColumnMetadata, ColumnType, TableMetadata};
use crate::snapshot::Snapshot;

/// Build table metadata from catalog answers.
///
/// `shared` names the columns that also exist in the before snapshot. A keyless
/// table identifies rows by those columns only, since the before key scan can
/// only read what exists there.
///
/// Fails with `UnsupportedColumnType` on the first large-object column so the
/// caller can skip the table.
pub fn build_table_metadata(
    table: &str,
    primary_key: &[String],
    columns: Vec<(String, String)>,
    shared: &HashSet<String>,
) -> DiffResult<TableMetadata> {
    let keyless = primary_key.is_empty();
    let mut resolved = Vec::with_capacity(columns.len());

    for (name, declared_type) in columns {
        if !shared.contains(&name) {
            tracing::warn!(
                "Column {} of {} exists only in the after snapshot; not used to identify rows",
                name,
                table
            );
        }
        let is_identity = if keyless {
            shared.contains(&name)
        } else {
            primary_key.contains(&name)
        };
        let column = ColumnMetadata::new(name, declared_type, is_identity);
        if column.column_type.is_unsupported() {
            return Err(DiffError::UnsupportedColumnType {
                table: table.to_string(),
                column: column.name,
                declared_type: column.declared_type,
            });
        }
        if column.column_type == ColumnType::Date {
            tracing::debug!("{} has DATE column {}", table, column.name);
        }
        resolved.push(column);
    }

    for key in primary_key {
        if !resolved.iter().any(|c| &c.name == key) {
            tracing::warn!(
                "Primary key column {} of {} is missing from the column list",
                key,
                table
            );
        }
    }

    Ok(TableMetadata::new(table, resolved))
}

/// Resolve a table's key and columns.
///
/// Columns come from the after snapshot so that columns added since the before
/// snapshot are emitted. Identity columns must exist in both snapshots: a key
/// column missing from before fails the table.
pub async fn resolve_table<S: Snapshot>(
    before: &S,
    after: &S,
    table: &str,
) -> DiffResult<TableMetadata> {
    let primary_key = after
        .primary_key_columns(table)
        .await
        .map_err(|e| DiffError::query(table, e))?;
    let columns = after
        .columns(table)
        .await
        .map_err(|e| DiffError::query(table, e))?;
    let shared: HashSet<String> = before
        .columns(table)
        .await
        .map_err(|e| DiffError::query(table, e))?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    if columns.is_empty() {
        return Err(DiffError::query(
            table,
            anyhow::anyhow!("catalog reports no columns"),
        ));
    }
    if let Some(missing) = primary_key.iter().find(|k| !shared.contains(*k)) {
        return Err(DiffError::query(
            table,
            anyhow::anyhow!("primary key column {} is missing from the before snapshot", missing),
        ));
    }
    if primary_key.is_empty() {
        tracing::debug!("{} has no primary key, using all columns as identity", table);
    }

    let metadata = build_table_metadata(table, &primary_key, columns, &shared)?;
    if metadata.identity_columns().next().is_none() {
        return Err(DiffError::query(
            table,
            anyhow::anyhow!("no identity column exists in both snapshots"),
        ));
    }
    Ok(metadata)
}
