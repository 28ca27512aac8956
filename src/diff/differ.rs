// ABOUTME: Primary-key based row-set diff between two snapshots of one table
// ABOUTME: Finds identity keys present after but absent before

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::{DiffError, DiffResult};
use crate::schema::TableMetadata;
use crate::snapshot::{Snapshot, SqlRow, SqlValue};
use crate::sql::{render_ident, Dialect};

/// Deterministic identity of a row, built from its identity-column values in name order.
///
/// Each value contributes a `<byte length>:<value>` segment and NULL contributes
/// `~`, so two keys are equal exactly when every identity value is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut key = String::new();
        for value in values {
            match value {
                Some(v) => {
                    key.push_str(&v.len().to_string());
                    key.push(':');
                    key.push_str(v);
                }
                None => key.push('~'),
            }
        }
        RowKey(key)
    }

    /// Key of a result row for the table's identity columns.
    pub fn for_row(table: &TableMetadata, row: &SqlRow) -> Self {
        Self::from_values(
            table
                .identity_columns()
                .map(|c| row.get(&c.name).and_then(Option::as_ref).map(SqlValue::as_str)),
        )
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column values of one row. NULL and not-yet-fetched columns are absent.
pub type RowData = BTreeMap<String, SqlValue>;

/// Identity values of a row, keyed by column name.
fn identity_data(table: &TableMetadata, row: &SqlRow) -> RowData {
    table
        .identity_columns()
        .filter_map(|c| {
            row.get(&c.name)
                .and_then(|v| v.clone())
                .map(|v| (c.name.clone(), v))
        })
        .collect()
}

/// Rows of one snapshot indexed by key, in scan order.
///
/// Re-inserting a key keeps its first position and replaces its data.
#[derive(Debug, Default)]
pub struct KeyIndex {
    order: Vec<RowKey>,
    rows: HashMap<RowKey, RowData>,
    duplicates: usize,
}

impl KeyIndex {
    pub fn build(table: &TableMetadata, rows: &[SqlRow]) -> Self {
        let mut index = KeyIndex::default();
        for row in rows {
            index.insert(RowKey::for_row(table, row), identity_data(table, row));
        }
        index
    }

    pub fn insert(&mut self, key: RowKey, data: RowData) {
        if self.rows.insert(key.clone(), data).is_some() {
            self.duplicates += 1;
        } else {
            self.order.push(key);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Rows whose key repeated an earlier one.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Entries whose key is missing from `before`, in this index's scan order.
    pub fn new_since(mut self, before: &HashSet<RowKey>) -> Vec<(RowKey, RowData)> {
        let mut fresh = Vec::new();
        for key in self.order {
            if before.contains(&key) {
                continue;
            }
            if let Some(data) = self.rows.remove(&key) {
                fresh.push((key, data));
            }
        }
        fresh
    }
}

/// Newly inserted rows of one table, with identity values only until materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub table: TableMetadata,
    pub rows: Vec<(RowKey, RowData)>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn select_identity(table: &TableMetadata, dialect: Dialect) -> String {
    let columns: Vec<String> = table
        .identity_columns()
        .map(|c| render_ident(&c.name, dialect))
        .collect();
    format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        render_ident(table.name(), dialect)
    )
}

async fn scan_keys<S: Snapshot>(
    snapshot: &S,
    table: &TableMetadata,
    label: &str,
) -> DiffResult<Vec<SqlRow>> {
    let sql = select_identity(table, snapshot.dialect());
    snapshot
        .query(&sql)
        .await
        .map_err(|e| DiffError::query(table.name(), e.context(format!("reading {} keys", label))))
}

fn warn_duplicates(table: &TableMetadata, label: &str, duplicates: usize) {
    if duplicates > 0 {
        tracing::warn!(
            "{} rows in {} snapshot of {} share an identity with another row; keeping the last one read",
            duplicates,
            label,
            table.name()
        );
    }
}

/// Compute the rows present in `after` but not in `before`.
pub async fn find_new_rows<S: Snapshot>(
    before: &S,
    after: &S,
    table: &TableMetadata,
) -> DiffResult<ChangeSet> {
    let before_rows = scan_keys(before, table, "before").await?;
    let mut before_keys = HashSet::with_capacity(before_rows.len());
    let mut before_duplicates = 0;
    for row in &before_rows {
        if !before_keys.insert(RowKey::for_row(table, row)) {
            before_duplicates += 1;
        }
    }
    drop(before_rows);
    warn_duplicates(table, "before", before_duplicates);

    let after_rows = scan_keys(after, table, "after").await?;
    let after_index = KeyIndex::build(table, &after_rows);
    drop(after_rows);
    warn_duplicates(table, "after", after_index.duplicates());

    tracing::debug!(
        "{}: {} keys before, {} keys after",
        table.name(),
        before_keys.len(),
        after_index.len()
    );

    Ok(ChangeSet {
        table: table.clone(),
        rows: after_index.new_since(&before_keys),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMetadata;

    fn row(values: &[(&str, Option<&str>)]) -> SqlRow {
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(|v| SqlValue::Text(v.to_string()))))
            .collect()
    }

    fn users_table() -> TableMetadata {
        TableMetadata::new(
            "T",
            vec![
                ColumnMetadata::new("id", "integer", true),
                ColumnMetadata::new("name", "text", false),
            ],
        )
    }

    fn join_table() -> TableMetadata {
        TableMetadata::new(
            "J",
            vec![
                ColumnMetadata::new("b_id", "integer", true),
                ColumnMetadata::new("a_id", "integer", true),
            ],
        )
    }

    #[test]
    fn test_row_key_equal_iff_values_equal() {
        let a = RowKey::from_values([Some("1"), Some("23")]);
        let b = RowKey::from_values([Some("12"), Some("3")]);
        let c = RowKey::from_values([Some("1"), Some("23")]);
        assert_ne!(a, b);
        assert_eq!(a, c);

        assert_ne!(
            RowKey::from_values([None, Some("x")]),
            RowKey::from_values([Some("~"), Some("x")])
        );
        assert_ne!(
            RowKey::from_values([Some(""), Some("1")]),
            RowKey::from_values([Some("1"), Some("")])
        );
    }

    #[test]
    fn test_row_key_ignores_row_column_order() {
        let table = join_table();
        let first = row(&[("a_id", Some("3")), ("b_id", Some("4"))]);
        let second = row(&[("b_id", Some("4")), ("a_id", Some("3"))]);
        assert_eq!(RowKey::for_row(&table, &first), RowKey::for_row(&table, &second));
        assert_eq!(RowKey::for_row(&table, &first).to_string(), "1:31:4");
    }

    #[test]
    fn test_index_keeps_first_position_last_data() {
        let mut index = KeyIndex::default();
        index.insert(RowKey::from_values([Some("a")]), RowData::new());
        index.insert(RowKey::from_values([Some("b")]), RowData::new());
        let mut replaced = RowData::new();
        replaced.insert("code".to_string(), SqlValue::Text("a".to_string()));
        index.insert(RowKey::from_values([Some("a")]), replaced.clone());

        assert_eq!(index.len(), 2);
        assert_eq!(index.duplicates(), 1);

        let fresh = index.new_since(&HashSet::new());
        assert_eq!(fresh[0].0, RowKey::from_values([Some("a")]));
        assert_eq!(fresh[0].1, replaced);
        assert_eq!(fresh[1].0, RowKey::from_values([Some("b")]));
    }

    #[test]
    fn test_new_rows_follow_after_scan_order() {
        let table = users_table();
        let after_rows = vec![
            row(&[("id", Some("3"))]),
            row(&[("id", Some("1"))]),
            row(&[("id", Some("2"))]),
        ];
        let before: HashSet<RowKey> = [RowKey::from_values([Some("1")])].into_iter().collect();

        let fresh = KeyIndex::build(&table, &after_rows).new_since(&before);
        let ids: Vec<&str> = fresh.iter().map(|(_, d)| d["id"].as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn test_identity_data_skips_nulls_and_non_identity() {
        let table = users_table();
        let data = identity_data(&table, &row(&[("id", Some("2")), ("name", Some("b"))]));
        assert_eq!(data.len(), 1);
        assert_eq!(data["id"].as_str(), "2");

        let keyless = join_table();
        let data = identity_data(&keyless, &row(&[("a_id", None), ("b_id", Some("4"))]));
        assert_eq!(data.len(), 1);
        assert!(!data.contains_key("a_id"));
    }

    #[test]
    fn test_select_identity_lists_key_columns() {
        assert_eq!(
            select_identity(&join_table(), Dialect::Sqlite),
            "SELECT a_id, b_id FROM J"
        );
    }
}
