// ABOUTME: SQLite snapshot backed by rusqlite
// ABOUTME: Lists tables, counts rows and reads values as text from a database file

use anyhow::{Context, Result};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use super::{Snapshot, SqlRow, SqlValue};
use crate::sql::{render_ident, Dialect};

/// A read-only view of a SQLite database.
pub struct SqliteSnapshot {
    conn: Connection,
    label: String,
}

impl SqliteSnapshot {
    /// Open a database file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("SQLite file does not exist: {}", path.display());
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;

        Ok(Self {
            conn,
            label: path.display().to_string(),
        })
    }

    /// Wrap an already open connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            conn,
            label: label.into(),
        }
    }

    fn table_info(&self, table: &str) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")
            .context("Failed to prepare table_info query")?;

        let columns = stmt
            .query_map([table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .with_context(|| format!("Failed to read table_info for '{}'", table))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to collect table_info for '{}'", table))?;

        Ok(columns)
    }
}

/// Read one value with its storage class. BLOBs and TEXT that is not valid
/// UTF-8 cannot be written back as a literal and are rejected.
fn read_value(
    row: &rusqlite::Row<'_>,
    idx: usize,
    name: &str,
) -> rusqlite::Result<Option<SqlValue>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => Ok(Some(SqlValue::Number(i.to_string()))),
        // Debug formatting keeps the fractional part: 1.0 stays REAL on replay
        ValueRef::Real(f) => Ok(Some(SqlValue::Number(format!("{:?}", f)))),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Some(SqlValue::Text(text.to_string()))),
            Err(e) => Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                Box::new(e),
            )),
        },
        ValueRef::Blob(_) => Err(rusqlite::Error::InvalidColumnType(
            idx,
            name.to_string(),
            Type::Blob,
        )),
    }
}

impl Snapshot for SqliteSnapshot {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type='table' \
                 AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .context("Failed to prepare statement to list tables")?;

        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query table list")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to collect table names")?;

        Ok(tables)
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) FROM {}",
            render_ident(table, Dialect::Sqlite)
        );

        let count: i64 = self
            .conn
            .query_row(&query, [], |row| row.get(0))
            .with_context(|| format!("Failed to count rows in table '{}'", table))?;

        Ok(count.max(0) as u64)
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut keyed: Vec<(i64, String)> = self
            .table_info(table)?
            .into_iter()
            .filter(|(_, _, pk)| *pk > 0)
            .map(|(name, _, pk)| (pk, name))
            .collect();
        keyed.sort();

        Ok(keyed.into_iter().map(|(_, name)| name).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .table_info(table)?
            .into_iter()
            .map(|(name, dtype, _)| (name, dtype))
            .collect())
    }

    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        tracing::debug!("Executing on {}: {}", self.label, sql);

        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut values = SqlRow::with_capacity(column_names.len());
                for (idx, name) in column_names.iter().enumerate() {
                    values.insert(name.clone(), read_value(row, idx, name)?);
                }
                Ok(values)
            })
            .with_context(|| format!("Query failed: {}", sql))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to collect rows for: {}", sql))?;

        Ok(rows)
    }
}
