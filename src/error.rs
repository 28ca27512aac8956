// ABOUTME: Error taxonomy for the diff pipeline
// ABOUTME: Separates per-table recoverable skips from failures that stop the run

use thiserror::Error;

/// Errors raised while diffing a pair of snapshots.
#[derive(Error, Debug)]
pub enum DiffError {
    /// Either snapshot could not be reached.
    #[error("Could not connect to {snapshot} database: {source}")]
    Connection {
        snapshot: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The table holds a column whose values cannot be written as a delimited literal.
    #[error("Table {table} column {column} is of type {declared_type} and currently not supported")]
    UnsupportedColumnType {
        table: String,
        column: String,
        declared_type: String,
    },

    #[error("Query against {table} failed: {source:#}")]
    Query {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// A captured value does not fit the literal format of its column category.
    #[error("Table {table} column {column}: value {value:?} is not a valid {category} literal")]
    Encode {
        table: String,
        column: String,
        value: String,
        category: String,
    },

    #[error("Processing {table} timed out after {secs}s")]
    Timeout { table: String, secs: u64 },

    #[error("Failed to write statement: {0}")]
    Output(#[from] std::io::Error),
}

impl DiffError {
    /// Errors that only ever cost the current table, never the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DiffError::UnsupportedColumnType { .. })
    }

    /// Errors scoped to one table that a hardened run may retry or skip.
    pub fn is_table_scoped(&self) -> bool {
        matches!(
            self,
            DiffError::Query { .. } | DiffError::Encode { .. } | DiffError::Timeout { .. }
        )
    }

    pub(crate) fn query(table: &str, source: anyhow::Error) -> Self {
        DiffError::Query {
            table: table.to_string(),
            source,
        }
    }
}

pub type DiffResult<T> = std::result::Result<T, DiffError>;
