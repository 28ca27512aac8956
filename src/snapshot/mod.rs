// ABOUTME: Read-only access to one point-in-time database snapshot
// ABOUTME: Catalog lookups and textual row queries behind a single trait

pub mod postgres;
pub mod sqlite;

use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::sql::Dialect;

pub use self::postgres::PostgresSnapshot;
pub use self::sqlite::SqliteSnapshot;

/// A non-NULL value in text form, tagged with how the database stored it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlValue {
    /// Stored as a number (SQLite INTEGER or REAL storage class).
    Number(String),
    /// Stored as text, or read through a protocol that only yields text.
    Text(String),
}

impl SqlValue {
    pub fn as_str(&self) -> &str {
        match self {
            SqlValue::Number(s) | SqlValue::Text(s) => s,
        }
    }
}

/// One result row, addressed by column name. SQL NULL is `None`.
pub type SqlRow = HashMap<String, Option<SqlValue>>;

/// Catalog provider and query executor for one snapshot.
///
/// Implementations never write to the database they read.
#[allow(async_fn_in_trait)]
pub trait Snapshot {
    fn dialect(&self) -> Dialect;

    /// Password-free label for log output.
    fn describe(&self) -> String;

    /// User tables of the snapshot's schema, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    async fn row_count(&self, table: &str) -> Result<u64>;

    /// Primary key column names in key position order. Empty when the table has no key.
    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>>;

    /// `(column_name, declared_type)` pairs in ordinal order.
    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>>;

    /// Run a read-only query and return every row with values as text.
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>>;
}

/// How to reach a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Overrides the user embedded in the URL.
    pub user: Option<String>,
    /// Overrides the password embedded in the URL.
    pub password: Option<String>,
    /// Schema whose tables are compared (PostgreSQL only).
    pub schema: String,
    pub allow_self_signed_certs: bool,
}

/// Either supported backend.
pub enum AnySnapshot {
    Postgres(PostgresSnapshot),
    Sqlite(SqliteSnapshot),
}

impl Snapshot for AnySnapshot {
    fn dialect(&self) -> Dialect {
        match self {
            AnySnapshot::Postgres(s) => s.dialect(),
            AnySnapshot::Sqlite(s) => s.dialect(),
        }
    }

    fn describe(&self) -> String {
        match self {
            AnySnapshot::Postgres(s) => s.describe(),
            AnySnapshot::Sqlite(s) => s.describe(),
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        match self {
            AnySnapshot::Postgres(s) => s.list_tables().await,
            AnySnapshot::Sqlite(s) => s.list_tables().await,
        }
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        match self {
            AnySnapshot::Postgres(s) => s.row_count(table).await,
            AnySnapshot::Sqlite(s) => s.row_count(table).await,
        }
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        match self {
            AnySnapshot::Postgres(s) => s.primary_key_columns(table).await,
            AnySnapshot::Sqlite(s) => s.primary_key_columns(table).await,
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        match self {
            AnySnapshot::Postgres(s) => s.columns(table).await,
            AnySnapshot::Sqlite(s) => s.columns(table).await,
        }
    }

    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        match self {
            AnySnapshot::Postgres(s) => s.query(sql).await,
            AnySnapshot::Sqlite(s) => s.query(sql).await,
        }
    }
}

/// Whether a connection string names a SQLite database file.
pub fn is_sqlite_url(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    lowered.starts_with("sqlite:")
        || lowered.ends_with(".db")
        || lowered.ends_with(".sqlite")
        || lowered.ends_with(".sqlite3")
}

/// Filesystem path of a SQLite connection string.
pub fn sqlite_path(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Open a snapshot, picking the backend from the URL.
pub async fn connect(url: &str, options: &ConnectOptions) -> Result<AnySnapshot> {
    if is_sqlite_url(url) {
        if options.user.is_some() || options.password.is_some() {
            tracing::warn!("Ignoring credentials for SQLite snapshot {}", sqlite_path(url));
        }
        let snapshot = SqliteSnapshot::open(sqlite_path(url))
            .with_context(|| format!("Failed to open SQLite snapshot {}", sqlite_path(url)))?;
        return Ok(AnySnapshot::Sqlite(snapshot));
    }

    let url = crate::utils::apply_credentials(
        url,
        options.user.as_deref(),
        options.password.as_deref(),
    )?;
    let snapshot =
        PostgresSnapshot::connect(&url, &options.schema, options.allow_self_signed_certs).await?;
    Ok(AnySnapshot::Postgres(snapshot))
}
