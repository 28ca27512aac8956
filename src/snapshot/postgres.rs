// ABOUTME: PostgreSQL snapshot backed by tokio-postgres
// ABOUTME: Catalog queries against information_schema/pg_index, data via simple queries

use anyhow::{Context, Result};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, SimpleQueryMessage};

use super::{Snapshot, SqlRow, SqlValue};
use crate::sql::{quote_ident, Dialect};

/// A read-only view of one PostgreSQL schema.
///
/// The connection's `search_path` is pinned to the schema so unqualified
/// table names in generated SQL resolve to it.
pub struct PostgresSnapshot {
    client: Client,
    schema: String,
    label: String,
}

/// Connect to PostgreSQL with TLS negotiation.
///
/// When `allow_self_signed_certs` is set, certificate validation is disabled.
pub async fn connect(url: &str, allow_self_signed_certs: bool) -> Result<Client> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(allow_self_signed_certs)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(connector);

    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

impl PostgresSnapshot {
    pub async fn connect(url: &str, schema: &str, allow_self_signed_certs: bool) -> Result<Self> {
        let client = connect(url, allow_self_signed_certs).await?;
        let label = crate::utils::strip_password_from_url(url)
            .unwrap_or_else(|_| "postgres (key/value connection string)".to_string());
        Self::from_client(client, schema, label).await
    }

    /// Wrap an existing client and pin its search path to `schema`.
    pub async fn from_client(client: Client, schema: &str, label: String) -> Result<Self> {
        client
            .batch_execute(&format!("SET search_path TO {}", quote_ident(schema)))
            .await
            .with_context(|| format!("Failed to set search_path to {}", schema))?;

        Ok(Self {
            client,
            schema: schema.to_string(),
            label,
        })
    }
}

impl Snapshot for PostgresSnapshot {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn describe(&self) -> String {
        format!("{} (schema {})", self.label, self.schema)
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .await
            .with_context(|| format!("Failed to list tables in schema {}", self.schema))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_ident(&self.schema),
            quote_ident(table)
        );

        let row = self
            .client
            .query_one(&query, &[])
            .await
            .with_context(|| format!("Failed to count rows in {}.{}", self.schema, table))?;
        let count: i64 = row.get(0);

        Ok(count.max(0) as u64)
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT a.attname::text
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 JOIN pg_class c ON c.oid = i.indrelid
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE i.indisprimary
                   AND n.nspname = $1
                   AND c.relname = $2
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get primary key for {}.{}", self.schema, table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<(String, String)>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text, data_type::text
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&self.schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get columns for {}.{}", self.schema, table))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let dtype: String = row.get(1);
                (name, dtype)
            })
            .collect())
    }

    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        tracing::debug!("Executing on {}: {}", self.label, sql);

        // The simple query protocol returns every value in its text form
        let messages = self
            .client
            .simple_query(sql)
            .await
            .with_context(|| format!("Query failed: {}", sql))?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut values = SqlRow::with_capacity(row.len());
                for (idx, column) in row.columns().iter().enumerate() {
                    let value = row
                        .try_get(idx)
                        .with_context(|| format!("Failed to read column {}", column.name()))?
                        .map(|text| SqlValue::Text(text.to_string()));
                    values.insert(column.name().to_string(), value);
                }
                rows.push(values);
            }
        }

        Ok(rows)
    }
}
