// ABOUTME: Run configuration for the diff pipeline
// ABOUTME: Loaded from an optional TOML file, then overridden by CLI flags

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// What to do when a table fails with a query, encoding or timeout error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the whole run at the first failing table.
    #[default]
    Abort,
    /// Record the failure and continue with the next table.
    Skip,
}

/// Settings for one diff run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffConfig {
    /// Schema whose tables are compared (PostgreSQL only)
    pub schema: String,
    /// Only diff these tables (empty = all tables)
    pub include_tables: Vec<String>,
    /// Never diff these tables
    pub exclude_tables: Vec<String>,
    pub on_error: FailurePolicy,
    /// Extra attempts for a failing table before the failure counts
    pub table_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub retry_delay_ms: u64,
    /// Upper bound for processing a single table attempt
    pub query_timeout_secs: Option<u64>,
    /// Appended to every emitted statement
    pub terminator: String,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            on_error: FailurePolicy::Abort,
            table_retries: 0,
            retry_delay_ms: 500,
            query_timeout_secs: None,
            terminator: ";".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    diff: DiffConfig,
}

impl DiffConfig {
    /// Whether a table passes the include/exclude filters.
    pub fn should_diff_table(&self, table: &str) -> bool {
        if self.exclude_tables.iter().any(|t| t == table) {
            return false;
        }
        self.include_tables.is_empty() || self.include_tables.iter().any(|t| t == table)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Parse the `[diff]` table of a TOML document.
pub fn parse_config(contents: &str) -> Result<DiffConfig> {
    let file: ConfigFile = toml::from_str(contents).context("Invalid diff configuration")?;
    Ok(file.diff)
}

/// Load a TOML configuration file.
///
/// ```toml
/// [diff]
/// schema = "reference"
/// exclude_tables = ["audit_log"]
/// on_error = "skip"
/// table_retries = 2
/// ```
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<DiffConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
