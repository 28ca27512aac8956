// ABOUTME: CLI entry point for db-insert-diff
// ABOUTME: Connects to both snapshots, runs the diff and writes SQL to stdout or a file

use anyhow::Context;
use clap::Parser;
use db_insert_diff::config::{load_config_from_file, DiffConfig, FailurePolicy};
use db_insert_diff::sink::WriterSink;
use db_insert_diff::{connect, ConnectOptions, DiffError, DiffPipeline, Snapshot, TableOutcome};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "db-insert-diff")]
#[command(
    about = "Emit INSERT statements for rows added to the after snapshot of a schema",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Connection URL of the snapshot before changes (postgresql://... or sqlite:path)
    #[arg(long, env = "BEFORE_DATABASE_URL")]
    before: String,
    /// Connection URL of the snapshot after changes
    #[arg(long, env = "AFTER_DATABASE_URL")]
    after: String,
    /// User for the before snapshot (overrides the URL)
    #[arg(long, env = "BEFORE_DB_USER")]
    before_user: Option<String>,
    /// Password for the before snapshot (overrides the URL)
    #[arg(long, env = "BEFORE_DB_PASSWORD", hide_env_values = true)]
    before_password: Option<String>,
    /// User for the after snapshot (overrides the URL)
    #[arg(long, env = "AFTER_DB_USER")]
    after_user: Option<String>,
    /// Password for the after snapshot (overrides the URL)
    #[arg(long, env = "AFTER_DB_PASSWORD", hide_env_values = true)]
    after_password: Option<String>,
    /// Schema to compare (PostgreSQL only, default: public)
    #[arg(long)]
    schema: Option<String>,
    /// Only diff these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_tables: Option<Vec<String>>,
    /// Never diff these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// What to do when a table fails: stop the run or skip the table
    #[arg(long, value_enum)]
    on_error: Option<FailurePolicy>,
    /// Extra attempts for a failing table
    #[arg(long)]
    table_retries: Option<u32>,
    /// Time limit in seconds for each table attempt and each row lookup
    #[arg(long)]
    query_timeout: Option<u64>,
    /// Statement terminator (default: ;)
    #[arg(long)]
    terminator: Option<String>,
    /// Write SQL to this file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    /// Path to a TOML file with a [diff] section
    #[arg(long)]
    config: Option<PathBuf>,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(long = "allow-self-signed-certs", default_value_t = false)]
    allow_self_signed_certs: bool,
}

impl Cli {
    fn diff_config(&self) -> anyhow::Result<DiffConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from_file(path)?,
            None => DiffConfig::default(),
        };

        if let Some(schema) = &self.schema {
            config.schema = schema.clone();
        }
        if let Some(tables) = &self.include_tables {
            config.include_tables = tables.clone();
        }
        if let Some(tables) = &self.exclude_tables {
            config.exclude_tables = tables.clone();
        }
        if let Some(policy) = self.on_error {
            config.on_error = policy;
        }
        if let Some(retries) = self.table_retries {
            config.table_retries = retries;
        }
        if let Some(secs) = self.query_timeout {
            config.query_timeout_secs = Some(secs);
        }
        if let Some(terminator) = &self.terminator {
            config.terminator = terminator.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries nothing but SQL
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.diff_config()?;

    db_insert_diff::utils::validate_source_target_different(&cli.before, &cli.after)
        .context("Before and after validation failed")?;

    let before_options = ConnectOptions {
        user: cli.before_user.clone(),
        password: cli.before_password.clone(),
        schema: config.schema.clone(),
        allow_self_signed_certs: cli.allow_self_signed_certs,
    };
    let after_options = ConnectOptions {
        user: cli.after_user.clone(),
        password: cli.after_password.clone(),
        ..before_options.clone()
    };

    let before = connect(&cli.before, &before_options)
        .await
        .map_err(|source| DiffError::Connection {
            snapshot: "before",
            source,
        })?;
    let after = connect(&cli.after, &after_options)
        .await
        .map_err(|source| DiffError::Connection {
            snapshot: "after",
            source,
        })?;
    tracing::info!("Before: {}", before.describe());
    tracing::info!("After: {}", after.describe());

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    let mut sink = WriterSink::new(writer);

    let summary = DiffPipeline::new(&before, &after, &config)
        .run(&mut sink)
        .await?;

    tracing::info!("Diff complete in {}ms:", summary.duration_ms);
    tracing::info!("  Tables examined: {}", summary.tables_examined);
    tracing::info!("  Tables with more rows: {}", summary.tables_changed);
    tracing::info!("  Statements emitted: {}", summary.statements_emitted);
    for outcome in &summary.outcomes {
        match outcome {
            TableOutcome::Skipped { table, reason } => {
                tracing::warn!("  Skipped {}: {}", table, reason)
            }
            TableOutcome::Failed { table, error } => {
                tracing::error!("  Failed {}: {}", table, error)
            }
            _ => {}
        }
    }

    if !summary.is_success() {
        anyhow::bail!(
            "{} table(s) failed; output is incomplete",
            summary.failed().count()
        );
    }

    Ok(())
}
