// ABOUTME: Library root for db-insert-diff
// ABOUTME: Rebuilds INSERT statements for rows added between two database snapshots

pub mod config;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod snapshot;
pub mod sql;
pub mod utils;

pub use config::{DiffConfig, FailurePolicy};
pub use error::{DiffError, DiffResult};
pub use pipeline::{DiffPipeline, RunSummary, TableOutcome};
pub use snapshot::{connect, AnySnapshot, ConnectOptions, Snapshot};
