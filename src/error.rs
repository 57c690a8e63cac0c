// ABOUTME: Error taxonomy for the SQLite to PostgreSQL migration
// ABOUTME: Distinguishes fatal failures from per-row/index/sequence warnings

use thiserror::Error;

/// Which side of the migration a connection failure happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Errors raised while migrating a SQLite database into PostgreSQL
///
/// `RowTransfer`, `Index` and `Sequence` are recorded in the migration
/// report and never abort a run. Every other variant is fatal and rolls
/// back the target transaction.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Connection error ({side}): {message}")]
    Connection { side: Side, message: String },

    #[error("Failed to create table '{table}': {source}")]
    SchemaTranslation {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Row {row} of table '{table}' was rejected: {message}")]
    RowTransfer {
        table: String,
        row: usize,
        message: String,
    },

    #[error("Failed to create index '{index}' on '{table}': {message}")]
    Index {
        table: String,
        index: String,
        message: String,
    },

    #[error("Target table '{table}' cannot receive the source rows: {message}")]
    TargetMismatch { table: String, message: String },

    #[error("Failed to reset sequence for {table}.{column}: {message}")]
    Sequence {
        table: String,
        column: String,
        message: String,
    },

    #[error("Invalid migration state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),
}

impl MigrationError {
    /// Returns true if the error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MigrationError::RowTransfer { .. }
                | MigrationError::Index { .. }
                | MigrationError::Sequence { .. }
        )
    }
}

/// Render a server error with its detail line when one is present
///
/// `tokio_postgres::Error`'s Display only says "db error"; the useful
/// message lives in the attached `DbError`.
pub fn describe_pg_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => error.to_string(),
    }
}
