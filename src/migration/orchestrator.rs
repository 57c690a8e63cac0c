// ABOUTME: Migration run orchestration from SQLite catalog to committed PostgreSQL tables
// ABOUTME: Drives per-table phases inside one target transaction with full rollback on failure

use crate::error::MigrationError;
use crate::migration::data::{transfer_rows, TransferOutcome};
use crate::migration::indexes::{recreate_indexes, IndexOutcome};
use crate::migration::schema::{describe_target_columns, materialize_table, TablePlan};
use crate::migration::sequences::reset_sequences;
use crate::sqlite;
use crate::utils::sanitize_identifier;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_postgres::{Client, Transaction};

/// Phases of a migration run
///
/// `SchemaCreated`, `DataCopied` and `IndexesBuilt` repeat once per table.
/// A data-only run repeats `DataCopied` alone. `Failed` can be entered from
/// any non-terminal phase and only leads to `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connected,
    SchemaCreated,
    DataCopied,
    IndexesBuilt,
    SequencesReset,
    Committed,
    Failed,
    RolledBack,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Connected => "connected",
            Phase::SchemaCreated => "schema created",
            Phase::DataCopied => "data copied",
            Phase::IndexesBuilt => "indexes built",
            Phase::SequencesReset => "sequences reset",
            Phase::Committed => "committed",
            Phase::Failed => "failed",
            Phase::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Committed | Phase::RolledBack)
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Failed, RolledBack) => true,
            (current, Failed) => !current.is_terminal() && current != Failed,
            (Idle, Connected) => true,
            // A table starts right after connecting or after the previous table
            (Connected | IndexesBuilt, SchemaCreated) => true,
            (SchemaCreated, DataCopied) => true,
            (DataCopied, IndexesBuilt) => true,
            // Sequences follow the last table, or come straight after connecting
            // when there are no tables
            (Connected | IndexesBuilt, SequencesReset) => true,
            (SequencesReset, Committed) => true,
            _ => false,
        }
    }
}

/// Tracks the current phase and rejects out-of-order transitions
#[derive(Debug)]
pub struct RunState {
    phase: Phase,
    data_only: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            data_only: false,
        }
    }
}

impl RunState {
    /// A run that inserts into existing tables and never creates tables or indexes
    pub fn data_only() -> Self {
        Self {
            data_only: true,
            ..Default::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn allows(&self, next: Phase) -> bool {
        use Phase::*;
        if !self.data_only {
            return self.phase.can_advance_to(next);
        }
        match (self.phase, next) {
            (_, SchemaCreated | IndexesBuilt) => false,
            (Connected | DataCopied, DataCopied) => true,
            (DataCopied, SequencesReset) => true,
            (current, next) => current.can_advance_to(next),
        }
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), MigrationError> {
        if !self.allows(next) {
            return Err(MigrationError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!("Migration phase: {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Knobs for a migration run
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Columns that never get NOT NULL on the target
    pub nullable_columns: BTreeSet<String>,
    /// Source tables left out of the run
    pub exclude_tables: BTreeSet<String>,
    /// Draw per-table progress bars
    pub show_progress: bool,
    /// Insert into tables that already exist on the target; skip DDL and indexes
    pub data_only: bool,
}

/// What happened to one table
#[derive(Debug)]
pub struct TableReport {
    pub name: String,
    pub source_rows: usize,
    pub migrated_rows: usize,
    pub indexes_created: usize,
    pub indexes_skipped: usize,
    /// Non-fatal row and index errors, in the order they happened
    pub warnings: Vec<MigrationError>,
}

impl TableReport {
    fn new(name: &str, transfer: TransferOutcome, indexes: IndexOutcome) -> Self {
        let mut warnings = transfer.failures;
        warnings.extend(indexes.failures);
        Self {
            name: name.to_string(),
            source_rows: transfer.source_rows,
            migrated_rows: transfer.migrated_rows,
            indexes_created: indexes.created,
            indexes_skipped: indexes.skipped,
            warnings,
        }
    }

    pub fn skipped_rows(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, MigrationError::RowTransfer { .. }))
            .count()
    }
}

/// Outcome of a committed migration run
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
    pub sequences_reset: usize,
    pub sequence_warnings: Vec<MigrationError>,
    pub duration: Duration,
}

impl MigrationReport {
    pub fn total_migrated_rows(&self) -> usize {
        self.tables.iter().map(|t| t.migrated_rows).sum()
    }

    pub fn total_skipped_rows(&self) -> usize {
        self.tables.iter().map(TableReport::skipped_rows).sum()
    }
}

/// Source tables to migrate, after exclusions
pub fn tables_to_migrate(
    source: &Connection,
    exclude_tables: &BTreeSet<String>,
) -> Result<Vec<String>, MigrationError> {
    let tables = sqlite::list_tables(source)?;
    Ok(tables
        .into_iter()
        .filter(|t| {
            let excluded = exclude_tables.contains(t);
            if excluded {
                tracing::info!("Excluding table: {}", sanitize_identifier(t));
            }
            !excluded
        })
        .collect())
}

/// Migrate every source table into the target inside one transaction
///
/// Both connections must already be open. Any fatal error, including a failed
/// commit, rolls back the whole transaction, so nothing from this run remains
/// on the target. Row, index and sequence problems are logged and reported
/// without stopping the run.
pub async fn migrate_database(
    source: &Connection,
    target: &mut Client,
    options: &MigrationOptions,
) -> Result<MigrationReport, MigrationError> {
    let started = Instant::now();
    let mut state = if options.data_only {
        RunState::data_only()
    } else {
        RunState::default()
    };
    state.advance(Phase::Connected)?;

    if options.data_only {
        tracing::info!("Starting data-only migration from SQLite into existing PostgreSQL tables");
    } else {
        tracing::info!("Starting migration from SQLite to PostgreSQL");
    }
    tracing::info!(
        "The target transaction stays open until every table is copied; \
         large databases hold locks for the whole run"
    );

    let mut transaction = target.transaction().await?;

    let outcome = match run_tables(source, &mut transaction, options, &mut state).await {
        // The server discards a transaction whose COMMIT fails
        Ok(report) => transaction
            .commit()
            .await
            .map(|()| report)
            .map_err(MigrationError::from),
        Err(e) => {
            if let Err(rollback_err) = transaction.rollback().await {
                tracing::error!("Rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    };

    finish_run(&mut state, outcome, started)
}

/// Record how the run ended: `Committed`, or `Failed` then `RolledBack`
fn finish_run(
    state: &mut RunState,
    outcome: Result<MigrationReport, MigrationError>,
    started: Instant,
) -> Result<MigrationReport, MigrationError> {
    match outcome {
        Ok(mut report) => {
            state.advance(Phase::Committed)?;
            report.duration = started.elapsed();
            tracing::info!(
                "Migration completed successfully in {:.2?} ({} tables, {} rows, {} rows skipped)",
                report.duration,
                report.tables.len(),
                report.total_migrated_rows(),
                report.total_skipped_rows()
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!("Migration failed during '{}' phase: {}", state.phase(), e);
            state.advance(Phase::Failed)?;
            state.advance(Phase::RolledBack)?;
            tracing::error!("All changes from this run were rolled back");
            Err(e)
        }
    }
}

async fn run_tables(
    source: &Connection,
    transaction: &mut Transaction<'_>,
    options: &MigrationOptions,
    state: &mut RunState,
) -> Result<MigrationReport, MigrationError> {
    let tables = tables_to_migrate(source, &options.exclude_tables)?;
    tracing::info!("Found {} tables to migrate: {:?}", tables.len(), tables);

    let mut report = MigrationReport::default();

    for (idx, name) in tables.iter().enumerate() {
        tracing::info!(
            "Migrating table {}/{}: {}",
            idx + 1,
            tables.len(),
            sanitize_identifier(name)
        );

        let descriptor = sqlite::describe_table(source, name)?;
        let plan = if options.data_only {
            let target_columns = describe_target_columns(transaction, name).await?;
            TablePlan::for_existing_table(&descriptor, &target_columns)?
        } else {
            let plan = TablePlan::from_descriptor(&descriptor, &options.nullable_columns);
            materialize_table(transaction, &plan).await?;
            state.advance(Phase::SchemaCreated)?;
            plan
        };

        let rows = sqlite::read_rows(source, &descriptor)?;
        let progress = progress_bar(options.show_progress);
        let transfer = transfer_rows(transaction, &plan, &rows, &progress).await?;
        progress.finish_and_clear();
        state.advance(Phase::DataCopied)?;

        let indexes = if options.data_only {
            IndexOutcome::default()
        } else {
            let indexes = recreate_indexes(transaction, name, &descriptor.indexes).await?;
            state.advance(Phase::IndexesBuilt)?;
            indexes
        };

        report.tables.push(TableReport::new(name, transfer, indexes));
    }

    tracing::info!("Resetting sequences...");
    let sequences = reset_sequences(transaction).await?;
    state.advance(Phase::SequencesReset)?;

    report.sequences_reset = sequences.reset;
    report.sequence_warnings = sequences.failures;
    Ok(report)
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    progress
}
