// ABOUTME: SQLite to PostgreSQL migration pipeline
// ABOUTME: Type translation, DDL, row transfer, indexes, sequences, orchestration and verification

pub mod data;
pub mod indexes;
pub mod orchestrator;
pub mod savepoint;
pub mod schema;
pub mod sequences;
pub mod types;
pub mod verification;

pub use data::{bind_row, bind_value, insert_sql, transfer_rows, BoundValue, TransferOutcome};
pub use indexes::{create_index_sql, recreate_indexes, IndexOutcome};
pub use orchestrator::{
    migrate_database, tables_to_migrate, MigrationOptions, MigrationReport, Phase, RunState,
    TableReport,
};
pub use schema::{describe_target_columns, materialize_table, ColumnPlan, TablePlan};
pub use sequences::{reset_sequences, SequenceOutcome, SerialColumn};
pub use types::translate_type;
pub use verification::{verify_counts, TableCount, VerificationReport};
