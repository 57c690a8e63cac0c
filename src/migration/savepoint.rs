// ABOUTME: Savepoint cleanup for per-row, per-index and per-sequence steps
// ABOUTME: Releases savepoints after rollback so rejected statements do not leave nested subtransactions

use crate::error::MigrationError;
use tokio_postgres::Transaction;

pub fn release_sql(name: &str) -> String {
    format!("RELEASE SAVEPOINT {}", name)
}

/// Drop a savepoint that was just rolled back to
///
/// Rolling a savepoint back only issues `ROLLBACK TO`, which keeps it
/// defined; the next savepoint with the same name would nest inside it.
pub async fn release_rolled_back(
    transaction: &Transaction<'_>,
    name: &str,
) -> Result<(), MigrationError> {
    transaction.batch_execute(&release_sql(name)).await?;
    Ok(())
}
