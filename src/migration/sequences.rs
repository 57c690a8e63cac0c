// ABOUTME: Sequence reset after bulk copy
// ABOUTME: Advances serial sequences past the highest migrated key value

use crate::error::{describe_pg_error, MigrationError};
use crate::migration::savepoint::release_rolled_back;
use crate::utils::quote_ident;
use tokio_postgres::Transaction;

const SEQUENCE_SAVEPOINT: &str = "migrate_sequence";

/// A column whose default draws from a sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialColumn {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Default)]
pub struct SequenceOutcome {
    pub reset: usize,
    pub failures: Vec<MigrationError>,
}

/// Columns in the `public` schema with a `nextval(...)` default or an identity
///
/// Identity columns show up on tables the application created itself, which
/// a data-only run inserts into.
pub async fn find_serial_columns(
    transaction: &Transaction<'_>,
) -> Result<Vec<SerialColumn>, MigrationError> {
    let rows = transaction
        .query(
            "SELECT table_name::text, column_name::text
             FROM information_schema.columns
             WHERE table_schema = 'public'
               AND (column_default LIKE 'nextval%' OR is_identity = 'YES')
             ORDER BY table_name, column_name",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| SerialColumn {
            table: row.get(0),
            column: row.get(1),
        })
        .collect())
}

/// `setval` statement for one serial column
///
/// An empty table resets with `is_called = false` so the next value is 1.
/// Parameters: `$1` quoted table name, `$2` column name.
pub fn setval_sql(serial: &SerialColumn) -> String {
    let column = quote_ident(&serial.column);
    format!(
        "SELECT setval(pg_get_serial_sequence($1, $2), COALESCE(MAX({col}), 1), MAX({col}) IS NOT NULL) FROM {table}",
        col = column,
        table = quote_ident(&serial.table)
    )
}

/// Advance every serial sequence to at least its column's maximum value
pub async fn reset_sequences(
    transaction: &mut Transaction<'_>,
) -> Result<SequenceOutcome, MigrationError> {
    let serial_columns = find_serial_columns(transaction).await?;
    let mut outcome = SequenceOutcome::default();

    for serial in &serial_columns {
        let sql = setval_sql(serial);
        let quoted_table = quote_ident(&serial.table);

        let savepoint = transaction.savepoint(SEQUENCE_SAVEPOINT).await?;
        match savepoint
            .query_one(&sql, &[&quoted_table, &serial.column])
            .await
        {
            Ok(_) => {
                savepoint.commit().await?;
                tracing::info!("Reset sequence for {}.{}", serial.table, serial.column);
                outcome.reset += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                release_rolled_back(transaction, SEQUENCE_SAVEPOINT).await?;
                let failure = MigrationError::Sequence {
                    table: serial.table.clone(),
                    column: serial.column.clone(),
                    message: describe_pg_error(&e),
                };
                tracing::warn!("{}", failure);
                outcome.failures.push(failure);
            }
        }
    }

    Ok(outcome)
}
