// ABOUTME: Row transfer from SQLite into PostgreSQL
// ABOUTME: Binds SQLite values as text/bytea parameters and inserts row by row under savepoints

use crate::error::{describe_pg_error, MigrationError};
use crate::migration::savepoint::release_rolled_back;
use crate::migration::schema::TablePlan;
use crate::migration::types::base_type;
use crate::sqlite::Row;
use crate::utils::quote_ident;
use indicatif::ProgressBar;
use rusqlite::types::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

const ROW_SAVEPOINT: &str = "migrate_row";

/// A source value converted into a parameter the target accepts
///
/// Everything except BYTEA columns is sent as text and cast server-side to the
/// column type, which matches how SQLite's loose typing reads back.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Text(Option<String>),
    Bytes(Option<Vec<u8>>),
}

impl BoundValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BoundValue::Text(None) | BoundValue::Bytes(None))
    }

    fn as_param(&self) -> &(dyn ToSql + Sync) {
        match self {
            BoundValue::Text(value) => value,
            BoundValue::Bytes(value) => value,
        }
    }
}

fn is_binary(pg_type: &str) -> bool {
    base_type(pg_type).eq_ignore_ascii_case("BYTEA")
}

/// Placeholder for the 1-based parameter `position` inserted into a `pg_type` column
///
/// Text goes through an explicit cast to the base type so the server parses
/// it the same way it would a literal. Length modifiers are left to the
/// column so oversized values fail instead of being truncated.
pub fn placeholder(position: usize, pg_type: &str) -> String {
    let base = base_type(pg_type).to_uppercase();
    match base.as_str() {
        "BYTEA" => format!("${}::bytea", position),
        "TEXT" | "VARCHAR" => format!("${}::text", position),
        "SERIAL" => format!("${}::text::integer", position),
        _ => format!("${}::text::{}", position, base.to_lowercase()),
    }
}

/// Parameterized INSERT with one placeholder per column, in plan order
pub fn insert_sql(plan: &TablePlan) -> String {
    let columns: Vec<String> = plan.columns.iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders: Vec<String> = plan
        .columns
        .iter()
        .enumerate()
        .map(|(idx, c)| placeholder(idx + 1, &c.pg_type))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&plan.name),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Convert one SQLite value for a `pg_type` column
///
/// Empty strings become NULL, whether stored as TEXT or as an empty BLOB.
pub fn bind_value(value: &Value, pg_type: &str) -> BoundValue {
    if is_binary(pg_type) {
        let bytes = match value {
            Value::Null => None,
            Value::Text(s) if s.is_empty() => None,
            Value::Text(s) => Some(s.as_bytes().to_vec()),
            Value::Blob(b) => Some(b.clone()),
            Value::Integer(i) => Some(i.to_string().into_bytes()),
            Value::Real(f) => Some(render_real(*f).into_bytes()),
        };
        return BoundValue::Bytes(bytes);
    }

    let text = match value {
        Value::Null => None,
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(render_real(*f)),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    };
    BoundValue::Text(text.filter(|s| !s.is_empty()))
}

fn render_real(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let infinity = if f > 0.0 { "Infinity" } else { "-Infinity" };
        infinity.to_string()
    } else {
        f.to_string()
    }
}

/// Convert a whole row, position by position
pub fn bind_row(row: &Row, plan: &TablePlan) -> Vec<BoundValue> {
    row.iter()
        .zip(plan.columns.iter())
        .map(|(value, column)| bind_value(value, &column.pg_type))
        .collect()
}

/// Result of copying one table's rows
#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub source_rows: usize,
    pub migrated_rows: usize,
    /// One `RowTransfer` error per skipped row
    pub failures: Vec<MigrationError>,
}

impl TransferOutcome {
    pub fn skipped_rows(&self) -> usize {
        self.failures.len()
    }
}

/// Insert all rows into the target table, skipping rows the server rejects
///
/// Each row runs inside its own savepoint so a rejected row rolls back alone
/// and the surrounding transaction stays usable. Rejections are logged with
/// the table name and the 1-based row number.
pub async fn transfer_rows(
    transaction: &mut Transaction<'_>,
    plan: &TablePlan,
    rows: &[Row],
    progress: &ProgressBar,
) -> Result<TransferOutcome, MigrationError> {
    let mut outcome = TransferOutcome {
        source_rows: rows.len(),
        ..Default::default()
    };

    if rows.is_empty() {
        tracing::info!("No data to migrate in table: {}", plan.name);
        return Ok(outcome);
    }

    let sql = insert_sql(plan);
    tracing::debug!("Insert statement: {}", sql);
    let statement = transaction.prepare(&sql).await?;

    progress.set_length(rows.len() as u64);
    progress.set_position(0);
    progress.set_message(plan.name.clone());

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + 1;
        let values = bind_row(row, plan);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(BoundValue::as_param).collect();

        let savepoint = transaction.savepoint(ROW_SAVEPOINT).await?;
        match savepoint.execute(&statement, &params).await {
            Ok(_) => {
                savepoint.commit().await?;
                outcome.migrated_rows += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                release_rolled_back(transaction, ROW_SAVEPOINT).await?;
                let failure = MigrationError::RowTransfer {
                    table: plan.name.clone(),
                    row: row_number,
                    message: describe_pg_error(&e),
                };
                tracing::warn!("Skipping row: {}", failure);
                outcome.failures.push(failure);
            }
        }
        progress.inc(1);
    }

    tracing::info!(
        "Migrated {} rows to table: {} ({} skipped)",
        outcome.migrated_rows,
        plan.name,
        outcome.skipped_rows()
    );
    Ok(outcome)
}
