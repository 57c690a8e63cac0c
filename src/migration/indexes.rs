// ABOUTME: Secondary index recreation on the PostgreSQL target
// ABOUTME: Skips auto-generated source indexes and tolerates creation failures

use crate::error::{describe_pg_error, MigrationError};
use crate::migration::savepoint::release_rolled_back;
use crate::sqlite::IndexDescriptor;
use crate::utils::quote_ident;
use tokio_postgres::Transaction;

const INDEX_SAVEPOINT: &str = "migrate_index";

/// Counts from recreating one table's indexes
#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub created: usize,
    /// Auto-generated or expression indexes that were not recreated
    pub skipped: usize,
    pub failures: Vec<MigrationError>,
}

/// `CREATE INDEX` for a source index, or `None` if it should not be recreated
///
/// Auto-generated indexes back constraints the target already has. Indexes
/// over expressions have no plain column list to copy.
pub fn create_index_sql(table: &str, index: &IndexDescriptor) -> Option<String> {
    if index.auto_generated || index.columns.is_empty() {
        return None;
    }

    let columns = index
        .columns
        .iter()
        .map(|c| c.as_deref().map(quote_ident))
        .collect::<Option<Vec<String>>>()?;

    Some(format!(
        "CREATE INDEX {} ON {} ({})",
        quote_ident(&index.name),
        quote_ident(table),
        columns.join(", ")
    ))
}

/// Recreate a table's explicitly created indexes as non-unique indexes
///
/// Each index is created inside a savepoint; failures such as a name already
/// taken by another relation are logged and recorded without aborting the run.
pub async fn recreate_indexes(
    transaction: &mut Transaction<'_>,
    table: &str,
    indexes: &[IndexDescriptor],
) -> Result<IndexOutcome, MigrationError> {
    let mut outcome = IndexOutcome::default();

    for index in indexes {
        let Some(sql) = create_index_sql(table, index) else {
            if index.auto_generated {
                tracing::debug!("Skipping auto-generated index: {}", index.name);
            } else {
                tracing::warn!("Skipping expression index {} on {}", index.name, table);
            }
            outcome.skipped += 1;
            continue;
        };

        let savepoint = transaction.savepoint(INDEX_SAVEPOINT).await?;
        match savepoint.batch_execute(&sql).await {
            Ok(()) => {
                savepoint.commit().await?;
                tracing::info!("Created index: {}", index.name);
                outcome.created += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                release_rolled_back(transaction, INDEX_SAVEPOINT).await?;
                let failure = MigrationError::Index {
                    table: table.to_string(),
                    index: index.name.clone(),
                    message: describe_pg_error(&e),
                };
                tracing::warn!("{}", failure);
                outcome.failures.push(failure);
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(name: &str, columns: &[Option<&str>], auto_generated: bool) -> IndexDescriptor {
        IndexDescriptor {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.map(str::to_string)).collect(),
            auto_generated,
        }
    }

    #[test]
    fn test_create_index_sql() {
        let idx = index("orders_customer_idx", &[Some("customer_id"), Some("placed")], false);
        assert_eq!(
            create_index_sql("orders", &idx).as_deref(),
            Some("CREATE INDEX \"orders_customer_idx\" ON \"orders\" (\"customer_id\", \"placed\")")
        );
    }

    #[test]
    fn test_auto_generated_index_produces_no_statement() {
        let idx = index("sqlite_autoindex_orders_1", &[Some("code")], true);
        assert_eq!(create_index_sql("orders", &idx), None);
    }

    #[test]
    fn test_expression_index_produces_no_statement() {
        let idx = index("orders_lower_code", &[None], false);
        assert_eq!(create_index_sql("orders", &idx), None);
    }
}
