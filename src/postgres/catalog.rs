// ABOUTME: Target-side introspection and cleanup queries
// ABOUTME: Lists public tables, counts rows, and drops tables on the PostgreSQL target

use crate::utils::quote_ident;
use anyhow::{Context, Result};
use tokio_postgres::Client;

/// Server version string as reported by `SELECT version()`
pub async fn server_version(client: &Client) -> Result<String> {
    let row = client
        .query_one("SELECT version()", &[])
        .await
        .context("Failed to query server version")?;
    Ok(row.get(0))
}

/// List all base tables in the `public` schema
pub async fn list_public_tables(client: &Client) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT table_name::text
             FROM information_schema.tables
             WHERE table_schema = 'public'
               AND table_type = 'BASE TABLE'
             ORDER BY table_name",
            &[],
        )
        .await
        .context("Failed to list target tables")?;

    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Exact row count for a `public` table
pub async fn count_rows(client: &Client, table: &str) -> Result<i64> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let row = client
        .query_one(&query, &[])
        .await
        .with_context(|| format!("Failed to count rows in target table '{}'", table))?;
    Ok(row.get(0))
}

/// Drop the given tables (with CASCADE) in a single transaction
pub async fn drop_tables(client: &mut Client, tables: &[String]) -> Result<()> {
    let transaction = client
        .transaction()
        .await
        .context("Failed to start transaction")?;

    for table in tables {
        let statement = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(table));
        transaction
            .batch_execute(&statement)
            .await
            .with_context(|| format!("Failed to drop table '{}'", table))?;
        tracing::info!("Dropped table: {}", table);
    }

    transaction
        .commit()
        .await
        .context("Failed to commit table drops")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::connect;

    #[tokio::test]
    #[ignore]
    async fn test_server_version_and_tables() {
        let url = std::env::var("TEST_TARGET_URL").unwrap();
        let client = connect(&url).await.unwrap();

        let version = server_version(&client).await.unwrap();
        assert!(version.starts_with("PostgreSQL"));

        let tables = list_public_tables(&client).await.unwrap();
        println!("Found {} tables", tables.len());
    }
}
