// ABOUTME: Source and target inspection commands
// ABOUTME: Lists SQLite tables with row counts and checks target connectivity

use crate::utils::sanitize_identifier;
use crate::{postgres, sqlite};
use anyhow::{Context, Result};
use std::path::Path;

/// List every user table in the SQLite file with its row count
pub fn check_source(sqlite_path: &Path) -> Result<()> {
    let source = sqlite::open_source(sqlite_path)?;
    let tables = sqlite::list_tables(&source).context("Failed to list source tables")?;

    tracing::info!("Found {} tables in {}", tables.len(), sqlite_path.display());
    for table in &tables {
        let rows = sqlite::count_rows(&source, table)?;
        tracing::info!("  - {}: {} rows", sanitize_identifier(table), rows);
    }

    Ok(())
}

/// Connect to the target and list its `public` tables
pub async fn check_target(target_url: &str) -> Result<()> {
    let client = postgres::connect_with_retry(target_url)
        .await
        .context("Failed to connect to target database")?;
    tracing::info!("✓ Connected to target database");

    let version = postgres::server_version(&client).await?;
    tracing::info!("Server version: {}", version);

    let tables = postgres::list_public_tables(&client).await?;
    if tables.is_empty() {
        tracing::info!("No tables in the public schema");
    } else {
        tracing::info!("Found {} tables in the public schema:", tables.len());
        for table in &tables {
            tracing::info!("  - {}", table);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_source_lists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.sqlite3");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 INSERT INTO users (name) VALUES ('a'), ('b');",
            )
            .unwrap();

        assert!(check_source(&path).is_ok());
    }

    #[test]
    fn test_check_source_missing_file() {
        assert!(check_source(Path::new("/nonexistent/app.sqlite3")).is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_check_target() {
        let url = std::env::var("TEST_TARGET_URL").unwrap();
        check_target(&url).await.unwrap();
    }
}
