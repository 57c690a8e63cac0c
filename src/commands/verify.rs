// ABOUTME: Verify command implementation - Compare row counts after migration
// ABOUTME: Opens fresh source and target connections and reports per-table count mismatches

use crate::migration::{tables_to_migrate, verify_counts, VerificationReport};
use crate::{postgres, sqlite};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Compare row counts between the SQLite file and the target database
///
/// Uses its own connections, so it can run standalone or right after a
/// migration. Tables in `exclude_tables` are skipped, the same way the
/// migration skips them.
///
/// Mismatches are logged as warnings and returned in the report; they do not
/// make this function fail. Rows rejected during migration are expected to
/// show up here.
///
/// # Errors
///
/// Fails if either database cannot be opened or the source tables cannot be
/// listed or counted.
pub async fn verify(
    sqlite_path: &Path,
    target_url: &str,
    exclude_tables: &BTreeSet<String>,
) -> Result<VerificationReport> {
    tracing::info!("Starting row count verification...");
    tracing::info!("");

    tracing::info!("Opening source database...");
    let source = sqlite::open_source(sqlite_path)?;

    tracing::info!("Connecting to target database...");
    let target = postgres::connect_with_retry(target_url)
        .await
        .context("Failed to connect to target database")?;

    let tables = tables_to_migrate(&source, exclude_tables)
        .context("Failed to list tables from source database")?;

    if tables.is_empty() {
        tracing::warn!("⚠ No tables found to verify");
        return Ok(VerificationReport::default());
    }

    tracing::info!("Found {} tables to verify", tables.len());
    tracing::info!("");

    let report = verify_counts(&source, &target, &tables).await?;
    report.log_summary();

    Ok(report)
}
