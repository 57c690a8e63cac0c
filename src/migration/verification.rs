// ABOUTME: Post-migration row count verification
// ABOUTME: Compares per-table COUNT(*) between the SQLite source and PostgreSQL target

use crate::error::MigrationError;
use crate::{postgres, sqlite};
use rusqlite::Connection;
use tokio_postgres::Client;

/// Row counts for one table on both sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: String,
    pub source_rows: i64,
    /// Target count, or why it could not be read
    pub target_rows: Result<i64, String>,
}

impl TableCount {
    pub fn matches(&self) -> bool {
        self.target_rows.as_ref() == Ok(&self.source_rows)
    }
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub tables: Vec<TableCount>,
}

impl VerificationReport {
    pub fn matched(&self) -> usize {
        self.tables.iter().filter(|t| t.matches()).count()
    }

    pub fn mismatched(&self) -> usize {
        self.tables.len() - self.matched()
    }

    pub fn is_clean(&self) -> bool {
        self.mismatched() == 0
    }

    /// Log the per-table results and a summary block
    pub fn log_summary(&self) {
        for count in &self.tables {
            match &count.target_rows {
                Ok(target) if *target == count.source_rows => {
                    tracing::info!("  ✓ {}: {} rows", count.table, target);
                }
                Ok(target) => {
                    tracing::warn!(
                        "  ✗ {}: MISMATCH: source={}, target={}",
                        count.table,
                        count.source_rows,
                        target
                    );
                }
                Err(e) => {
                    tracing::warn!("  ✗ {}: target count unavailable: {}", count.table, e);
                }
            }
        }

        tracing::info!("");
        tracing::info!("========================================");
        tracing::info!("Verification Summary");
        tracing::info!("========================================");
        tracing::info!("Total tables: {}", self.tables.len());
        tracing::info!("✓ Matches: {}", self.matched());
        tracing::info!("✗ Mismatches: {}", self.mismatched());
        tracing::info!("========================================");

        if self.is_clean() {
            tracing::info!("✓ All {} tables have matching row counts", self.matched());
        } else {
            tracing::warn!(
                "⚠ {} table(s) differ; skipped rows are listed in the migration log",
                self.mismatched()
            );
        }
    }
}

/// Compare row counts for `tables` between source and target
///
/// Source failures are fatal. A target table that cannot be counted is
/// recorded as a mismatch.
pub async fn verify_counts(
    source: &Connection,
    target: &Client,
    tables: &[String],
) -> Result<VerificationReport, MigrationError> {
    let mut report = VerificationReport::default();

    for table in tables {
        let source_rows = sqlite::count_rows(source, table)?;
        let target_rows = postgres::count_rows(target, table)
            .await
            .map_err(|e| format!("{:#}", e));

        report.tables.push(TableCount {
            table: table.clone(),
            source_rows,
            target_rows,
        });
    }

    Ok(report)
}
