// ABOUTME: Clean-target command implementation
// ABOUTME: Drops every table in the target public schema after confirmation

use crate::commands::confirm;
use crate::postgres;
use anyhow::{bail, Context, Result};

/// Drop all `public` tables on the target
///
/// Lists what will be dropped and asks first, unless `skip_confirmation` is
/// true. All drops happen in one transaction.
pub async fn clean_target(target_url: &str, skip_confirmation: bool) -> Result<()> {
    let mut client = postgres::connect_with_retry(target_url)
        .await
        .context("Failed to connect to target database")?;

    let tables = postgres::list_public_tables(&client).await?;
    if tables.is_empty() {
        tracing::info!("✓ Target public schema has no tables; nothing to clean");
        return Ok(());
    }

    tracing::warn!("The following {} tables will be dropped:", tables.len());
    for table in &tables {
        tracing::warn!("  - {}", table);
    }

    if !confirm("Drop these tables?", skip_confirmation)? {
        tracing::warn!("⚠ Cleanup cancelled by user");
        bail!("Cleanup cancelled by user");
    }

    postgres::drop_tables(&mut client, &tables).await?;
    tracing::info!("✓ Dropped {} tables", tables.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_clean_target() {
        let url = std::env::var("TEST_TARGET_URL").unwrap();
        clean_target(&url, true).await.unwrap();

        let client = postgres::connect(&url).await.unwrap();
        assert!(postgres::list_public_tables(&client).await.unwrap().is_empty());
    }
}
