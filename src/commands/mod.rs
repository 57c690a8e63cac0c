// ABOUTME: Command implementations for each CLI subcommand
// ABOUTME: Exports migrate, verify, check-env, check-source, check-target and clean-target

pub mod check_env;
pub mod clean;
pub mod inspect;
pub mod migrate;
pub mod verify;

pub use check_env::check_env;
pub use clean::clean_target;
pub use inspect::{check_source, check_target};
pub use migrate::migrate;
pub use verify::verify;

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Ask the user to confirm a destructive step, unless `skip` is set
pub(crate) fn confirm(prompt: &str, skip: bool) -> Result<bool> {
    if skip {
        return Ok(true);
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to get confirmation")
}
