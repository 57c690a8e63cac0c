// ABOUTME: Startup configuration loaded once from .env, process env and TOML
// ABOUTME: Produces explicit Settings and MigrationConfig values passed to commands

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Keys read from the `.env` file and the process environment
pub const ENV_KEYS: [&str; 6] = [
    "DATABASE_URL",
    "DB_HOST",
    "DB_PORT",
    "DB_USER",
    "DB_PASSWORD",
    "DB_NAME",
];

/// Connection settings resolved at startup
///
/// Built once from the `.env` file, with process environment variables taking
/// precedence, and then passed by reference. Nothing reads the environment
/// after this value exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    /// `.env` file the settings were read from, if it existed
    pub env_file: Option<PathBuf>,
    /// `DATABASE_URL` was set in the process environment at startup
    pub database_url_in_process_env: bool,
}

impl Settings {
    /// Load settings from `env_file` (if present) and the process environment
    pub fn load(env_file: &Path) -> Result<Self> {
        Self::load_with_env(env_file, |key| std::env::var(key).ok())
    }

    /// Load settings from `env_file`, with `lookup` standing in for the process environment
    pub fn load_with_env(env_file: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut values = read_env_file(env_file)?;
        let loaded_from = if env_file.exists() {
            Some(env_file.to_path_buf())
        } else {
            tracing::debug!("No env file at {}", env_file.display());
            None
        };

        let mut database_url_in_process_env = false;
        for key in ENV_KEYS {
            if let Some(value) = lookup(key) {
                database_url_in_process_env |= key == "DATABASE_URL";
                values.insert(key.to_string(), value);
            }
        }

        let mut settings = Self::from_map(&values);
        settings.env_file = loaded_from;
        settings.database_url_in_process_env = database_url_in_process_env;
        Ok(settings)
    }

    /// Build settings from an explicit key/value map
    pub fn from_map(values: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            database_url: get("DATABASE_URL"),
            db_host: get("DB_HOST"),
            db_port: get("DB_PORT"),
            db_user: get("DB_USER"),
            db_password: get("DB_PASSWORD"),
            db_name: get("DB_NAME"),
            env_file: None,
            database_url_in_process_env: false,
        }
    }

    /// Resolve the target connection string
    ///
    /// `DATABASE_URL` wins. Otherwise a libpq key/value string is composed from
    /// the individual `DB_*` settings when at least a host or database name is
    /// configured.
    pub fn target_connection(&self) -> Option<String> {
        if let Some(url) = &self.database_url {
            return Some(url.clone());
        }

        if self.db_host.is_none() && self.db_name.is_none() {
            return None;
        }

        let mut parts = vec![
            format!(
                "host={}",
                quote_conninfo_value(self.db_host.as_deref().unwrap_or("localhost"))
            ),
            format!(
                "port={}",
                quote_conninfo_value(self.db_port.as_deref().unwrap_or("5432"))
            ),
        ];
        if let Some(user) = &self.db_user {
            parts.push(format!("user={}", quote_conninfo_value(user)));
        }
        if let Some(password) = &self.db_password {
            parts.push(format!("password={}", quote_conninfo_value(password)));
        }
        if let Some(name) = &self.db_name {
            parts.push(format!("dbname={}", quote_conninfo_value(name)));
        }

        Some(parts.join(" "))
    }
}

/// Read `KEY=VALUE` pairs from an env file without touching the process environment
///
/// A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    if !path.exists() {
        return Ok(values);
    }

    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open env file {}", path.display()))?;
    for item in iter {
        let (key, value) =
            item.with_context(|| format!("Failed to parse env file {}", path.display()))?;
        values.insert(key, value);
    }

    Ok(values)
}

fn quote_conninfo_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Migration options from the optional TOML config file
///
/// ```toml
/// nullable_columns = ["last_name", "first_name"]
/// exclude_tables = ["django_session"]
/// log_file = "migration.log"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Columns that accept NULL in the target even when SQLite declares NOT NULL
    pub nullable_columns: BTreeSet<String>,
    /// Tables left out of migration and verification
    pub exclude_tables: BTreeSet<String>,
    pub log_file: Option<PathBuf>,
}

impl MigrationConfig {
    /// Load a config file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse config from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: MigrationConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Merge command line additions into the file-based settings
    pub fn with_cli_overrides(
        mut self,
        nullable_columns: &[String],
        exclude_tables: &[String],
    ) -> Self {
        self.nullable_columns
            .extend(nullable_columns.iter().map(|c| c.trim().to_string()));
        self.exclude_tables
            .extend(exclude_tables.iter().map(|t| t.trim().to_string()));
        self
    }
}
