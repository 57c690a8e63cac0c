// ABOUTME: CLI entry point for sqlite-neon-migrator
// ABOUTME: Parses commands, loads configuration once and routes to handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlite_neon_migrator::config::{MigrationConfig, Settings};
use sqlite_neon_migrator::{commands, logging};
use std::path::PathBuf;

const DEFAULT_LOG_FILE: &str = "migration.log";

#[derive(Parser)]
#[command(name = "sqlite-neon-migrator")]
#[command(about = "Migrate a SQLite database's schema and data into PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Env file with DATABASE_URL or DB_HOST/DB_PORT/DB_USER/DB_PASSWORD/DB_NAME
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,
    /// Append log output to this file [default: migration.log]
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy all SQLite tables, rows, indexes and sequences into the target
    Migrate {
        /// SQLite database file to read from
        #[arg(long)]
        sqlite_path: PathBuf,
        /// Target PostgreSQL connection string (defaults to the env file settings)
        #[arg(long)]
        target: Option<String>,
        /// Compare row counts after the migration commits
        #[arg(long)]
        verify: bool,
        /// Insert into tables that already exist on the target; skip table and index creation
        #[arg(long)]
        data_only: bool,
        /// TOML file with nullable_columns, exclude_tables and log_file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Columns that never get NOT NULL on the target (comma-separated)
        #[arg(long = "nullable-column", value_delimiter = ',')]
        nullable_columns: Vec<String>,
        /// Tables to leave out (comma-separated)
        #[arg(long = "exclude-table", value_delimiter = ',')]
        exclude_tables: Vec<String>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Compare per-table row counts between the SQLite file and the target
    Verify {
        #[arg(long)]
        sqlite_path: PathBuf,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long = "exclude-table", value_delimiter = ',')]
        exclude_tables: Vec<String>,
    },
    /// Show env file settings with secrets masked
    CheckEnv,
    /// List the SQLite file's tables with row counts
    CheckSource {
        #[arg(long)]
        sqlite_path: PathBuf,
    },
    /// Check the target connection and list its public tables
    CheckTarget {
        #[arg(long)]
        target: Option<String>,
    },
    /// Drop every table in the target's public schema
    CleanTarget {
        #[arg(long)]
        target: Option<String>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

impl Commands {
    /// Migration config for commands that take one, with CLI additions merged in
    fn migration_config(&self) -> Result<MigrationConfig> {
        let (path, nullable_columns, exclude_tables) = match self {
            Commands::Migrate {
                config,
                nullable_columns,
                exclude_tables,
                ..
            } => (config.as_deref(), nullable_columns.as_slice(), exclude_tables.as_slice()),
            Commands::Verify {
                config,
                exclude_tables,
                ..
            } => (config.as_deref(), &[][..], exclude_tables.as_slice()),
            _ => (None, &[][..], &[][..]),
        };

        let base = match path {
            Some(path) => MigrationConfig::from_file(path)?,
            None => MigrationConfig::default(),
        };
        Ok(base.with_cli_overrides(nullable_columns, exclude_tables))
    }
}

fn resolve_log_file(cli: &Cli, config: &MigrationConfig) -> Option<PathBuf> {
    if cli.no_log_file {
        return None;
    }
    cli.log_file
        .clone()
        .or_else(|| config.log_file.clone())
        .or_else(|| Some(PathBuf::from(DEFAULT_LOG_FILE)))
}

fn resolve_target(flag: Option<String>, settings: &Settings) -> Result<String> {
    flag.or_else(|| settings.target_connection()).context(
        "No target database configured: pass --target or set DATABASE_URL \
         (or DB_HOST/DB_NAME) in the env file",
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.command.migration_config()?;
    logging::init(resolve_log_file(&cli, &config).as_deref())?;
    let settings = Settings::load(&cli.env_file)?;

    match cli.command {
        Commands::Migrate {
            sqlite_path,
            target,
            verify,
            data_only,
            yes,
            ..
        } => {
            let target = resolve_target(target, &settings)?;
            commands::migrate(&sqlite_path, &target, &config, verify, data_only, yes).await
        }
        Commands::Verify {
            sqlite_path,
            target,
            ..
        } => {
            let target = resolve_target(target, &settings)?;
            commands::verify(&sqlite_path, &target, &config.exclude_tables).await?;
            Ok(())
        }
        Commands::CheckEnv => commands::check_env(&cli.env_file, &settings),
        Commands::CheckSource { sqlite_path } => commands::check_source(&sqlite_path),
        Commands::CheckTarget { target } => {
            let target = resolve_target(target, &settings)?;
            commands::check_target(&target).await
        }
        Commands::CleanTarget { target, yes } => {
            let target = resolve_target(target, &settings)?;
            commands::clean_target(&target, yes).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parses_migrate() {
        let cli = Cli::parse_from([
            "sqlite-neon-migrator",
            "migrate",
            "--sqlite-path",
            "db.sqlite3",
            "--nullable-column",
            "last_name,first_name",
            "--exclude-table",
            "django_session",
            "--verify",
            "-y",
        ]);

        let config = cli.command.migration_config().unwrap();
        assert!(config.nullable_columns.contains("last_name"));
        assert!(config.nullable_columns.contains("first_name"));
        assert!(config.exclude_tables.contains("django_session"));
        assert_eq!(
            resolve_log_file(&cli, &config),
            Some(PathBuf::from(DEFAULT_LOG_FILE))
        );
        match cli.command {
            Commands::Migrate {
                verify,
                data_only,
                yes,
                ..
            } => assert!(verify && yes && !data_only),
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_cli_parses_data_only() {
        let cli = Cli::parse_from([
            "sqlite-neon-migrator",
            "migrate",
            "--sqlite-path",
            "db.sqlite3",
            "--data-only",
        ]);
        match cli.command {
            Commands::Migrate { data_only, .. } => assert!(data_only),
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_no_log_file_wins() {
        let cli = Cli::parse_from(["sqlite-neon-migrator", "--no-log-file", "check-env"]);
        assert_eq!(resolve_log_file(&cli, &MigrationConfig::default()), None);
    }

    #[test]
    fn test_target_flag_overrides_settings() {
        let settings = Settings {
            database_url: Some("postgresql://u:p@env/db".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_target(Some("postgresql://u:p@flag/db".to_string()), &settings).unwrap(),
            "postgresql://u:p@flag/db"
        );
        assert_eq!(
            resolve_target(None, &settings).unwrap(),
            "postgresql://u:p@env/db"
        );
        assert!(resolve_target(None, &Settings::default()).is_err());
    }

    #[test]
    fn test_env_file_path_default() {
        let cli = Cli::parse_from(["sqlite-neon-migrator", "check-source", "--sqlite-path", "x"]);
        assert_eq!(cli.env_file, Path::new(".env"));
    }
}
