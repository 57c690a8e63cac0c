// ABOUTME: Library module for sqlite-neon-migrator
// ABOUTME: Exports the migration core, database access and commands for the binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod migration;
pub mod postgres;
pub mod sqlite;
pub mod utils;
