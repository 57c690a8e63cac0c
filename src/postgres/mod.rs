// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and target catalog operations

pub mod catalog;
pub mod connection;

pub use catalog::{count_rows, drop_tables, list_public_tables, server_version};
pub use connection::{connect, connect_with_retry};
