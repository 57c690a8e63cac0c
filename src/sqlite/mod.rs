// ABOUTME: SQLite source database access for migration to PostgreSQL
// ABOUTME: Opens the source file read-only and exposes catalog and row readers

pub mod catalog;
pub mod reader;

pub use catalog::{
    describe_table, list_tables, ColumnDescriptor, IndexDescriptor, TableDescriptor,
};
pub use reader::{count_rows, read_rows, Row};

use crate::error::{MigrationError, Side};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Open the source SQLite database read-only
///
/// Fails with a connection error if the file does not exist instead of letting
/// SQLite create an empty database.
pub fn open_source(path: &Path) -> Result<Connection, MigrationError> {
    if !path.is_file() {
        return Err(MigrationError::Connection {
            side: Side::Source,
            message: format!("SQLite database '{}' not found", path.display()),
        });
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| MigrationError::Connection {
        side: Side::Source,
        message: format!("Failed to open '{}': {}", path.display(), e),
    })?;

    // Reading the schema fails fast on files that are not SQLite databases
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|e| MigrationError::Connection {
        side: Side::Source,
        message: format!("'{}' is not a readable SQLite database: {}", path.display(), e),
    })?;

    tracing::info!("Connected to SQLite database: {}", path.display());
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_missing_file_is_connection_error() {
        let err = open_source(Path::new("/nonexistent/db.sqlite3")).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Connection {
                side: Side::Source,
                ..
            }
        ));
    }

    #[test]
    fn test_open_non_sqlite_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a database, just some text padding it out")
            .unwrap();
        assert!(open_source(file.path()).is_err());
    }

    #[test]
    fn test_open_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        }

        let conn = open_source(&path).unwrap();
        assert_eq!(list_tables(&conn).unwrap(), vec!["t".to_string()]);
    }
}
