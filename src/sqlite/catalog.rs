// ABOUTME: SQLite catalog introspection producing table, column and index descriptors
// ABOUTME: Reads sqlite_master and the pragma table-valued functions

use crate::error::MigrationError;
use rusqlite::{params, Connection};

/// Table name prefix reserved for SQLite's internal tables
pub const SYSTEM_TABLE_PREFIX: &str = "sqlite_";

/// A column as declared in the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type, free-form and possibly empty
    pub declared_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    /// 1-based position within the primary key, 0 when not part of it
    pub pk_position: u32,
    pub ordinal: u32,
}

impl ColumnDescriptor {
    pub fn is_primary_key(&self) -> bool {
        self.pk_position > 0
    }
}

/// A source index and the columns it covers, in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    /// `None` entries are expressions rather than plain columns
    pub columns: Vec<Option<String>>,
    /// Created implicitly for a PRIMARY KEY or UNIQUE constraint
    pub auto_generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Key columns ordered by their position in the primary key
    pub fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        let mut keys: Vec<&ColumnDescriptor> =
            self.columns.iter().filter(|c| c.is_primary_key()).collect();
        keys.sort_by_key(|c| c.pk_position);
        keys
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// List user tables, excluding SQLite's internal `sqlite_*` tables
pub fn list_tables(conn: &Connection) -> Result<Vec<String>, MigrationError> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let tables: Vec<String> = names
        .into_iter()
        .filter(|name| !name.starts_with(SYSTEM_TABLE_PREFIX))
        .collect();

    tracing::debug!("Found {} user tables in source", tables.len());
    Ok(tables)
}

/// Column metadata in ordinal order
pub fn read_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnDescriptor>, MigrationError> {
    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk
         FROM pragma_table_info(?1)
         ORDER BY cid",
    )?;

    let columns = stmt
        .query_map(params![table], |row| {
            Ok(ColumnDescriptor {
                ordinal: row.get(0)?,
                name: row.get(1)?,
                declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                nullable: row.get::<_, i64>(3)? == 0,
                default_value: row.get(4)?,
                pk_position: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(columns)
}

/// Index metadata for a table, including which indexes SQLite created itself
pub fn read_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexDescriptor>, MigrationError> {
    let mut list = conn.prepare(
        "SELECT name, origin
         FROM pragma_index_list(?1)
         ORDER BY name",
    )?;
    let entries = list
        .query_map(params![table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut info = conn.prepare(
        "SELECT name
         FROM pragma_index_info(?1)
         ORDER BY seqno",
    )?;

    let mut indexes = Vec::with_capacity(entries.len());
    for (name, origin) in entries {
        let columns = info
            .query_map(params![name], |row| row.get::<_, Option<String>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // origin is 'c' for CREATE INDEX, 'u' for UNIQUE and 'pk' for PRIMARY KEY
        let auto_generated = origin != "c" || name.starts_with("sqlite_autoindex_");
        indexes.push(IndexDescriptor {
            name,
            columns,
            auto_generated,
        });
    }

    Ok(indexes)
}

/// Full descriptor for one table
pub fn describe_table(conn: &Connection, table: &str) -> Result<TableDescriptor, MigrationError> {
    Ok(TableDescriptor {
        name: table.to_string(),
        columns: read_columns(conn, table)?,
        indexes: read_indexes(conn, table)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT NOT NULL,
                 email VARCHAR(254) UNIQUE,
                 created DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
             );
             CREATE INDEX users_name_idx ON users (name, created);
             CREATE TABLE memberships (
                 group_id INTEGER NOT NULL,
                 user_id INTEGER NOT NULL,
                 role,
                 PRIMARY KEY (user_id, group_id)
             );
             CREATE INDEX memberships_lower_role ON memberships (lower(role));",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_excludes_system_tables() {
        let conn = fixture();
        let tables = list_tables(&conn).unwrap();
        // AUTOINCREMENT creates sqlite_sequence
        assert_eq!(tables, vec!["memberships".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_read_columns() {
        let conn = fixture();
        let columns = read_columns(&conn, "users").unwrap();

        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].declared_type, "INTEGER");
        assert_eq!(columns[0].pk_position, 1);
        assert_eq!(columns[1].name, "name");
        assert!(!columns[1].nullable);
        assert!(columns[2].nullable);
        assert_eq!(columns[2].declared_type, "VARCHAR(254)");
        assert_eq!(
            columns[3].default_value.as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert_eq!(
            columns.iter().map(|c| c.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_untyped_column_has_empty_type() {
        let conn = fixture();
        let columns = read_columns(&conn, "memberships").unwrap();
        assert_eq!(columns[2].name, "role");
        assert_eq!(columns[2].declared_type, "");
    }

    #[test]
    fn test_composite_primary_key_order() {
        let conn = fixture();
        let table = describe_table(&conn, "memberships").unwrap();
        let keys: Vec<&str> = table.primary_key().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, vec!["user_id", "group_id"]);
    }

    #[test]
    fn test_read_indexes_flags_auto_generated() {
        let conn = fixture();
        let indexes = read_indexes(&conn, "users").unwrap();

        let explicit = indexes
            .iter()
            .find(|i| i.name == "users_name_idx")
            .unwrap();
        assert!(!explicit.auto_generated);
        assert_eq!(
            explicit.columns,
            vec![Some("name".to_string()), Some("created".to_string())]
        );

        let unique = indexes
            .iter()
            .find(|i| i.name.starts_with("sqlite_autoindex_users"))
            .unwrap();
        assert!(unique.auto_generated);
    }

    #[test]
    fn test_expression_index_columns_are_none() {
        let conn = fixture();
        let indexes = read_indexes(&conn, "memberships").unwrap();
        let expr = indexes
            .iter()
            .find(|i| i.name == "memberships_lower_role")
            .unwrap();
        assert_eq!(expr.columns, vec![None]);
    }
}
