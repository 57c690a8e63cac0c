// ABOUTME: SQLite row reading for data transfer and verification
// ABOUTME: Reads whole tables into memory with an explicit ordinal column list

use crate::error::MigrationError;
use crate::sqlite::catalog::TableDescriptor;
use crate::utils::quote_ident;
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

/// One source row, positionally aligned with the table's columns
pub type Row = Vec<Value>;

/// Read every row of a table
///
/// Columns are selected by name in ordinal order so that each row lines up
/// with the target INSERT built from the same descriptor. The whole table is
/// held in memory.
pub fn read_rows(conn: &Connection, table: &TableDescriptor) -> Result<Vec<Row>, MigrationError> {
    let column_names = table.column_names();
    let column_list = column_names
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let query = format!("SELECT {} FROM {}", column_list, quote_ident(&table.name));
    tracing::debug!("Source query: {}", query);

    let mut row_number = 0;
    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map([], |row| {
            row_number += 1;
            column_names
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let cell = row.get_ref(idx)?;
                    Ok(owned_value(cell, &table.name, row_number, column))
                })
                .collect::<rusqlite::Result<Row>>()
        })?
        .collect::<rusqlite::Result<Vec<Row>>>()?;

    tracing::debug!("Read {} rows from '{}'", rows.len(), table.name);
    Ok(rows)
}

/// Copy a cell out of SQLite
///
/// SQLite does not enforce UTF-8 in TEXT values. Invalid sequences are
/// replaced with U+FFFD and the cell is logged with its 1-based row number.
fn owned_value(cell: ValueRef<'_>, table: &str, row_number: usize, column: &str) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(e) => {
                tracing::warn!(
                    "Row {} of table '{}', column '{}': invalid UTF-8 ({}), replacing bad bytes",
                    row_number,
                    table,
                    column,
                    e
                );
                Value::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        },
    }
}

/// Exact row count of a source table
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, MigrationError> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count = conn.query_row(&query, [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::catalog::describe_table;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT, avatar BLOB);
             INSERT INTO users VALUES (1, 'a', '', NULL);
             INSERT INTO users VALUES (2, 'b', 'c@x.com', x'CAFE');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_read_rows_in_ordinal_order() {
        let conn = fixture();
        let table = describe_table(&conn, "users").unwrap();
        let rows = read_rows(&conn, &table).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            vec![
                Value::Integer(1),
                Value::Text("a".to_string()),
                Value::Text(String::new()),
                Value::Null,
            ]
        );
        assert_eq!(rows[1][3], Value::Blob(vec![0xCA, 0xFE]));
    }

    #[test]
    fn test_invalid_utf8_text_is_replaced_not_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE legacy (id INTEGER PRIMARY KEY, note TEXT);
             INSERT INTO legacy VALUES (1, 'ok');
             INSERT INTO legacy VALUES (2, CAST(x'ff61' AS TEXT));",
        )
        .unwrap();
        let table = describe_table(&conn, "legacy").unwrap();

        let rows = read_rows(&conn, &table).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], Value::Text("ok".to_string()));
        assert_eq!(rows[1][1], Value::Text("\u{FFFD}a".to_string()));
    }

    #[test]
    fn test_count_rows() {
        let conn = fixture();
        assert_eq!(count_rows(&conn, "users").unwrap(), 2);
    }

    #[test]
    fn test_count_rows_missing_table_errors() {
        let conn = fixture();
        assert!(count_rows(&conn, "missing").is_err());
    }
}
