// ABOUTME: Target DDL generation and table materialization
// ABOUTME: Builds CREATE TABLE from source descriptors, or maps onto tables the target already has

use crate::error::MigrationError;
use crate::migration::types::{translate_type, ROWID_ALIAS_TYPE};
use crate::sqlite::TableDescriptor;
use crate::utils::quote_ident;
use std::collections::BTreeSet;
use tokio_postgres::Transaction;

/// A target column derived from a source column descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    pub name: String,
    pub pg_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
}

impl ColumnPlan {
    fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.pg_type);
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

/// Target-side shape of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub name: String,
    pub columns: Vec<ColumnPlan>,
    pub primary_key: Vec<String>,
}

impl TablePlan {
    /// Translate a source table into its target shape
    ///
    /// `nullable_columns` names columns that never get NOT NULL, whatever the
    /// source declares.
    pub fn from_descriptor(table: &TableDescriptor, nullable_columns: &BTreeSet<String>) -> Self {
        let primary_key: Vec<String> = table
            .primary_key()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let rowid_alias = rowid_alias(table);

        let columns = table
            .columns
            .iter()
            .map(|column| {
                let is_rowid_alias = rowid_alias == Some(column.name.as_str());
                let pg_type = if is_rowid_alias {
                    ROWID_ALIAS_TYPE.to_string()
                } else {
                    translate_type(&column.declared_type)
                };
                let default_value = column
                    .default_value
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(|d| normalize_default(d, &pg_type));

                ColumnPlan {
                    name: column.name.clone(),
                    not_null: !column.nullable && !nullable_columns.contains(&column.name),
                    pg_type,
                    default_value,
                }
            })
            .collect();

        Self {
            name: table.name.clone(),
            columns,
            primary_key,
        }
    }

    /// Plan for inserting into a table that already exists on the target
    ///
    /// Columns keep the source's order but take the target's types, so values
    /// are cast to what the table really holds. Nothing is created, so
    /// nullability and defaults are left to the existing table.
    pub fn for_existing_table(
        table: &TableDescriptor,
        target_columns: &[(String, String)],
    ) -> Result<Self, MigrationError> {
        if target_columns.is_empty() {
            return Err(MigrationError::TargetMismatch {
                table: table.name.clone(),
                message: "table does not exist on the target".to_string(),
            });
        }

        let columns = table
            .columns
            .iter()
            .map(|column| -> Result<ColumnPlan, MigrationError> {
                let (_, pg_type) = target_columns
                    .iter()
                    .find(|(name, _)| *name == column.name)
                    .ok_or_else(|| MigrationError::TargetMismatch {
                        table: table.name.clone(),
                        message: format!("column '{}' does not exist on the target", column.name),
                    })?;
                Ok(ColumnPlan {
                    name: column.name.clone(),
                    pg_type: pg_type.clone(),
                    not_null: false,
                    default_value: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: table.name.clone(),
            columns,
            primary_key: Vec::new(),
        })
    }

    /// `CREATE TABLE` statement for the target
    pub fn create_table_sql(&self) -> String {
        let mut definitions: Vec<String> =
            self.columns.iter().map(ColumnPlan::definition).collect();
        if !self.primary_key.is_empty() {
            let keys: Vec<String> = self.primary_key.iter().map(|k| quote_ident(k)).collect();
            definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_ident(&self.name),
            definitions.join(",\n    ")
        )
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&self.name))
    }
}

/// The column that aliases SQLite's rowid, if the table has one
///
/// SQLite treats a sole `INTEGER PRIMARY KEY` column as the rowid, which is
/// what gives it auto-increment behavior.
fn rowid_alias(table: &TableDescriptor) -> Option<&str> {
    let mut keys = table.columns.iter().filter(|c| c.is_primary_key());
    match (keys.next(), keys.next()) {
        (Some(only), None)
            if only.declared_type.trim().eq_ignore_ascii_case("INTEGER")
                && only.default_value.is_none() =>
        {
            Some(only.name.as_str())
        }
        _ => None,
    }
}

/// SQLite stores booleans as 0/1, which PostgreSQL won't accept as a boolean default
fn normalize_default(default: &str, pg_type: &str) -> String {
    if pg_type == "BOOLEAN" {
        match default {
            "0" | "'0'" => return "FALSE".to_string(),
            "1" | "'1'" => return "TRUE".to_string(),
            _ => {}
        }
    }
    default.to_string()
}

/// Replace a table on the target: drop any existing one, then create it
///
/// Failure here is fatal for the run; the transaction is unusable afterwards.
pub async fn materialize_table(
    transaction: &Transaction<'_>,
    plan: &TablePlan,
) -> Result<(), MigrationError> {
    let ddl = format!("{};\n{};", plan.drop_table_sql(), plan.create_table_sql());
    tracing::debug!("DDL for '{}':\n{}", plan.name, ddl);

    transaction
        .batch_execute(&ddl)
        .await
        .map_err(|source| MigrationError::SchemaTranslation {
            table: plan.name.clone(),
            source,
        })?;

    tracing::info!("Created table: {}", plan.name);
    Ok(())
}

/// Column names and types of a `public` table on the target, in column order
///
/// A table that does not exist yields an empty list.
pub async fn describe_target_columns(
    transaction: &Transaction<'_>,
    table: &str,
) -> Result<Vec<(String, String)>, MigrationError> {
    let relation = format!("public.{}", quote_ident(table));
    let rows = transaction
        .query(
            "SELECT a.attname::text, format_type(a.atttypid, NULL)
             FROM pg_attribute a
             WHERE a.attrelid = to_regclass($1)
               AND a.attnum > 0
               AND NOT a.attisdropped
             ORDER BY a.attnum",
            &[&relation],
        )
        .await?;

    Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ColumnDescriptor;

    fn column(
        name: &str,
        declared: &str,
        nullable: bool,
        pk: u32,
        ordinal: u32,
    ) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: declared.to_string(),
            nullable,
            default_value: None,
            pk_position: pk,
            ordinal,
        }
    }

    fn users() -> TableDescriptor {
        TableDescriptor {
            name: "users".to_string(),
            columns: vec![
                column("id", "INTEGER", false, 1, 0),
                column("name", "TEXT", true, 0, 1),
                column("email", "TEXT", true, 0, 2),
            ],
            indexes: vec![],
        }
    }

    #[test]
    fn test_rowid_alias_becomes_serial() {
        let plan = TablePlan::from_descriptor(&users(), &BTreeSet::new());
        assert_eq!(plan.columns[0].pg_type, "SERIAL");
        assert_eq!(plan.primary_key, vec!["id".to_string()]);
        assert_eq!(
            plan.create_table_sql(),
            "CREATE TABLE \"users\" (\n    \"id\" SERIAL NOT NULL,\n    \"name\" TEXT,\n    \"email\" TEXT,\n    PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn test_bigint_key_is_not_serial() {
        let mut table = users();
        table.columns[0].declared_type = "bigint".to_string();
        let plan = TablePlan::from_descriptor(&table, &BTreeSet::new());
        assert_eq!(plan.columns[0].pg_type, "BIGINT");
    }

    #[test]
    fn test_composite_primary_key() {
        let table = TableDescriptor {
            name: "memberships".to_string(),
            columns: vec![
                column("group_id", "INTEGER", false, 2, 0),
                column("user_id", "INTEGER", false, 1, 1),
            ],
            indexes: vec![],
        };
        let plan = TablePlan::from_descriptor(&table, &BTreeSet::new());

        assert!(plan.columns.iter().all(|c| c.pg_type == "INTEGER"));
        assert!(plan
            .create_table_sql()
            .contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
    }

    #[test]
    fn test_no_primary_key_clause_without_keys() {
        let table = TableDescriptor {
            name: "log".to_string(),
            columns: vec![column("line", "TEXT", true, 0, 0)],
            indexes: vec![],
        };
        let sql = TablePlan::from_descriptor(&table, &BTreeSet::new()).create_table_sql();
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_exempt_column_stays_nullable() {
        let table = TableDescriptor {
            name: "auth_user".to_string(),
            columns: vec![
                column("username", "varchar(150)", false, 0, 0),
                column("last_name", "varchar(150)", false, 0, 1),
            ],
            indexes: vec![],
        };
        let exempt: BTreeSet<String> = ["last_name".to_string()].into_iter().collect();
        let plan = TablePlan::from_descriptor(&table, &exempt);

        assert!(plan.columns[0].not_null);
        assert!(!plan.columns[1].not_null);
        let sql = plan.create_table_sql();
        assert!(sql.contains("\"username\" VARCHAR(150) NOT NULL"));
        assert!(sql.contains("\"last_name\" VARCHAR(150)\n"));
    }

    #[test]
    fn test_default_clause_emitted() {
        let mut table = users();
        table.columns[1].default_value = Some("'anonymous'".to_string());
        let sql = TablePlan::from_descriptor(&table, &BTreeSet::new()).create_table_sql();
        assert!(sql.contains("\"name\" TEXT DEFAULT 'anonymous'"));
    }

    #[test]
    fn test_boolean_default_normalized() {
        let table = TableDescriptor {
            name: "flags".to_string(),
            columns: vec![ColumnDescriptor {
                default_value: Some("0".to_string()),
                ..column("active", "bool", false, 0, 0)
            }],
            indexes: vec![],
        };
        let plan = TablePlan::from_descriptor(&table, &BTreeSet::new());
        assert_eq!(plan.columns[0].default_value.as_deref(), Some("FALSE"));
    }

    #[test]
    fn test_char_column_loses_length() {
        let table = TableDescriptor {
            name: "codes".to_string(),
            columns: vec![column("code", "CHAR(10)", true, 0, 0)],
            indexes: vec![],
        };
        let plan = TablePlan::from_descriptor(&table, &BTreeSet::new());
        assert_eq!(plan.columns[0].pg_type, "TEXT");
    }

    fn target(columns: &[(&str, &str)]) -> Vec<(String, String)> {
        columns
            .iter()
            .map(|(name, pg_type)| (name.to_string(), pg_type.to_string()))
            .collect()
    }

    #[test]
    fn test_existing_table_uses_target_types() {
        let mut table = users();
        table.columns[2].nullable = false;
        let existing = target(&[
            ("email", "character varying"),
            ("id", "integer"),
            ("name", "text"),
            ("is_staff", "boolean"),
        ]);

        let plan = TablePlan::for_existing_table(&table, &existing).unwrap();
        let types: Vec<&str> = plan.columns.iter().map(|c| c.pg_type.as_str()).collect();
        assert_eq!(types, vec!["integer", "text", "character varying"]);
        assert!(plan.columns.iter().all(|c| !c.not_null && c.default_value.is_none()));
        assert!(plan.primary_key.is_empty());
    }

    #[test]
    fn test_existing_table_missing_column_is_fatal() {
        let existing = target(&[("id", "integer"), ("name", "text")]);
        let err = TablePlan::for_existing_table(&users(), &existing).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::TargetMismatch { ref table, ref message }
                if table == "users" && message.contains("'email'")
        ));
    }

    #[test]
    fn test_existing_table_must_exist() {
        let err = TablePlan::for_existing_table(&users(), &[]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_drop_table_sql_cascades() {
        let plan = TablePlan::from_descriptor(&users(), &BTreeSet::new());
        assert_eq!(plan.drop_table_sql(), "DROP TABLE IF EXISTS \"users\" CASCADE");
    }
}
