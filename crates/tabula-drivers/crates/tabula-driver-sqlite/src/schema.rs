//! SQLite schema introspection mapped onto `SHOW`-style records

use async_trait::async_trait;
use std::collections::HashSet;
use tabula_core::{
    ColumnDescription, Connection, KeyKind, Result, SchemaIntrospection, TableInfo, TableType,
    TabulaError, Value,
};

use crate::SqliteConnection;

#[async_trait]
impl SchemaIntrospection for SqliteConnection {
    #[tracing::instrument(skip(self))]
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let result = self
            .query(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
                &[],
            )
            .await?;

        let tables: Vec<TableInfo> = result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get_string("name")?;
                let table_type = match row.get_string("type").as_deref() {
                    Some("view") => TableType::View,
                    _ => TableType::Table,
                };
                Some(TableInfo {
                    name,
                    table_type,
                    comment: None,
                })
            })
            .collect();

        tracing::debug!(count = tables.len(), "listed SQLite tables");
        Ok(tables)
    }

    #[tracing::instrument(skip(self))]
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescription>> {
        let info = self
            .query(
                "SELECT name, type, \"notnull\" AS not_null, dflt_value, pk \
                 FROM pragma_table_info(?) ORDER BY cid",
                &[Value::from(table)],
            )
            .await?;
        if info.rows.is_empty() {
            return Err(TabulaError::NotFound(format!("Table '{}' not found", table)));
        }

        let unique_columns = self.single_column_unique_indexes(table).await?;
        let pk_count = info
            .rows
            .iter()
            .filter(|row| row.get_by_name("pk").and_then(Value::as_i64).unwrap_or(0) > 0)
            .count();

        let columns = info
            .rows
            .iter()
            .map(|row| {
                let field = row.get_string("name").unwrap_or_default();
                let column_type = row.get_string("type").unwrap_or_default().to_lowercase();
                let is_pk = row.get_by_name("pk").and_then(Value::as_i64).unwrap_or(0) > 0;
                let not_null = row
                    .get_by_name("not_null")
                    .and_then(Value::as_i64)
                    .unwrap_or(0)
                    != 0;

                let key = if is_pk {
                    KeyKind::Primary
                } else if unique_columns.contains(&field) {
                    KeyKind::Unique
                } else {
                    KeyKind::None
                };

                // INTEGER PRIMARY KEY aliases the rowid
                let extra = if is_pk && pk_count == 1 && column_type == "integer" {
                    "auto_increment".to_string()
                } else {
                    String::new()
                };

                ColumnDescription {
                    field,
                    column_type,
                    nullable: !not_null && !is_pk,
                    key,
                    default: row.get_string("dflt_value").map(|d| unquote_default(&d)),
                    extra,
                    comment: None,
                    collation: None,
                }
            })
            .collect();

        Ok(columns)
    }

    #[tracing::instrument(skip(self))]
    async fn show_create(&self, table: &str) -> Result<String> {
        let result = self
            .query(
                "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
                &[Value::from(table)],
            )
            .await?;
        result
            .rows
            .first()
            .and_then(|row| row.get_string("sql"))
            .ok_or_else(|| TabulaError::NotFound(format!("Table '{}' not found", table)))
    }
}

impl SqliteConnection {
    /// Columns covered on their own by a UNIQUE index or constraint
    async fn single_column_unique_indexes(&self, table: &str) -> Result<HashSet<String>> {
        let indexes = self
            .query(
                "SELECT name FROM pragma_index_list(?) WHERE \"unique\" = 1 AND origin != 'pk'",
                &[Value::from(table)],
            )
            .await?;

        let mut columns = HashSet::new();
        for index in indexes.rows.iter().filter_map(|row| row.get_string("name")) {
            let parts = self
                .query(
                    "SELECT name FROM pragma_index_info(?)",
                    &[Value::from(index.as_str())],
                )
                .await?;
            if let [only] = parts.rows.as_slice()
                && let Some(name) = only.get_string("name")
            {
                columns.insert(name);
            }
        }
        Ok(columns)
    }
}

/// `'abc'` -> `abc`; expressions such as `CURRENT_TIMESTAMP` pass through
fn unquote_default(default: &str) -> String {
    let trimmed = default.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        trimmed[1..trimmed.len() - 1].replace("''", "'")
    } else {
        trimmed.to_string()
    }
}
