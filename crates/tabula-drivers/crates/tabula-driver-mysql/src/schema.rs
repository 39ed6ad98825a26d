//! MySQL schema introspection implementation

use async_trait::async_trait;
use tabula_core::{
    ColumnDescription, Connection, KeyKind, Result, Row, SchemaIntrospection, SqlDialect,
    TableInfo, TableType, TabulaError,
};

use crate::MySqlConnection;

#[async_trait]
impl SchemaIntrospection for MySqlConnection {
    #[tracing::instrument(skip(self))]
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let result = self.query("SHOW FULL TABLES", &[]).await?;

        let tables: Vec<TableInfo> = result
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get(0).and_then(|v| v.to_text())?;
                let table_type = match row.get(1).and_then(|v| v.to_text()).as_deref() {
                    Some("VIEW") => TableType::View,
                    _ => TableType::Table,
                };
                Some(TableInfo {
                    name,
                    table_type,
                    comment: None,
                })
            })
            .collect();

        tracing::debug!(count = tables.len(), database = ?self.default_database(), "listed MySQL tables");
        Ok(tables)
    }

    #[tracing::instrument(skip(self))]
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescription>> {
        let sql = format!(
            "SHOW FULL COLUMNS FROM {}",
            SqlDialect::MySql.quote_identifier(table)
        );
        let result = self.query(&sql, &[]).await.map_err(|e| match e {
            TabulaError::Query(msg) if msg.contains("doesn't exist") => {
                TabulaError::NotFound(format!("Table '{}' not found", table))
            }
            other => other,
        })?;

        Ok(result.rows.iter().map(column_description).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn show_create(&self, table: &str) -> Result<String> {
        let sql = format!(
            "SHOW CREATE TABLE {}",
            SqlDialect::MySql.quote_identifier(table)
        );
        let result = self.query(&sql, &[]).await?;
        result
            .rows
            .first()
            .and_then(|row| row.get(1))
            .and_then(|v| v.to_text())
            .ok_or_else(|| TabulaError::NotFound(format!("Could not get DDL for table '{}'", table)))
    }
}

/// One `SHOW FULL COLUMNS` row
fn column_description(row: &Row) -> ColumnDescription {
    let non_empty = |name: &str| row.get_string(name).filter(|s| !s.is_empty());
    ColumnDescription {
        field: row.get_string("Field").unwrap_or_default(),
        column_type: row.get_string("Type").unwrap_or_default(),
        nullable: row.get_string("Null").as_deref() == Some("YES"),
        key: KeyKind::from_flag(&row.get_string("Key").unwrap_or_default()),
        default: row.get_string("Default"),
        extra: row.get_string("Extra").unwrap_or_default(),
        comment: non_empty("Comment"),
        collation: non_empty("Collation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabula_core::Value;

    #[test]
    fn test_column_description_from_show_columns_row() {
        let names = [
            "Field", "Type", "Collation", "Null", "Key", "Default", "Extra", "Privileges",
            "Comment",
        ];
        let row = Row::new(
            names.iter().map(|s| s.to_string()).collect(),
            vec![
                Value::from("id"),
                Value::from("int(10) unsigned"),
                Value::Null,
                Value::from("NO"),
                Value::from("PRI"),
                Value::Null,
                Value::from("auto_increment"),
                Value::from("select,insert"),
                Value::from(""),
            ],
        );

        let column = column_description(&row);
        assert_eq!(column.field, "id");
        assert_eq!(column.column_type, "int(10) unsigned");
        assert!(!column.nullable);
        assert_eq!(column.key, KeyKind::Primary);
        assert_eq!(column.default, None);
        assert_eq!(column.extra, "auto_increment");
        assert_eq!(column.comment, None);
        assert_eq!(column.collation, None);
    }
}
