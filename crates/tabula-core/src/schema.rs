//! Schema introspection traits and types

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Live schema metadata provider.
///
/// The shape follows what `SHOW FULL TABLES`, `SHOW FULL COLUMNS` and
/// `SHOW CREATE TABLE` report, so that engines without those statements
/// map their catalogs onto the same records.
#[async_trait]
pub trait SchemaIntrospection: Send + Sync {
    /// List all tables and views of the current database
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Describe the columns of a table, in schema order
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescription>>;

    /// The defining DDL text (`CREATE TABLE ...` / `CREATE VIEW ...`)
    async fn show_create(&self, table: &str) -> Result<String>;
}

/// Table information (basic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub table_type: TableType,
    pub comment: Option<String>,
}

/// Table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Table,
    View,
}

/// Index participation of a column, as in the `Key` column of `SHOW COLUMNS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyKind {
    #[default]
    None,
    /// `PRI`
    Primary,
    /// `UNI`
    Unique,
    /// `MUL`
    Multiple,
}

impl KeyKind {
    pub fn from_flag(flag: &str) -> Self {
        match flag.trim().to_ascii_uppercase().as_str() {
            "PRI" => KeyKind::Primary,
            "UNI" => KeyKind::Unique,
            "MUL" => KeyKind::Multiple,
            _ => KeyKind::None,
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            KeyKind::None => "",
            KeyKind::Primary => "PRI",
            KeyKind::Unique => "UNI",
            KeyKind::Multiple => "MUL",
        }
    }
}

/// One raw column description record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescription {
    /// Column name
    pub field: String,
    /// Full SQL type string, e.g. `varchar(100)` or `int(10) unsigned`
    pub column_type: String,
    pub nullable: bool,
    pub key: KeyKind,
    /// Default expression as reported by the engine, unquoted
    pub default: Option<String>,
    /// Extra attributes, e.g. `auto_increment`
    pub extra: String,
    pub comment: Option<String>,
    pub collation: Option<String>,
}

impl ColumnDescription {
    pub fn new(field: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            column_type: column_type.into(),
            nullable: true,
            key: KeyKind::None,
            default: None,
            extra: String::new(),
            comment: None,
            collation: None,
        }
    }
}
