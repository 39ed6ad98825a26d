//! SQL dialect variations
//!
//! The admin engine writes MySQL-flavoured SQL. Everything that differs
//! between the supported engines (geometry conversion, DDL forms, string
//! escaping) goes through `SqlDialect` so statement builders stay engine
//! agnostic.

use crate::{Result, TabulaError};

/// SQL dialects understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    /// MySQL/MariaDB SQL dialect
    MySql,
    /// SQLite SQL dialect
    Sqlite,
}

impl SqlDialect {
    /// Get display name for this SQL dialect
    pub fn display_name(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "MySQL",
            SqlDialect::Sqlite => "SQLite",
        }
    }

    /// Map a driver name to its dialect
    pub fn from_driver_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(SqlDialect::MySql),
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            _ => None,
        }
    }

    /// Quote an identifier with backticks, doubling embedded backticks.
    /// Both engines accept backtick quoting.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    /// Quote a string literal for statements that cannot take bound
    /// parameters (DDL comments, `INTO OUTFILE` paths, header rows).
    pub fn quote_string(&self, value: &str) -> String {
        match self {
            SqlDialect::MySql => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''")),
            SqlDialect::Sqlite => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Cast an expression to text, for type-insensitive `LIKE` matching
    pub fn cast_to_text(&self, expr: &str) -> String {
        match self {
            SqlDialect::MySql => format!("CAST({} AS CHAR)", expr),
            SqlDialect::Sqlite => format!("CAST({} AS TEXT)", expr),
        }
    }

    /// `ESCAPE` clause matching the patterns built by `escape_like`.
    /// MySQL string literals treat the backslash as an escape themselves.
    pub fn like_escape_clause(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "ESCAPE '\\\\'",
            SqlDialect::Sqlite => "ESCAPE '\\'",
        }
    }

    /// Render a stored geometry as WKT. SQLite has no spatial types, so
    /// geometry columns already hold WKT text there.
    pub fn geometry_as_text(&self, expr: &str) -> String {
        match self {
            SqlDialect::MySql => format!("ST_AsText({})", expr),
            SqlDialect::Sqlite => expr.to_string(),
        }
    }

    /// Placeholder for a WKT value bound into a geometry column
    pub fn geometry_from_text_placeholder(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "ST_GeomFromText(?)",
            SqlDialect::Sqlite => "?",
        }
    }

    /// Turn CRLF and lone CR into LF, for cells written to CSV
    pub fn normalize_newlines(&self, expr: &str) -> String {
        match self {
            SqlDialect::MySql => {
                format!("REPLACE(REPLACE({}, '\\r\\n', '\\n'), '\\r', '\\n')", expr)
            }
            SqlDialect::Sqlite => format!(
                "REPLACE(REPLACE({}, char(13) || char(10), char(10)), char(13), char(10))",
                expr
            ),
        }
    }

    pub fn rename_table(&self, from: &str, to: &str) -> String {
        match self {
            SqlDialect::MySql => format!(
                "RENAME TABLE {} TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
            SqlDialect::Sqlite => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(from),
                self.quote_identifier(to)
            ),
        }
    }

    /// `definition` is the column definition without the column name
    pub fn add_column(
        &self,
        table: &str,
        column: &str,
        definition: &str,
        after: Option<&str>,
    ) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            definition
        );
        if let (SqlDialect::MySql, Some(after)) = (self, after) {
            sql.push_str(&format!(" AFTER {}", self.quote_identifier(after)));
        }
        sql
    }

    pub fn change_column(
        &self,
        table: &str,
        from: &str,
        to: &str,
        definition: &str,
        after: Option<&str>,
    ) -> Result<String> {
        match self {
            SqlDialect::MySql => {
                let mut sql = format!(
                    "ALTER TABLE {} CHANGE COLUMN {} {} {}",
                    self.quote_identifier(table),
                    self.quote_identifier(from),
                    self.quote_identifier(to),
                    definition
                );
                if let Some(after) = after {
                    sql.push_str(&format!(" AFTER {}", self.quote_identifier(after)));
                }
                Ok(sql)
            }
            SqlDialect::Sqlite if from == to => Err(TabulaError::NotSupported(
                "SQLite cannot change a column definition in place".into(),
            )),
            SqlDialect::Sqlite => Ok(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(from),
                self.quote_identifier(to)
            )),
        }
    }

    pub fn add_unique_index(&self, table: &str, column: &str) -> String {
        match self {
            SqlDialect::MySql => format!(
                "ALTER TABLE {} ADD UNIQUE {} ({})",
                self.quote_identifier(table),
                self.quote_identifier(column),
                self.quote_identifier(column)
            ),
            SqlDialect::Sqlite => format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.quote_identifier(&format!("{}_{}_unique", table, column)),
                self.quote_identifier(table),
                self.quote_identifier(column)
            ),
        }
    }

    pub fn drop_index(&self, table: &str, index: &str) -> String {
        match self {
            SqlDialect::MySql => format!(
                "ALTER TABLE {} DROP INDEX {}",
                self.quote_identifier(table),
                self.quote_identifier(index)
            ),
            SqlDialect::Sqlite => format!("DROP INDEX IF EXISTS {}", self.quote_identifier(index)),
        }
    }

    pub fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        target_table: &str,
        target_column: &str,
    ) -> Result<String> {
        match self {
            SqlDialect::MySql => Ok(format!(
                "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote_identifier(table),
                self.quote_identifier(column),
                self.quote_identifier(target_table),
                self.quote_identifier(target_column)
            )),
            SqlDialect::Sqlite => Err(TabulaError::NotSupported(
                "SQLite cannot add a foreign key to an existing table".into(),
            )),
        }
    }

    pub fn drop_foreign_key(&self, table: &str, constraint: &str) -> Result<String> {
        match self {
            SqlDialect::MySql => Ok(format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                self.quote_identifier(table),
                self.quote_identifier(constraint)
            )),
            SqlDialect::Sqlite => Err(TabulaError::NotSupported(
                "SQLite cannot drop a foreign key from an existing table".into(),
            )),
        }
    }

    pub fn set_table_comment(&self, table: &str, comment: &str) -> Result<String> {
        match self {
            SqlDialect::MySql => Ok(format!(
                "ALTER TABLE {} COMMENT = {}",
                self.quote_identifier(table),
                self.quote_string(comment)
            )),
            SqlDialect::Sqlite => Err(TabulaError::NotSupported(
                "SQLite does not store table comments".into(),
            )),
        }
    }

    /// Column definition of an auto-incrementing integer primary key
    pub fn auto_increment_primary_key(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "INT(10) UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
            SqlDialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Insert a row made only of column defaults
    pub fn insert_defaults(&self, table: &str) -> String {
        match self {
            SqlDialect::MySql => format!("INSERT INTO {} () VALUES ()", self.quote_identifier(table)),
            SqlDialect::Sqlite => {
                format!("INSERT INTO {} DEFAULT VALUES", self.quote_identifier(table))
            }
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Escape `LIKE` wildcards so `value` only matches literally
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
