//! Structure changes: add, alter, rename, comment and drop

use crate::ddl::ForeignKeyConstraint;
use crate::table::Table;
use crate::xtype::XType;
use serde::{Deserialize, Serialize};
use tabula_core::{Result, SqlDialect, TabulaError, Value};

/// Definition of a column to add or of an altered column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub xtype: XType,
    /// Length, `precision,scale` or enum options, per `XType::sql_definition`
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub unique: bool,
    /// Referenced table of an `fk` column
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Place the column after this one, where the engine supports it
    #[serde(default)]
    pub after: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, xtype: XType) -> Self {
        Self {
            name: name.into(),
            xtype,
            size: None,
            nullable: true,
            default: None,
            unique: false,
            references: None,
            comment: None,
            after: None,
        }
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.after = Some(column.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TabulaError::Validation("Column name is required".into()));
        }
        if self.xtype == XType::Fk && self.references.is_none() {
            return Err(TabulaError::Validation(format!(
                "Cross reference column '{}' needs a referenced table",
                self.name
            )));
        }
        Ok(())
    }

    /// Column definition without the column name. SQLite takes foreign
    /// keys inline, as it cannot add a constraint to an existing table.
    pub fn to_sql(&self, dialect: SqlDialect, referenced_pk: Option<&str>) -> Result<String> {
        self.validate()?;
        let mut sql = self.xtype.sql_definition(self.size.as_deref(), dialect)?;
        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {}", dialect.quote_string(default)));
        }
        if let (SqlDialect::MySql, Some(comment)) = (dialect, &self.comment) {
            sql.push_str(&format!(" COMMENT {}", dialect.quote_string(comment)));
        }
        if let (SqlDialect::Sqlite, Some(target)) = (dialect, &self.references) {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                dialect.quote_identifier(target),
                dialect.quote_identifier(referenced_pk.unwrap_or("id"))
            ));
        }
        Ok(sql)
    }
}

impl Table {
    async fn referenced_pk(&self, definition: &ColumnDefinition) -> Result<Option<String>> {
        match &definition.references {
            Some(target) => Ok(self.db.schema_of(target).await?.pk_name().map(str::to_string)),
            None => Ok(None),
        }
    }

    /// Add a column, with its unique index and foreign key
    #[tracing::instrument(skip(self, definition), fields(table = %self.name, column = %definition.name))]
    pub async fn add_column(&self, definition: &ColumnDefinition) -> Result<()> {
        self.db.require_admin()?;
        let dialect = self.db.dialect();
        let referenced_pk = self.referenced_pk(definition).await?;
        let sql = definition.to_sql(dialect, referenced_pk.as_deref())?;

        self.db
            .execute_ddl(&dialect.add_column(
                &self.name,
                &definition.name,
                &sql,
                definition.after.as_deref(),
            ))
            .await?;
        let constrained = self.add_constraints(definition, referenced_pk.as_deref()).await;
        self.reset();
        constrained
    }

    async fn add_constraints(
        &self,
        definition: &ColumnDefinition,
        referenced_pk: Option<&str>,
    ) -> Result<()> {
        let dialect = self.db.dialect();
        if definition.unique {
            self.db
                .execute_ddl(&dialect.add_unique_index(&self.name, &definition.name))
                .await?;
        }
        if let (SqlDialect::MySql, Some(target)) = (dialect, &definition.references) {
            self.db
                .execute_ddl(&dialect.add_foreign_key(
                    &self.name,
                    &definition.name,
                    target,
                    referenced_pk.unwrap_or("id"),
                )?)
                .await?;
            self.db.reset_table(target);
        }
        Ok(())
    }

    /// Redefine `column`: its unique index and foreign key constraint are
    /// dropped, the new definition applied, then constraints re-added
    #[tracing::instrument(skip(self, definition), fields(table = %self.name))]
    pub async fn alter_column(&self, column: &str, definition: &ColumnDefinition) -> Result<()> {
        self.db.require_admin()?;
        let dialect = self.db.dialect();
        let schema = self.schema().await?;
        let current = schema
            .column(column)
            .ok_or_else(|| crate::table::column_not_found(&self.name, column))?;
        let referenced_pk = self.referenced_pk(definition).await?;
        let sql = definition.to_sql(dialect, referenced_pk.as_deref())?;

        let drop_unique = current.is_unique().then(|| {
            let index = match dialect {
                SqlDialect::MySql => column.to_string(),
                SqlDialect::Sqlite => format!("{}_{}_unique", self.name, column),
            };
            dialect.drop_index(&self.name, &index)
        });
        let foreign_key = schema
            .constraint_for(column)
            .filter(|fk| fk.constraint.is_some());
        let drop_foreign_key = foreign_key
            .and_then(|fk| fk.constraint.as_deref())
            .map(|constraint| dialect.drop_foreign_key(&self.name, constraint))
            .transpose()?;
        let change = dialect.change_column(
            &self.name,
            column,
            &definition.name,
            &sql,
            definition.after.as_deref(),
        )?;

        let applied = self
            .apply_column_change(
                drop_unique.as_deref(),
                drop_foreign_key.as_deref(),
                &change,
                definition,
                referenced_pk.as_deref(),
            )
            .await;
        if applied.is_err() {
            self.restore_constraints(column, current.is_unique(), foreign_key).await;
        }
        if let Some(previous) = current.references() {
            self.db.reset_table(previous);
        }
        self.reset();
        applied?;
        tracing::info!(table = %self.name, column = %column, "column altered");
        Ok(())
    }

    /// Drop the old constraints, change the column and add the new constraints.
    /// Stops at the first failing statement.
    async fn apply_column_change(
        &self,
        drop_unique: Option<&str>,
        drop_foreign_key: Option<&str>,
        change: &str,
        definition: &ColumnDefinition,
        referenced_pk: Option<&str>,
    ) -> Result<()> {
        for sql in [drop_unique, drop_foreign_key, Some(change)].into_iter().flatten() {
            self.db.execute_ddl(sql).await?;
        }
        self.add_constraints(definition, referenced_pk).await
    }

    /// Put back the constraints of `column` after a failed change; only logs failures
    async fn restore_constraints(
        &self,
        column: &str,
        unique: bool,
        foreign_key: Option<&ForeignKeyConstraint>,
    ) {
        let Ok(schema) = self.reload().await else {
            return;
        };
        let Some(current) = schema.column(column) else {
            return;
        };
        let dialect = self.db.dialect();
        if unique && !current.is_unique() {
            if let Err(e) = self
                .db
                .execute_ddl(&dialect.add_unique_index(&self.name, column))
                .await
            {
                tracing::warn!(table = %self.name, column = %column, error = %e, "failed to restore unique index");
            }
        }
        if let Some(fk) = foreign_key {
            if schema.constraint_for(column).is_none() {
                let restored = match dialect.add_foreign_key(
                    &self.name,
                    column,
                    &fk.referenced_table,
                    fk.referenced_column.as_deref().unwrap_or("id"),
                ) {
                    Ok(sql) => self.db.execute_ddl(&sql).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = restored {
                    tracing::warn!(table = %self.name, column = %column, error = %e, "failed to restore foreign key");
                }
            }
        }
    }

    /// Rename the table; its change history follows the new name
    #[tracing::instrument(skip(self), fields(table = %self.name))]
    pub async fn rename(&mut self, new_name: &str) -> Result<()> {
        self.db.require_admin()?;
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(TabulaError::Validation("A table name is required".into()));
        }
        let dialect = self.db.dialect();
        let referencing = self.db.referencing_tables(&self.name).await?;
        self.db
            .execute_ddl(&dialect.rename_table(&self.name, new_name))
            .await?;
        self.db.tracker().rename_table(&self.name, new_name).await?;

        for table in &referencing {
            self.db.reset_table(table);
        }
        self.db.forget_table(&self.name);
        self.db.forget_table(new_name);
        tracing::info!(from = %self.name, to = %new_name, "table renamed");
        *self = Table::new(self.db.clone(), new_name);
        Ok(())
    }

    pub async fn set_comment(&self, comment: &str) -> Result<()> {
        self.db.require_admin()?;
        let dialect = self.db.dialect();
        self.db
            .execute_ddl(&dialect.set_table_comment(&self.name, comment)?)
            .await?;
        self.reset();
        Ok(())
    }

    /// Drop the table or view and purge its change history
    #[tracing::instrument(skip(self), fields(table = %self.name))]
    pub async fn drop(self) -> Result<()> {
        self.db.require_admin()?;
        let dialect = self.db.dialect();
        let keyword = if self.is_view().await? { "VIEW" } else { "TABLE" };
        self.db
            .execute_ddl(&format!(
                "DROP {} {}",
                keyword,
                dialect.quote_identifier(&self.name)
            ))
            .await?;
        self.db.tracker().purge_table(&self.name).await;
        self.db.forget_table(&self.name);
        tracing::info!(table = %self.name, "table dropped");
        Ok(())
    }

    /// Distinct values of `column`, for choosing filter values
    pub async fn distinct_values(&self, column: &str) -> Result<Vec<Value>> {
        let schema = self.schema().await?;
        if !schema.has_column(column) {
            return Err(crate::table::column_not_found(&self.name, column));
        }
        let dialect = self.db.dialect();
        let q = dialect.quote_identifier(column);
        let result = self
            .db
            .query(
                &format!(
                    "SELECT DISTINCT {} FROM {} ORDER BY {}",
                    q,
                    dialect.quote_identifier(&self.name),
                    q
                ),
                &[],
            )
            .await?;
        Ok(result.rows.into_iter().filter_map(|row| row.values.into_iter().next()).collect())
    }
}
