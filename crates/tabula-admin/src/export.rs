//! CSV export of a filtered table

use crate::query::{CompiledQuery, SelectQuery};
use crate::table::{BASE_ALIAS, Table};
use std::path::PathBuf;
use tabula_core::{Result, TabulaError};

impl Table {
    /// Header and statement of an export: every column as text, foreign
    /// keys replaced by their titles, newlines normalized and NULL as ''
    pub async fn export_query(&self) -> Result<(Vec<String>, CompiledQuery)> {
        let schema = self.schema().await?;
        let dialect = self.db.dialect();
        let mut query = SelectQuery::new(format!(
            "{} AS {}",
            dialect.quote_identifier(&self.name),
            dialect.quote_identifier(BASE_ALIAS)
        ));

        let mut header = Vec::new();
        for (idx, column) in schema.columns().enumerate() {
            let target = self
                .title_target(column, &format!("e{}", idx), &mut query)
                .await?;
            let expr = if column.is_point() {
                dialect.geometry_as_text(&target)
            } else {
                target
            };
            query.project(format!(
                "IFNULL({}, '') AS {}",
                dialect.normalize_newlines(&expr),
                dialect.quote_identifier(column.name())
            ));
            header.push(column.title_name());
        }
        self.apply_filters(&schema, &mut query).await?;
        Ok((header, query.build()))
    }

    /// Write the filtered rows to a fresh CSV file in the export directory
    #[tracing::instrument(skip(self), fields(table = %self.name))]
    pub async fn export(&self) -> Result<PathBuf> {
        let (header, compiled) = self.export_query().await?;
        let dir = self.db.config().export_dir();
        let path = dir.join(format!("{}_{}.csv", self.name, uuid::Uuid::new_v4()));

        self.db
            .connection()
            .write_query_to_file(&header, &compiled.sql, &compiled.params, &path)
            .await
            .map_err(|e| {
                TabulaError::Export(format!("Unable to export '{}': {}", self.name, e))
            })?;

        if !path.exists() {
            return Err(TabulaError::Export(format!(
                "Export file {} was not created",
                path.display()
            )));
        }
        tracing::info!(table = %self.name, path = %path.display(), "table exported");
        Ok(path)
    }
}
