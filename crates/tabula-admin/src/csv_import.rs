//! CSV import into a table

use crate::change_tracker::ChangeSession;
use crate::database::Database;
use crate::grants::Capability;
use crate::schema::TableSchema;
use crate::table::{BASE_ALIAS, Table};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tabula_core::{Result, TabulaError, UTF8_BOM, Value};

/// A parsed CSV file: one header row and any number of data rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFile {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvFile {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let data = data.strip_prefix(UTF8_BOM.as_bytes()).unwrap_or(data);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| TabulaError::Validation(format!("Failed to read CSV headers: {}", e)))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(TabulaError::Validation("CSV header is empty".into()));
        }

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                TabulaError::Validation(format!("Row {}: CSV parse error: {}", idx + 2, e))
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!(headers = headers.len(), rows = rows.len(), "CSV file parsed");
        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read(path)?)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Line of the file a data row came from, the header being line 1
    pub fn line_number(row_index: usize) -> usize {
        row_index + 2
    }

    fn cell(&self, row: &[String], header: &str) -> Option<String> {
        let idx = self.headers.iter().position(|h| h == header)?;
        row.get(idx).cloned()
    }

    fn check_map(&self, schema: &TableSchema, map: &ColumnMap) -> Result<()> {
        if map.is_empty() {
            return Err(TabulaError::Validation("No columns are mapped".into()));
        }
        for (column, header) in map.iter() {
            if !schema.has_column(column) {
                return Err(crate::table::column_not_found(schema.name(), column));
            }
            if !self.headers.iter().any(|h| h == header) {
                return Err(TabulaError::Validation(format!(
                    "Header '{}' is not in the file",
                    header
                )));
            }
        }
        Ok(())
    }

    /// Problems that would stop rows from importing: missing required
    /// values and foreign key titles that match no record
    #[tracing::instrument(skip_all, fields(table = %table.name()))]
    pub async fn validate(&self, table: &Table, map: &ColumnMap) -> Result<Vec<ImportRowError>> {
        let schema = table.schema().await?;
        self.check_map(&schema, map)?;
        let db = table.database();

        let mut errors = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let line = Self::line_number(idx);
            for column in schema.columns() {
                let value = map
                    .get(column.name())
                    .and_then(|header| self.cell(row, header))
                    .unwrap_or_default();

                if value.trim().is_empty() {
                    if column.is_required() {
                        errors.push(ImportRowError::new(
                            line,
                            Some(column.name()),
                            format!("'{}' is required", column.title_name()),
                        ));
                    }
                    continue;
                }
                if let Some(target) = column.references() {
                    if let Err(e) = resolve_title(db, target, &value).await {
                        errors.push(ImportRowError::new(line, Some(column.name()), e.to_string()));
                    }
                }
            }
        }
        Ok(errors)
    }

    /// Import every row, updating rows whose mapped primary key exists and
    /// inserting the rest. All rows share one changeset; per-row failures
    /// are collected instead of stopping the import.
    #[tracing::instrument(skip_all, fields(table = %table.name(), rows = self.rows.len()))]
    pub async fn import(
        &self,
        table: &Table,
        map: &ColumnMap,
        session: &mut ChangeSession,
    ) -> Result<ImportOutcome> {
        table.database().require(Capability::Import, table.name())?;
        let schema = table.schema().await?;
        self.check_map(&schema, map)?;

        session.set_keep_open(true);
        let outcome = self.import_rows(table, &schema, map, session).await;
        session.close();
        let outcome = outcome?;

        tracing::info!(
            table = %table.name(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.errors.len(),
            "CSV import finished"
        );
        Ok(outcome)
    }

    async fn import_rows(
        &self,
        table: &Table,
        schema: &TableSchema,
        map: &ColumnMap,
        session: &mut ChangeSession,
    ) -> Result<ImportOutcome> {
        let db = table.database();
        let pk_name = schema.pk_name();
        let mut outcome = ImportOutcome::default();

        'rows: for (idx, row) in self.rows.iter().enumerate() {
            let line = Self::line_number(idx);
            let mut data = IndexMap::new();
            for (column_name, header) in map.iter() {
                let Some(column) = schema.column(column_name) else {
                    continue;
                };
                let raw = self.cell(row, header).unwrap_or_default();
                let value = match column.references() {
                    Some(target) if !raw.trim().is_empty() => {
                        match resolve_title(db, target, &raw).await {
                            Ok(id) => id,
                            Err(e) => {
                                outcome
                                    .errors
                                    .push(ImportRowError::new(line, Some(column_name.as_str()), e.to_string()));
                                continue 'rows;
                            }
                        }
                    }
                    _ => Value::String(raw),
                };
                data.insert(column_name.clone(), value);
            }

            let pk = pk_name
                .and_then(|name| data.get(name))
                .filter(|value| !value.is_blank())
                .cloned();
            let existed = match &pk {
                Some(pk) => table.find_record(pk).await?.is_some(),
                None => false,
            };

            match table.save_record(&data, pk.as_ref(), session).await {
                Ok(_) if existed => outcome.updated += 1,
                Ok(_) => outcome.inserted += 1,
                Err(e) if e.is_permission() => return Err(e),
                Err(e) => {
                    tracing::debug!(line, error = %e, "import row failed");
                    outcome.errors.push(ImportRowError::new(line, None, e.to_string()));
                }
            }
        }
        Ok(outcome)
    }
}

/// The id of the row of `table` whose title is `title`
async fn resolve_title(db: &Database, table: &str, title: &str) -> Result<Value> {
    let schema = db.schema_of(table).await?;
    let pk = schema
        .pk_name()
        .ok_or_else(|| TabulaError::Schema(format!("Table '{}' has no primary key", table)))?;
    let title_column = match schema.title_column() {
        Some(column) if !column.is_pk() => column.name().to_string(),
        _ => pk.to_string(),
    };

    let dialect = db.dialect();
    let q = |s: &str| dialect.quote_identifier(s);
    let result = db
        .query(
            &format!(
                "SELECT {a}.{pk} FROM {t} AS {a} WHERE {} = ? LIMIT 2",
                dialect.cast_to_text(&format!("{}.{}", q(BASE_ALIAS), q(&title_column))),
                a = q(BASE_ALIAS),
                pk = q(pk),
                t = q(table),
            ),
            &[Value::from(title.trim())],
        )
        .await?;

    match result.rows.len() {
        0 => Err(TabulaError::DataIntegrity(format!(
            "'{}' matches no record of '{}'",
            title.trim(),
            table
        ))),
        1 => Ok(result.scalar().cloned().unwrap_or(Value::Null)),
        _ => Err(TabulaError::DataIntegrity(format!(
            "'{}' matches more than one record of '{}'",
            title.trim(),
            table
        ))),
    }
}

/// Table column -> CSV header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: IndexMap<String, String>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, header: impl Into<String>) -> Self {
        self.insert(column, header);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, header: impl Into<String>) {
        self.columns.insert(column.into(), header.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Map each column to the header equal to its name or titlecased name
    pub fn auto_match(schema: &TableSchema, headers: &[String]) -> Self {
        let mut map = Self::new();
        for column in schema.columns() {
            let title = column.title_name();
            if let Some(header) = headers.iter().find(|h| {
                h.eq_ignore_ascii_case(column.name()) || h.eq_ignore_ascii_case(&title)
            }) {
                map.insert(column.name(), header.clone());
            }
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRowError {
    /// Line in the CSV file
    pub row: usize,
    pub column: Option<String>,
    pub message: String,
}

impl ImportRowError {
    fn new(row: usize, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ImportRowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(column) => write!(f, "Row {}, {}: {}", self.row, column, self.message),
            None => write!(f, "Row {}: {}", self.row, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<ImportRowError>,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use tabula_core::{ColumnDescription, KeyKind};

    #[test]
    fn test_parse_strips_bom_and_trims() {
        let data = format!("{}{}", UTF8_BOM, indoc! {r#"
            ID, Title
            1,"Widget, large"
            2,Gadget
        "#});
        let file = CsvFile::parse(data.as_bytes()).unwrap();
        assert_eq!(file.headers(), &["ID".to_string(), "Title".to_string()]);
        assert_eq!(file.len(), 2);
        assert_eq!(file.rows()[0], vec!["1".to_string(), "Widget, large".to_string()]);
        assert_eq!(CsvFile::line_number(1), 3);
    }

    #[test]
    fn test_parse_empty_header() {
        assert!(CsvFile::parse(b"").unwrap_err().is_validation());
    }

    #[test]
    fn test_auto_match() {
        let mut id = ColumnDescription::new("id", "integer");
        id.key = KeyKind::Primary;
        let schema = TableSchema::from_parts(
            "items",
            "CREATE TABLE items (id INTEGER PRIMARY KEY, type_id INTEGER, title TEXT)",
            &[
                id,
                ColumnDescription::new("type_id", "integer"),
                ColumnDescription::new("title", "text"),
            ],
        );
        let headers = vec!["Type Id".to_string(), "TITLE".to_string(), "Other".to_string()];
        let map = ColumnMap::auto_match(&schema, &headers);
        assert_eq!(map, ColumnMap::new().with("type_id", "Type Id").with("title", "TITLE"));
    }

    #[test]
    fn test_row_error_display() {
        let error = ImportRowError::new(3, Some("type_id"), "'Dog' matches no record of 'types'");
        assert_eq!(error.to_string(), "Row 3, type_id: 'Dog' matches no record of 'types'");
    }
}
