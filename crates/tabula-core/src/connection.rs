//! Connection trait and bulk file output

use crate::{QueryResult, Result, Row, SchemaIntrospection, SqlDialect, StatementResult, Value};
use async_trait::async_trait;
use std::path::Path;

/// Byte order mark written in front of exported header rows
pub const UTF8_BOM: &str = "\u{FEFF}";

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "mysql")
    fn driver_name(&self) -> &str;

    /// SQL variations this connection speaks
    fn dialect(&self) -> SqlDialect;

    /// Execute a statement that modifies data or schema (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Write the result of `sql` as CSV to `path`, preceded by a header row.
    ///
    /// The default implementation runs the query and writes the file from
    /// the client. Drivers whose server can write the file directly override
    /// this.
    async fn write_query_to_file(
        &self,
        header: &[String],
        sql: &str,
        params: &[Value],
        path: &Path,
    ) -> Result<()> {
        let result = self.query(sql, params).await?;
        tracing::debug!(
            rows = result.row_count(),
            path = %path.display(),
            "writing query result to file"
        );
        write_csv_file(path, header, &result.rows)
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get schema introspection interface if supported
    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        None
    }
}

/// Write rows as RFC 4180 CSV: every field quoted, CRLF line endings,
/// NULL as an empty field and a BOM in front of the header row.
pub fn write_csv_file(path: &Path, header: &[String], rows: &[Row]) -> Result<()> {
    use std::io::Write;

    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM.as_bytes())?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::CRLF)
        .from_writer(file);

    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        let fields = row
            .values
            .iter()
            .map(|value| value.to_text().unwrap_or_default());
        writer.write_record(fields).map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_error(err: csv::Error) -> crate::TabulaError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => crate::TabulaError::Io(io),
        other => crate::TabulaError::Export(format!("{:?}", other)),
    }
}
