//! MySQL connection implementation

use async_trait::async_trait;
use mysql_async::{
    Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row as MySqlRow,
    consts::ColumnType, prelude::*,
};
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tabula_core::{
    ColumnMeta, Connection, QueryResult, Result, Row, SchemaIntrospection, SqlDialect,
    StatementResult, TabulaError, UTF8_BOM, Value,
};

/// Dedicated Tokio runtime for MySQL operations.
///
/// mysql_async spawns its pool management tasks with `tokio::spawn`, so every
/// pool interaction runs on this runtime regardless of the caller's executor.
fn get_mysql_runtime() -> &'static tokio::runtime::Runtime {
    static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("tabula-mysql-runtime")
            .build()
            .expect("Failed to create Tokio runtime for MySQL driver")
    })
}

/// MySQL connection wrapper
pub struct MySqlConnection {
    pool: Pool,
    database_name: Option<String>,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Connect to a MySQL database
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        tracing::info!(host = %host, port = %port, database = ?database, "connecting to MySQL database");

        let mut opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(host)
            .tcp_port(port);

        if let Some(db) = database {
            opts_builder = opts_builder.db_name(Some(db));
        }
        if let Some(u) = user {
            opts_builder = opts_builder.user(Some(u));
        }
        if let Some(p) = password {
            opts_builder = opts_builder.pass(Some(p));
        }

        // A single connection keeps LAST_INSERT_ID() and session state stable
        let constraints = PoolConstraints::new(1, 1).ok_or_else(|| {
            TabulaError::Connection("Failed to configure MySQL pool constraints (min=1, max=1)".into())
        })?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(false);
        opts_builder = opts_builder.pool_opts(pool_opts);

        let opts: Opts = opts_builder.into();

        let pool = get_mysql_runtime()
            .spawn(async move {
                let pool = Pool::new(opts);
                let _conn = pool.get_conn().await.map_err(|e| {
                    TabulaError::Connection(format!("Failed to connect to MySQL: {}", e))
                })?;
                Ok::<Pool, TabulaError>(pool)
            })
            .await
            .map_err(|e| TabulaError::Connection(format!("MySQL connection task failed: {}", e)))??;

        tracing::info!(host = %host, port = %port, database = ?database, "MySQL connection established");
        Ok(Self {
            pool,
            database_name: database.map(str::to_string),
            closed: AtomicBool::new(false),
        })
    }

    /// Get a connection from the pool, dispatched on the MySQL Tokio runtime
    async fn get_conn(&self) -> Result<Conn> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TabulaError::Connection("Connection is closed".into()));
        }
        let pool = self.pool.clone();
        get_mysql_runtime()
            .spawn(async move { pool.get_conn().await })
            .await
            .map_err(|e| TabulaError::Connection(format!("MySQL get_conn task failed: {}", e)))?
            .map_err(|e| TabulaError::Connection(format!("Failed to get MySQL connection: {}", e)))
    }

    /// Database selected at connect time
    pub fn default_database(&self) -> Option<&str> {
        self.database_name.as_deref()
    }
}

/// Convert our Value type to a bound mysql_async parameter
fn value_to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(*v as i64),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) | Value::String(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Date(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::Time(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
        Value::DateTime(v) => {
            mysql_async::Value::Bytes(v.format("%Y-%m-%d %H:%M:%S").to_string().into_bytes())
        }
        Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_mysql).collect())
    }
}

/// Convert mysql_async Value to our Value type, using column type metadata
/// to interpret byte strings from the text protocol.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => Value::from(u),
        mysql_async::Value::Float(f) => Value::Float64(f as f64),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
            let is_date_column = matches!(
                col_type,
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
            );
            match date {
                Some(date) if is_date_column => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Date(date)),
                None => Value::String(format!("{:04}-{:02}-{:02}", year, month, day)),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, _micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!("{}{:02}:{:02}:{:02}", sign, total_hours, mins, secs))
        }
    }
}

fn rows_to_result(mysql_rows: Vec<MySqlRow>) -> (Vec<ColumnMeta>, Vec<Row>) {
    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    let mut column_types = Vec::new();

    if let Some(first_row) = mysql_rows.first() {
        for (idx, col) in first_row.columns_ref().iter().enumerate() {
            let name = col.name_str().to_string();
            column_names.push(name.clone());
            column_types.push(col.column_type());
            columns.push(ColumnMeta {
                name,
                data_type: format!("{:?}", col.column_type()),
                nullable: true,
                ordinal: idx,
            });
        }
    }

    let rows = mysql_rows
        .into_iter()
        .map(|mut mysql_row| {
            let values = (0..column_names.len())
                .map(|idx| {
                    let raw = mysql_row.take(idx).unwrap_or(mysql_async::Value::NULL);
                    let col_type = column_types
                        .get(idx)
                        .copied()
                        .unwrap_or(ColumnType::MYSQL_TYPE_STRING);
                    mysql_value_to_value(raw, col_type)
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    (columns, rows)
}

/// `SELECT <header> UNION ALL <sql> INTO OUTFILE <path>` with RFC 4180 framing
fn outfile_statement(header: &[String], sql: &str, path: &Path) -> String {
    let dialect = SqlDialect::MySql;
    let header_select = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            if idx == 0 {
                dialect.quote_string(&format!("{}{}", UTF8_BOM, name))
            } else {
                dialect.quote_string(name)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {} UNION ALL {} INTO OUTFILE {} \
         FIELDS TERMINATED BY ',' ENCLOSED BY '\"' ESCAPED BY '\"' \
         LINES TERMINATED BY '\\r\\n'",
        header_select,
        sql,
        dialect.quote_string(&path.to_string_lossy())
    )
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut conn = self.get_conn().await?;
        let sql = sql.to_string();
        let params = to_params(params);

        let result = get_mysql_runtime()
            .spawn(async move {
                let outcome = match params {
                    Params::Empty => conn.query_drop(&sql).await,
                    params => conn.exec_drop(sql.as_str(), params).await,
                };
                outcome.map_err(|e| {
                    TabulaError::Query(format!("Failed to execute statement: {}", e))
                })?;
                Ok::<StatementResult, TabulaError>(StatementResult {
                    affected_rows: conn.affected_rows(),
                    last_insert_id: conn.last_insert_id().filter(|id| *id > 0),
                })
            })
            .await
            .map_err(|e| TabulaError::Query(format!("MySQL execute task failed: {}", e)))??;

        tracing::debug!(
            affected_rows = result.affected_rows,
            last_insert_id = ?result.last_insert_id,
            "statement executed"
        );
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let mut conn = self.get_conn().await?;
        let sql = sql.to_string();
        let params = to_params(params);

        let (columns, rows) = get_mysql_runtime()
            .spawn(async move {
                let mysql_rows: Vec<MySqlRow> = match params {
                    Params::Empty => conn.query(&sql).await,
                    params => conn.exec(sql.as_str(), params).await,
                }
                .map_err(|e| TabulaError::Query(format!("Failed to execute query: {}", e)))?;
                Ok::<_, TabulaError>(rows_to_result(mysql_rows))
            })
            .await
            .map_err(|e| TabulaError::Query(format!("MySQL query task failed: {}", e)))??;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            execution_time_ms,
        })
    }

    /// The server writes the file itself; the caller must share its filesystem.
    #[tracing::instrument(skip(self, header, sql, params), fields(path = %path.display()))]
    async fn write_query_to_file(
        &self,
        header: &[String],
        sql: &str,
        params: &[Value],
        path: &Path,
    ) -> Result<()> {
        let statement = outfile_statement(header, sql, path);
        self.execute(&statement, params).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing MySQL connection pool");
        self.closed.store(true, Ordering::SeqCst);
        let pool = self.pool.clone();
        get_mysql_runtime()
            .spawn(async move { pool.disconnect().await })
            .await
            .map_err(|e| TabulaError::Connection(format!("MySQL close task failed: {}", e)))?
            .map_err(|e| TabulaError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}
