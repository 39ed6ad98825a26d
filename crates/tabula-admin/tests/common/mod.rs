//! Shared fixtures for the admin engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use indoc::indoc;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Once};
use tabula_admin::{AdminConfig, Capability, Database, Grants, User, Value};
use tabula_core::{
    Connection, QueryResult, Result, SchemaIntrospection, SqlDialect, StatementResult,
};
use tabula_driver_sqlite::SqliteConnection;
use tempfile::TempDir;

pub const FIXTURE: &str = indoc! {"
    CREATE TABLE types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title VARCHAR(100) NOT NULL UNIQUE
    );
    CREATE TABLE items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title VARCHAR(150) NOT NULL,
        type_id INT(10) NOT NULL REFERENCES types (id),
        active TINYINT(1) NOT NULL DEFAULT 0,
        weight INT(10),
        note VARCHAR(200)
    );
    CREATE TABLE notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title VARCHAR(100) NOT NULL
    );
    CREATE TABLE places (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name VARCHAR(50) NOT NULL,
        location POINT
    );
    CREATE VIEW item_titles AS SELECT id, title FROM items;
    INSERT INTO types (title) VALUES ('Cat'), ('Dog');
"};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// SQLite connection that records every statement it runs
pub struct RecordingConnection {
    inner: SqliteConnection,
    log: Mutex<Vec<String>>,
}

impl RecordingConnection {
    pub fn new(inner: SqliteConnection) -> Self {
        Self {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn query_log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|sql| sql.starts_with(prefix)).count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Run SQL directly, bypassing the log
    pub async fn raw(&self, sql: &str) {
        self.inner.execute_batch(sql).await.unwrap();
    }

    /// First cell of a query run directly, as an integer
    pub async fn scalar(&self, sql: &str) -> i64 {
        self.inner
            .query(sql, &[])
            .await
            .unwrap()
            .scalar()
            .and_then(Value::as_i64)
            .unwrap()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.log.lock().push(sql.to_string());
        self.inner.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.log.lock().push(sql.to_string());
        self.inner.query(sql, params).await
    }

    async fn write_query_to_file(
        &self,
        header: &[String],
        sql: &str,
        params: &[Value],
        path: &Path,
    ) -> Result<()> {
        self.log.lock().push(sql.to_string());
        self.inner.write_query_to_file(header, sql, params, path).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        self.inner.as_schema_introspection()
    }
}

pub struct Fixture {
    pub db: Database,
    pub conn: Arc<RecordingConnection>,
    pub export_dir: TempDir,
}

pub fn admin() -> User {
    User::new(1, "admin").with_role("administrator")
}

pub async fn fixture() -> Fixture {
    fixture_as(admin(), Grants::default()).await
}

pub async fn fixture_as(user: User, grants: Grants) -> Fixture {
    init_tracing();
    let sqlite = SqliteConnection::open_in_memory().unwrap();
    sqlite.execute_batch(FIXTURE).await.unwrap();
    let conn = Arc::new(RecordingConnection::new(sqlite));
    let export_dir = tempfile::tempdir().unwrap();

    let config = AdminConfig {
        export_dir: Some(export_dir.path().to_path_buf()),
        ..AdminConfig::default()
    };
    let db = Database::new(conn.clone(), Arc::new(grants), user, config);
    Fixture {
        db,
        conn,
        export_dir,
    }
}

/// Grants of an `editor` role that may read everything and edit `items`
pub fn editor_grants() -> Grants {
    let mut grants = Grants::default();
    grants
        .grant("editor", Capability::Read, "items")
        .grant("editor", Capability::Read, "types")
        .grant("editor", Capability::Update, "items");
    grants
}

pub fn data(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
