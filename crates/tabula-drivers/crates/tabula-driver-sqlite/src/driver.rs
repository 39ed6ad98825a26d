use async_trait::async_trait;
use std::sync::Arc;
use tabula_core::{Connection, ConnectionConfig, DatabaseDriver, Result, SqlDialect, TabulaError};

use crate::SqliteConnection;

pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    #[tracing::instrument(skip(self, config), fields(path = config.get_string("path").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let path = config.get_string("path").ok_or_else(|| {
            TabulaError::Configuration(
                "SQLite requires a 'path' or 'database' parameter, e.g. /path/to/database.db".into(),
            )
        })?;

        let conn = SqliteConnection::open(&path).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        config
            .get_string("path")
            .unwrap_or_else(|| ":memory:".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_path() {
        let driver = SqliteDriver::new();
        let err = driver.connect(&ConnectionConfig::new("sqlite")).await.err();
        assert!(matches!(err, Some(TabulaError::Configuration(_))));

        let conn = driver
            .connect(&ConnectionConfig::new_sqlite(":memory:"))
            .await
            .unwrap();
        assert_eq!(conn.dialect(), SqlDialect::Sqlite);
        assert!(conn.as_schema_introspection().is_some());
    }
}
