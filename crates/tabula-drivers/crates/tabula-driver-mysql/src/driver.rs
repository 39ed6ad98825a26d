//! MySQL driver implementation

use async_trait::async_trait;
use std::sync::Arc;
use tabula_core::{Connection, ConnectionConfig, DatabaseDriver, Result, SqlDialect};

use crate::MySqlConnection;

/// MySQL database driver
pub struct MySqlDriver;

impl MySqlDriver {
    /// Create a new MySQL driver instance
    pub fn new() -> Self {
        tracing::debug!("MySQL driver initialized");
        Self
    }
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::MySql
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 3306 };
        let database = config.get_string("database");
        let user = config.get_string("user");
        let password = config.get_string("password");

        let conn = MySqlConnection::connect(
            &host,
            port,
            database.as_deref(),
            user.as_deref(),
            password.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to connect to MySQL database");
            e
        })?;

        tracing::info!(host = %host, port = %port, database = ?database, "MySQL connection created");
        Ok(Arc::new(conn))
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 3306 };

        let mut conn_str = String::from("mysql://");
        if let Some(u) = config.get_string("user") {
            conn_str.push_str(&u);
            conn_str.push('@');
        }
        conn_str.push_str(&format!("{}:{}", host, port));
        if let Some(db) = config.get_string("database") {
            conn_str.push('/');
            conn_str.push_str(&db);
        }
        conn_str
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_omits_password() {
        let config = ConnectionConfig::new_mysql("db.local", 0, "shop", "admin").with_password("secret");
        assert_eq!(
            MySqlDriver::new().build_connection_string(&config),
            "mysql://admin@db.local:3306/shop"
        );
    }
}
