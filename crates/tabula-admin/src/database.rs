//! Table registry and guarded statement execution

use crate::change_tracker::{ChangeSession, ChangeTracker};
use crate::config::AdminConfig;
use crate::grants::{Capability, GrantsProvider, User};
use crate::record::{Record, TitleLookup};
use crate::record_counter::CountCache;
use crate::schema::{TableMeta, TableSchema};
use crate::table::{self, Table};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tabula_core::{
    Connection, QueryResult, Result, SchemaIntrospection, SqlDialect, StatementResult,
    TabulaError, Value,
};

struct DatabaseInner {
    conn: Arc<dyn Connection>,
    grants: Arc<dyn GrantsProvider>,
    user: User,
    config: AdminConfig,
    counts: Arc<CountCache>,
    metas: RwLock<HashMap<String, Arc<TableMeta>>>,
    /// Every table and view name, memoized on first listing
    table_names: RwLock<Option<Vec<String>>>,
    history_ready: OnceCell<()>,
}

/// Entry point of the engine: one connection acting for one user.
/// Cloning is cheap and clones share the schema and count caches.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(
        conn: Arc<dyn Connection>,
        grants: Arc<dyn GrantsProvider>,
        user: User,
        config: AdminConfig,
    ) -> Self {
        let counts = Arc::new(CountCache::new(config.record_count_ttl()));
        tracing::info!(
            driver = %conn.driver_name(),
            user = %user.name,
            "admin database handle created"
        );
        Self {
            inner: Arc::new(DatabaseInner {
                conn,
                grants,
                user,
                config,
                counts,
                metas: RwLock::new(HashMap::new()),
                table_names: RwLock::new(None),
                history_ready: OnceCell::new(),
            }),
        }
    }

    /// Same connection and caches, acting for another user
    pub fn with_user(&self, user: User) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                conn: self.inner.conn.clone(),
                grants: self.inner.grants.clone(),
                user,
                config: self.inner.config.clone(),
                counts: self.inner.counts.clone(),
                metas: RwLock::new(self.inner.metas.read().clone()),
                table_names: RwLock::new(self.inner.table_names.read().clone()),
                history_ready: OnceCell::new(),
            }),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.conn
    }

    pub fn dialect(&self) -> SqlDialect {
        self.inner.conn.dialect()
    }

    pub fn user(&self) -> &User {
        &self.inner.user
    }

    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    pub fn counts(&self) -> &Arc<CountCache> {
        &self.inner.counts
    }

    pub fn tracker(&self) -> ChangeTracker {
        ChangeTracker::new(self.clone())
    }

    /// A fresh change session for the acting user
    pub fn change_session(&self) -> ChangeSession {
        ChangeSession::new(self.inner.user.id)
    }

    /// Create the change history tables once per handle
    pub(crate) async fn ensure_history(&self) -> Result<()> {
        self.inner
            .history_ready
            .get_or_try_init(|| async { ChangeTracker::new(self.clone()).ensure_tables().await })
            .await?;
        Ok(())
    }

    fn with_sql(&self, message: String, sql: &str) -> String {
        if self.inner.config.debug {
            format!("{}\nSQL: {}", message, sql)
        } else {
            message
        }
    }

    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.inner.conn.query(sql, params).await.map_err(|e| match e {
            TabulaError::Query(message) => TabulaError::Query(self.with_sql(message, sql)),
            other => other,
        })
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.inner.conn.execute(sql, params).await.map_err(|e| match e {
            TabulaError::Query(message) => TabulaError::Query(self.with_sql(message, sql)),
            other => other,
        })
    }

    /// Run a schema changing statement; engine rejections surface as schema errors
    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.inner
            .conn
            .execute(sql, &[])
            .await
            .map_err(|e| match e {
                TabulaError::Query(message) => TabulaError::Schema(self.with_sql(message, sql)),
                other => other,
            })?;
        tracing::info!("schema statement applied");
        Ok(())
    }

    pub fn introspection(&self) -> Result<&dyn SchemaIntrospection> {
        self.inner.conn.as_schema_introspection().ok_or_else(|| {
            TabulaError::NotSupported(format!(
                "Driver '{}' does not expose schema metadata",
                self.inner.conn.driver_name()
            ))
        })
    }

    pub fn can(&self, capability: Capability, table: &str) -> bool {
        self.inner.grants.can(capability, table, &self.inner.user)
    }

    pub fn require(&self, capability: Capability, table: &str) -> Result<()> {
        if self.can(capability, table) {
            return Ok(());
        }
        tracing::warn!(
            user = %self.inner.user.name,
            capability = %capability,
            table = %table,
            "permission denied"
        );
        Err(TabulaError::Permission(format!(
            "You do not have permission to {} records of '{}'",
            capability, table
        )))
    }

    pub fn is_admin(&self) -> bool {
        self.inner.grants.is_admin(&self.inner.user)
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(TabulaError::Permission(
                "Only administrators may change the database structure".into(),
            ))
        }
    }

    /// Every table and view in the database, visible or not
    pub async fn all_table_names(&self) -> Result<Vec<String>> {
        if let Some(names) = self.inner.table_names.read().clone() {
            return Ok(names);
        }
        let names: Vec<String> = self
            .introspection()?
            .list_tables()
            .await?
            .into_iter()
            .map(|info| info.name)
            .collect();
        tracing::debug!(count = names.len(), "listed tables");
        *self.inner.table_names.write() = Some(names.clone());
        Ok(names)
    }

    /// Tables the acting user may read
    pub async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .all_table_names()
            .await?
            .into_iter()
            .filter(|name| self.can(Capability::Read, name))
            .collect())
    }

    pub fn refresh_table_names(&self) {
        *self.inner.table_names.write() = None;
    }

    fn meta(&self, name: &str) -> Arc<TableMeta> {
        if let Some(meta) = self.inner.metas.read().get(name) {
            return meta.clone();
        }
        self.inner
            .metas
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// A handle on a visible table; not found for unknown or unreadable names
    pub async fn get_table(&self, name: &str) -> Result<Table> {
        if !self.table_names().await?.iter().any(|t| t == name) {
            return Err(TabulaError::NotFound(format!("Table '{}' not found", name)));
        }
        Ok(Table::new(self.clone(), name))
    }

    /// The memoized schema of `name`, loaded from the live database on first use
    pub async fn schema_of(&self, name: &str) -> Result<Arc<TableSchema>> {
        let meta = self.meta(name);
        if let Some(schema) = meta.get() {
            return Ok(schema);
        }
        let schema = Arc::new(TableSchema::load(self.introspection()?, name).await?);
        meta.set(schema.clone());
        Ok(schema)
    }

    /// Drop memoized state of `name` after its structure changed
    pub fn reset_table(&self, name: &str) {
        if let Some(meta) = self.inner.metas.read().get(name) {
            meta.reset();
        }
        self.inner.counts.invalidate(name);
    }

    /// Forget `name` entirely, after it was renamed or dropped
    pub fn forget_table(&self, name: &str) {
        if let Some(meta) = self.inner.metas.write().remove(name) {
            meta.reset();
        }
        self.inner.counts.invalidate(name);
        self.refresh_table_names();
    }

    /// Tables with a foreign key pointing at `name`
    pub async fn referencing_tables(&self, name: &str) -> Result<Vec<String>> {
        let mut referencing = Vec::new();
        for table in self.all_table_names().await? {
            let schema = self.schema_of(&table).await?;
            if schema.foreign_keys().iter().any(|fk| fk.referenced_table == name) {
                referencing.push(table);
            }
        }
        Ok(referencing)
    }
}

#[async_trait]
impl TitleLookup for Database {
    async fn schema_of(&self, table: &str) -> Result<Arc<TableSchema>> {
        Database::schema_of(self, table).await
    }

    async fn fetch_record(&self, table: &str, pk: &Value) -> Result<Option<Record>> {
        let schema = Database::schema_of(self, table).await?;
        table::fetch_record(self, &schema, pk).await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("driver", &self.inner.conn.driver_name())
            .field("user", &self.inner.user)
            .field("tables", &self.inner.metas.read().len())
            .finish()
    }
}
