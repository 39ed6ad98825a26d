//! Change history of saved and deleted records

use crate::database::Database;
use crate::record::{Record, resolve_fk_title};
use crate::schema::TableSchema;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabula_core::{Result, Row, SqlDialect, TabulaError, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Groups the changes of one logical operation under one changeset.
///
/// A session opens its changeset on the first tracked save and closes it
/// after that save, unless it is kept open for a batch.
#[derive(Debug, Clone, Default)]
pub struct ChangeSession {
    user_id: i64,
    comment: Option<String>,
    keep_open: bool,
    changeset_id: Option<i64>,
}

impl ChangeSession {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Keep the changeset open across saves until `close`
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    pub fn set_keep_open(&mut self, keep_open: bool) {
        self.keep_open = keep_open;
    }

    pub fn is_kept_open(&self) -> bool {
        self.keep_open
    }

    pub fn is_open(&self) -> bool {
        self.changeset_id.is_some()
    }

    pub fn changeset_id(&self) -> Option<i64> {
        self.changeset_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn close(&mut self) {
        if let Some(id) = self.changeset_id.take() {
            tracing::debug!(changeset_id = id, "changeset closed");
        }
        self.keep_open = false;
    }
}

/// State captured before a write
#[derive(Debug, Clone)]
pub struct Snapshot {
    tracked: bool,
    /// The changeset was opened for this save
    opened: bool,
    old: Option<Record>,
}

impl Snapshot {
    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    pub fn old(&self) -> Option<&Record> {
        self.old.as_ref()
    }
}

/// One field level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: i64,
    pub changeset_id: i64,
    pub table_name: String,
    pub record_ident: String,
    pub column_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: i64,
    pub date_and_time: NaiveDateTime,
    pub user_id: i64,
    pub comment: Option<String>,
    pub changes: Vec<Change>,
}

/// Records before/after differences of every tracked save
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    db: Database,
}

impl ChangeTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn changesets_table(&self) -> String {
        self.db.config().changesets_table()
    }

    pub fn changes_table(&self) -> String {
        self.db.config().changes_table()
    }

    /// The history tables are never tracked themselves
    pub fn is_tracking_table(&self, table: &str) -> bool {
        table == self.changesets_table() || table == self.changes_table()
    }

    fn q(&self, identifier: &str) -> String {
        self.db.dialect().quote_identifier(identifier)
    }

    /// History tables are created on first use
    async fn ready(&self) -> Result<()> {
        self.db.ensure_history().await
    }

    /// Create the history tables if they do not exist yet
    #[tracing::instrument(skip(self))]
    pub async fn ensure_tables(&self) -> Result<()> {
        let dialect = self.db.dialect();
        let (id_column, options) = match dialect {
            SqlDialect::MySql => (
                "`id` INT(10) UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
                " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            ),
            SqlDialect::Sqlite => ("`id` INTEGER PRIMARY KEY AUTOINCREMENT", ""),
        };
        let changeset_ref = match dialect {
            SqlDialect::MySql => "INT(10) UNSIGNED",
            SqlDialect::Sqlite => "INTEGER",
        };

        self.db
            .execute_ddl(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 {}, \
                 `date_and_time` DATETIME NOT NULL, \
                 `user_id` INT NOT NULL, \
                 `comment` TEXT NULL\
                 ){}",
                self.q(&self.changesets_table()),
                id_column,
                options
            ))
            .await?;
        self.db
            .execute_ddl(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 {}, \
                 `changeset_id` {} NOT NULL, \
                 `table_name` VARCHAR(255) NOT NULL, \
                 `record_ident` VARCHAR(255) NOT NULL, \
                 `column_name` VARCHAR(255) NOT NULL, \
                 `old_value` TEXT NULL, \
                 `new_value` TEXT NULL, \
                 FOREIGN KEY (`changeset_id`) REFERENCES {} (`id`) ON DELETE CASCADE\
                 ){}",
                self.q(&self.changes_table()),
                id_column,
                changeset_ref,
                self.q(&self.changesets_table()),
                options
            ))
            .await?;
        self.db.refresh_table_names();
        Ok(())
    }

    /// Open the session's changeset if needed and capture the row about to change
    #[tracing::instrument(skip(self, session, schema), fields(table = %schema.name()))]
    pub async fn before_save(
        &self,
        session: &mut ChangeSession,
        schema: &Arc<TableSchema>,
        pk: Option<&Value>,
    ) -> Result<Snapshot> {
        if self.is_tracking_table(schema.name()) {
            return Ok(Snapshot {
                tracked: false,
                opened: false,
                old: None,
            });
        }
        let opened = !session.is_open();
        if opened {
            self.open_changeset(session).await?;
        }
        let snapshot = Snapshot {
            tracked: true,
            opened,
            old: None,
        };
        let old = match pk {
            Some(pk) if !pk.is_null() => {
                match crate::table::fetch_record(&self.db, schema, pk).await {
                    Ok(old) => old,
                    Err(e) => {
                        self.abandon_save(session, &snapshot).await;
                        return Err(e);
                    }
                }
            }
            _ => None,
        };
        Ok(Snapshot { old, ..snapshot })
    }

    /// Undo the bookkeeping of a save that failed after `before_save`.
    ///
    /// A changeset opened for that save is removed while it has no changes.
    /// A session that is not kept open ends up closed; a kept-open batch
    /// keeps its changeset unless this save opened it.
    pub async fn abandon_save(&self, session: &mut ChangeSession, snapshot: &Snapshot) {
        if !snapshot.tracked {
            return;
        }
        if snapshot.opened {
            if let Some(id) = session.changeset_id.take() {
                if let Err(e) = self.delete_empty_changesets(&[Value::Int64(id)]).await {
                    tracing::warn!(changeset_id = id, error = %e, "failed to remove empty changeset");
                }
                tracing::debug!(changeset_id = id, "changeset abandoned");
            }
        }
        if !session.keep_open {
            session.close();
        }
    }

    async fn open_changeset(&self, session: &mut ChangeSession) -> Result<()> {
        self.ready().await?;
        let now = Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string();
        let result = self
            .db
            .execute(
                &format!(
                    "INSERT INTO {} (`date_and_time`, `user_id`, `comment`) VALUES (?, ?, ?)",
                    self.q(&self.changesets_table())
                ),
                &[
                    Value::String(now),
                    Value::Int64(session.user_id),
                    Value::from(session.comment.clone()),
                ],
            )
            .await?;
        let id = result
            .last_insert_id
            .and_then(|id| i64::try_from(id).ok())
            .ok_or_else(|| TabulaError::Query("Changeset insert returned no id".into()))?;
        session.changeset_id = Some(id);
        tracing::debug!(changeset_id = id, "changeset opened");
        Ok(())
    }

    /// Write one change row per differing column, comparing foreign keys by
    /// their resolved titles; closes the session unless kept open.
    /// Returns the number of change rows written.
    #[tracing::instrument(skip_all, fields(table = %record.table()))]
    pub async fn after_save(
        &self,
        session: &mut ChangeSession,
        snapshot: &Snapshot,
        record: &Record,
    ) -> Result<usize> {
        if !snapshot.tracked {
            return Ok(0);
        }
        let Some(changeset_id) = session.changeset_id else {
            return Err(TabulaError::Other("after_save without an open changeset".into()));
        };

        let record_ident = record.pk().to_text().unwrap_or_default();
        let mut written = 0;
        for column in record.schema().columns() {
            let old = match &snapshot.old {
                Some(old) => resolve_fk_title(&self.db, column, &old.get(column.name())).await?,
                None => Value::Null,
            };
            let new = resolve_fk_title(&self.db, column, &record.get(column.name())).await?;
            let (old, new) = (old.to_text(), new.to_text());
            if old == new {
                continue;
            }

            let insert = self
                .db
                .execute(
                    &format!(
                        "INSERT INTO {} (`changeset_id`, `table_name`, `record_ident`, \
                         `column_name`, `old_value`, `new_value`) VALUES (?, ?, ?, ?, ?, ?)",
                        self.q(&self.changes_table())
                    ),
                    &[
                        Value::Int64(changeset_id),
                        Value::from(record.table()),
                        Value::from(record_ident.as_str()),
                        Value::from(column.name()),
                        Value::from(old),
                        Value::from(new),
                    ],
                )
                .await;
            match insert {
                Ok(_) => written += 1,
                Err(e) => tracing::warn!(
                    changeset_id,
                    column = %column.name(),
                    error = %e,
                    "failed to record change"
                ),
            }
        }

        tracing::debug!(changeset_id, changes = written, "changes recorded");
        if !session.keep_open {
            session.close();
        }
        Ok(written)
    }

    /// Remove the history of one record, and changesets left empty by it
    #[tracing::instrument(skip(self, pk))]
    pub async fn delete_history(&self, table: &str, pk: &Value) -> Result<()> {
        self.ready().await?;
        let ident = pk.to_text().unwrap_or_default();
        let changesets = self
            .db
            .query(
                &format!(
                    "SELECT DISTINCT `changeset_id` FROM {} WHERE `table_name` = ? AND `record_ident` = ?",
                    self.q(&self.changes_table())
                ),
                &[Value::from(table), Value::from(ident.as_str())],
            )
            .await?;
        self.db
            .execute(
                &format!(
                    "DELETE FROM {} WHERE `table_name` = ? AND `record_ident` = ?",
                    self.q(&self.changes_table())
                ),
                &[Value::from(table), Value::from(ident.as_str())],
            )
            .await?;
        let ids: Vec<Value> = changesets.rows.iter().filter_map(|row| row.get(0).cloned()).collect();
        self.delete_empty_changesets(&ids).await
    }

    async fn delete_empty_changesets(&self, ids: &[Value]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let result = self
            .db
            .execute(
                &format!(
                    "DELETE FROM {cs} WHERE `id` IN ({ph}) AND NOT EXISTS \
                     (SELECT 1 FROM {c} WHERE {c}.`changeset_id` = {cs}.`id`)",
                    cs = self.q(&self.changesets_table()),
                    c = self.q(&self.changes_table()),
                    ph = placeholders
                ),
                ids,
            )
            .await?;
        tracing::debug!(deleted = result.affected_rows, "empty changesets removed");
        Ok(())
    }

    /// Point history of `from` at its new name
    pub async fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.ready().await?;
        let result = self
            .db
            .execute(
                &format!(
                    "UPDATE {} SET `table_name` = ? WHERE `table_name` = ?",
                    self.q(&self.changes_table())
                ),
                &[Value::from(to), Value::from(from)],
            )
            .await?;
        tracing::info!(from = %from, to = %to, changes = result.affected_rows, "history renamed");
        Ok(())
    }

    /// Remove every change of a dropped table; failures are only logged
    pub async fn purge_table(&self, table: &str) {
        if let Err(e) = self.try_purge_table(table).await {
            tracing::warn!(table = %table, error = %e, "failed to purge history of dropped table");
        }
    }

    async fn try_purge_table(&self, table: &str) -> Result<()> {
        self.ready().await?;
        let changesets = self
            .db
            .query(
                &format!(
                    "SELECT DISTINCT `changeset_id` FROM {} WHERE `table_name` = ?",
                    self.q(&self.changes_table())
                ),
                &[Value::from(table)],
            )
            .await?;
        self.db
            .execute(
                &format!("DELETE FROM {} WHERE `table_name` = ?", self.q(&self.changes_table())),
                &[Value::from(table)],
            )
            .await?;
        let ids: Vec<Value> = changesets.rows.iter().filter_map(|row| row.get(0).cloned()).collect();
        self.delete_empty_changesets(&ids).await
    }

    pub async fn changes_for_record(&self, table: &str, pk: &Value) -> Result<Vec<Change>> {
        self.ready().await?;
        let result = self
            .db
            .query(
                &format!(
                    "SELECT `id`, `changeset_id`, `table_name`, `record_ident`, `column_name`, \
                     `old_value`, `new_value` FROM {} \
                     WHERE `table_name` = ? AND `record_ident` = ? ORDER BY `id`",
                    self.q(&self.changes_table())
                ),
                &[Value::from(table), Value::from(pk.to_text().unwrap_or_default())],
            )
            .await?;
        result.rows.iter().map(change_from_row).collect()
    }

    /// Changesets touching one record, newest first, with that record's changes
    pub async fn changesets_for_record(&self, table: &str, pk: &Value) -> Result<Vec<Changeset>> {
        let changes = self.changes_for_record(table, pk).await?;
        let mut ids: Vec<i64> = changes.iter().map(|c| c.changeset_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let params: Vec<Value> = ids.iter().map(|id| Value::Int64(*id)).collect();
        let result = self
            .db
            .query(
                &format!(
                    "SELECT `id`, `date_and_time`, `user_id`, `comment` FROM {} \
                     WHERE `id` IN ({}) ORDER BY `id` DESC",
                    self.q(&self.changesets_table()),
                    placeholders
                ),
                &params,
            )
            .await?;

        result
            .rows
            .iter()
            .map(|row| {
                let id = int_field(row, "id")?;
                let stamp = row.get_string("date_and_time").unwrap_or_default();
                let date_and_time = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT)
                    .map_err(|e| {
                        TabulaError::Query(format!("Invalid changeset timestamp '{}': {}", stamp, e))
                    })?;
                Ok(Changeset {
                    id,
                    date_and_time,
                    user_id: int_field(row, "user_id")?,
                    comment: row.get_string("comment"),
                    changes: changes
                        .iter()
                        .filter(|c| c.changeset_id == id)
                        .cloned()
                        .collect(),
                })
            })
            .collect()
    }
}

fn int_field(row: &Row, name: &str) -> Result<i64> {
    row.get_by_name(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| TabulaError::Query(format!("History column '{}' is not a number", name)))
}

fn change_from_row(row: &Row) -> Result<Change> {
    Ok(Change {
        id: int_field(row, "id")?,
        changeset_id: int_field(row, "changeset_id")?,
        table_name: row.get_string("table_name").unwrap_or_default(),
        record_ident: row.get_string("record_ident").unwrap_or_default(),
        column_name: row.get_string("column_name").unwrap_or_default(),
        old_value: row.get_string("old_value"),
        new_value: row.get_string("new_value"),
    })
}
