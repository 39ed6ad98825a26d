//! Record writes: value normalization, insert/update and delete

use crate::change_tracker::ChangeSession;
use crate::column::Column;
use crate::grants::Capability;
use crate::record::Record;
use crate::table::Table;
use indexmap::IndexMap;
use tabula_core::{Result, SqlDialect, TabulaError, Value};

const TRUE_WORDS: [&str; 3] = ["1", "TRUE", "YES"];
const FALSE_WORDS: [&str; 3] = ["0", "FALSE", "NO"];

/// How one submitted value is written
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bound {
    /// Leave the column out and let the schema default apply
    Default,
    Value(Value),
    /// WKT wrapped in the dialect's geometry constructor
    Geometry(String),
}

impl Bound {
    fn placeholder(&self, dialect: SqlDialect) -> &'static str {
        match self {
            Bound::Geometry(_) => dialect.geometry_from_text_placeholder(),
            _ => "?",
        }
    }

    fn into_param(self) -> Value {
        match self {
            Bound::Default => Value::Null,
            Bound::Value(value) => value,
            Bound::Geometry(wkt) => Value::String(wkt),
        }
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int64(1) => Some(true),
        Value::Int64(0) => Some(false),
        other => {
            let text = other.to_text()?.trim().to_uppercase();
            if TRUE_WORDS.contains(&text.as_str()) {
                Some(true)
            } else if FALSE_WORDS.contains(&text.as_str()) {
                Some(false)
            } else {
                None
            }
        }
    }
}

/// Normalize `value` for `column` according to the column's semantics
pub(crate) fn normalize_value(column: &Column, value: &Value) -> Result<Bound> {
    let name = column.name();

    if column.is_boolean() {
        if value.is_blank() {
            return Ok(if column.is_nullable() {
                Bound::Value(Value::Null)
            } else {
                Bound::Default
            });
        }
        return parse_bool(value)
            .map(|b| Bound::Value(Value::Int64(i64::from(b))))
            .ok_or_else(|| {
                TabulaError::Validation(format!("'{}' is not a yes/no value for '{}'", value, name))
            });
    }

    let blank = value.is_null() || (value.is_blank() && !column.is_text());
    if blank {
        if column.is_nullable() {
            return Ok(Bound::Value(Value::Null));
        }
        if column.default_expr().is_some() {
            return Ok(Bound::Default);
        }
        return Err(TabulaError::Validation(format!("'{}' is required", column.title_name())));
    }

    if column.is_point() {
        let wkt = value.to_text().unwrap_or_default();
        return Ok(Bound::Geometry(wkt.trim().to_string()));
    }

    if column.is_numeric() {
        let text = value.to_text().unwrap_or_default();
        let text = text.trim();
        if column.is_integer() {
            if let Ok(int) = text.parse::<i64>() {
                return Ok(Bound::Value(Value::Int64(int)));
            }
        }
        return text
            .parse::<f64>()
            .map(|float| Bound::Value(Value::Float64(float)))
            .map_err(|_| {
                TabulaError::Validation(format!("'{}' is not a number for '{}'", text, name))
            });
    }

    Ok(Bound::Value(Value::String(value.to_text().unwrap_or_default())))
}

impl Table {
    /// Insert or update a record and return it as stored.
    ///
    /// Without `pk`, or when no row has that key, the data is inserted;
    /// otherwise the existing row is updated. Auto-increment columns are
    /// never written.
    #[tracing::instrument(skip(self, data, session), fields(table = %self.name))]
    pub async fn save_record(
        &self,
        data: &IndexMap<String, Value>,
        pk: Option<&Value>,
        session: &mut ChangeSession,
    ) -> Result<Record> {
        let schema = self.schema().await?;
        let pk_column = schema.pk_column().ok_or_else(|| {
            TabulaError::Schema(format!("Table '{}' has no primary key", self.name))
        })?;
        let pk_name = pk_column.name().to_string();

        if let Some(unknown) = data.keys().find(|k| !schema.has_column(k)) {
            return Err(crate::table::column_not_found(&self.name, unknown));
        }

        let existing = match pk {
            Some(pk) if !pk.is_null() => self.find_record(pk).await?,
            _ => None,
        };
        let capability = if existing.is_some() {
            Capability::Update
        } else {
            Capability::Create
        };
        self.db.require(capability, &self.name)?;

        let mut columns = Vec::new();
        let mut bounds = Vec::new();
        for (name, value) in data {
            let Some(column) = schema.column(name) else {
                continue;
            };
            if column.is_auto_increment() {
                continue;
            }
            match normalize_value(column, value)? {
                Bound::Default if existing.is_some() => {
                    columns.push(column.name().to_string());
                    bounds.push(Bound::Value(column.default_value()));
                }
                Bound::Default => {}
                bound => {
                    columns.push(column.name().to_string());
                    bounds.push(bound);
                }
            }
        }

        let supplied_pk = columns
            .iter()
            .position(|c| *c == pk_name)
            .map(|idx| bounds[idx].clone().into_param());

        if existing.is_none() {
            if let Some(candidate) = supplied_pk.as_ref() {
                if self.find_record(candidate).await?.is_some() {
                    return Err(TabulaError::DataIntegrity(format!(
                        "A record with {} '{}' already exists in '{}'",
                        pk_name, candidate, self.name
                    )));
                }
            }
        }

        let tracker = self.db.tracker();
        let snapshot = tracker.before_save(session, &schema, pk).await?;
        let inserted = existing.is_none();
        let written = match self
            .write_record(pk_column, existing, columns, bounds, supplied_pk, pk)
            .await
        {
            Ok(record) => tracker.after_save(session, &snapshot, &record).await.map(|_| record),
            Err(e) => Err(e),
        };
        let record = match written {
            Ok(record) => record,
            Err(e) => {
                tracker.abandon_save(session, &snapshot).await;
                return Err(e);
            }
        };
        tracing::info!(
            table = %self.name,
            pk = %record.pk(),
            inserted,
            "record saved"
        );
        Ok(record)
    }

    /// Run the INSERT or UPDATE and read the stored row back
    async fn write_record(
        &self,
        pk_column: &Column,
        existing: Option<Record>,
        columns: Vec<String>,
        bounds: Vec<Bound>,
        supplied_pk: Option<Value>,
        pk: Option<&Value>,
    ) -> Result<Record> {
        let dialect = self.db.dialect();
        let pk_name = pk_column.name();
        let q = |s: &str| dialect.quote_identifier(s);

        let new_pk = match &existing {
            Some(old) => {
                if !columns.is_empty() {
                    let assignments: Vec<String> = columns
                        .iter()
                        .zip(&bounds)
                        .map(|(c, b)| format!("{} = {}", q(c), b.placeholder(dialect)))
                        .collect();
                    let mut params: Vec<Value> =
                        bounds.into_iter().map(Bound::into_param).collect();
                    params.push(old.pk());
                    self.db
                        .execute(
                            &format!(
                                "UPDATE {} SET {} WHERE {} = ?",
                                q(&self.name),
                                assignments.join(", "),
                                q(pk_name)
                            ),
                            &params,
                        )
                        .await?;
                }
                supplied_pk.unwrap_or_else(|| old.pk())
            }
            None => {
                let sql = if columns.is_empty() {
                    dialect.insert_defaults(&self.name)
                } else {
                    let placeholders: Vec<&str> =
                        bounds.iter().map(|b| b.placeholder(dialect)).collect();
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        q(&self.name),
                        columns.iter().map(|c| q(c)).collect::<Vec<_>>().join(", "),
                        placeholders.join(", ")
                    )
                };
                let params: Vec<Value> = bounds.into_iter().map(Bound::into_param).collect();
                let result = self.db.execute(&sql, &params).await?;

                if pk_column.is_auto_increment() {
                    result
                        .last_insert_id
                        .and_then(|id| i64::try_from(id).ok())
                        .map(Value::Int64)
                        .ok_or_else(|| {
                            TabulaError::DataIntegrity(format!(
                                "The engine returned no id for the new record in '{}'",
                                self.name
                            ))
                        })?
                } else if let Some(supplied) = supplied_pk {
                    supplied
                } else if let Some(pk) = pk.filter(|pk| !pk.is_null()) {
                    pk.clone()
                } else {
                    return Err(TabulaError::DataIntegrity(format!(
                        "Unable to determine the id of the new record in '{}'",
                        self.name
                    )));
                }
            }
        };

        self.counter.clear();
        self.find_record(&new_pk).await?.ok_or_else(|| {
            TabulaError::NotFound(format!(
                "Saved record '{}' could not be read back from '{}'",
                new_pk, self.name
            ))
        })
    }

    /// Delete a record along with its change history
    #[tracing::instrument(skip(self, pk), fields(table = %self.name))]
    pub async fn delete_record(&self, pk: &Value) -> Result<bool> {
        self.db.require(Capability::Delete, &self.name)?;
        let pk_name = self.pk_name().await?;
        let dialect = self.db.dialect();

        let result = self
            .db
            .execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?",
                    dialect.quote_identifier(&self.name),
                    dialect.quote_identifier(&pk_name)
                ),
                std::slice::from_ref(pk),
            )
            .await?;
        self.counter.clear();
        if result.affected_rows == 0 {
            return Ok(false);
        }
        self.db.tracker().delete_history(&self.name, pk).await?;
        tracing::info!(table = %self.name, pk = %pk, "record deleted");
        Ok(true)
    }
}
