//! Materialized rows and foreign key title resolution

use crate::column::Column;
use crate::schema::TableSchema;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tabula_core::{Result, Row, TabulaError, Value};

/// Read-through access to other tables, used to follow foreign keys
#[async_trait]
pub trait TitleLookup: Send + Sync {
    async fn schema_of(&self, table: &str) -> Result<Arc<TableSchema>>;

    async fn fetch_record(&self, table: &str, pk: &Value) -> Result<Option<Record>>;
}

/// One row of a table
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<TableSchema>,
    values: IndexMap<String, Value>,
}

impl Record {
    pub fn from_row(schema: Arc<TableSchema>, row: Row) -> Self {
        let values = row.into_pairs().collect();
        Self::from_values(schema, values)
    }

    /// Boolean columns are read back as `Value::Bool`
    pub fn from_values(schema: Arc<TableSchema>, values: IndexMap<String, Value>) -> Self {
        let values = values
            .into_iter()
            .map(|(name, value)| {
                let value = match schema.column(&name) {
                    Some(column) if column.is_boolean() => normalize_bool(value),
                    _ => value,
                };
                (name, value)
            })
            .collect();
        Self { schema, values }
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Value of `column`; NULL for columns the record does not carry
    pub fn get(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn pk(&self) -> Value {
        self.schema
            .pk_name()
            .map(|pk| self.get(pk))
            .unwrap_or(Value::Null)
    }

    /// Value of `column` with foreign keys replaced by the referenced title
    pub async fn get_title(&self, column: &str, lookup: &dyn TitleLookup) -> Result<Value> {
        let col = self.schema.column(column).ok_or_else(|| {
            TabulaError::Validation(format!(
                "Column '{}' not found in '{}'",
                column,
                self.schema.name()
            ))
        })?;
        resolve_fk_title(lookup, col, &self.get(column)).await
    }

    /// The row a foreign key column points at
    pub async fn referenced_record(
        &self,
        column: &str,
        lookup: &dyn TitleLookup,
    ) -> Result<Option<Record>> {
        let Some(target) = self.schema.column(column).and_then(Column::references) else {
            return Ok(None);
        };
        let value = self.get(column);
        if value.is_null() {
            return Ok(None);
        }
        lookup.fetch_record(target, &value).await
    }

    /// Human readable identification of the row: the title column, or
    /// every resolved value in brackets when the table has no unique column
    pub async fn title(&self, lookup: &dyn TitleLookup) -> Result<String> {
        if let Some(title_column) = self.schema.title_column() {
            let value = self.get_title(title_column.name(), lookup).await?;
            return Ok(value.to_text().unwrap_or_default());
        }
        let mut parts = Vec::with_capacity(self.values.len());
        for column in self.schema.columns() {
            let value = resolve_fk_title(lookup, column, &self.get(column.name())).await?;
            parts.push(value.to_text().unwrap_or_default());
        }
        Ok(format!("[ {} ]", parts.join(" | ")))
    }
}

fn normalize_bool(value: Value) -> Value {
    match value {
        Value::Int64(v) => Value::Bool(v != 0),
        Value::String(ref s) if s == "0" || s == "1" => Value::Bool(s == "1"),
        other => other,
    }
}

/// Follow `column`'s foreign key to the referenced row's title, through
/// title columns that are foreign keys themselves. Dangling references
/// and tables without a title column yield the last value reached.
pub async fn resolve_fk_title(
    lookup: &dyn TitleLookup,
    column: &Column,
    value: &Value,
) -> Result<Value> {
    let mut target = match column.references() {
        Some(table) => table.to_string(),
        None => return Ok(value.clone()),
    };
    let mut current = value.clone();
    let mut visited = HashSet::new();

    loop {
        if current.is_null() || !visited.insert(target.clone()) {
            return Ok(current);
        }
        let schema = lookup.schema_of(&target).await?;
        let Some(title_column) = schema.title_column() else {
            return Ok(current);
        };
        if title_column.is_pk() {
            return Ok(current);
        }
        let Some(record) = lookup.fetch_record(&target, &current).await? else {
            tracing::debug!(table = %target, value = %current, "dangling foreign key");
            return Ok(current);
        };
        let next = record.get(title_column.name());
        match title_column.references() {
            Some(next_table) => {
                target = next_table.to_string();
                current = next;
            }
            None => return Ok(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tabula_core::{ColumnDescription, KeyKind};

    fn describe(field: &str, ty: &str, key: KeyKind) -> ColumnDescription {
        let mut desc = ColumnDescription::new(field, ty);
        desc.key = key;
        desc
    }

    /// In-memory tables: `items.type_id -> types`, `types.group_id -> groups`,
    /// and `types`' title column is its foreign key to `groups`
    struct Fixture {
        schemas: HashMap<String, Arc<TableSchema>>,
        rows: HashMap<(String, i64), Record>,
    }

    impl Fixture {
        fn new() -> Self {
            let groups = Arc::new(TableSchema::from_parts(
                "groups",
                "CREATE TABLE groups (id INTEGER PRIMARY KEY, name TEXT UNIQUE)",
                &[
                    describe("id", "integer", KeyKind::Primary),
                    describe("name", "text", KeyKind::Unique),
                ],
            ));
            let types = Arc::new(TableSchema::from_parts(
                "types",
                "CREATE TABLE types (id INTEGER PRIMARY KEY, group_id INTEGER UNIQUE REFERENCES groups(id))",
                &[
                    describe("id", "integer", KeyKind::Primary),
                    describe("group_id", "integer", KeyKind::Unique),
                ],
            ));
            let items = Arc::new(TableSchema::from_parts(
                "items",
                "CREATE TABLE items (id INTEGER PRIMARY KEY, type_id INTEGER REFERENCES types(id), note TEXT)",
                &[
                    describe("id", "integer", KeyKind::Primary),
                    describe("type_id", "integer", KeyKind::None),
                    describe("note", "text", KeyKind::None),
                ],
            ));

            let mut rows = HashMap::new();
            rows.insert(
                ("groups".to_string(), 7),
                Record::from_values(
                    groups.clone(),
                    IndexMap::from([("id".into(), Value::Int64(7)), ("name".into(), Value::from("Felines"))]),
                ),
            );
            rows.insert(
                ("types".to_string(), 1),
                Record::from_values(
                    types.clone(),
                    IndexMap::from([("id".into(), Value::Int64(1)), ("group_id".into(), Value::Int64(7))]),
                ),
            );

            let schemas = [groups, types, items]
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect();
            Self { schemas, rows }
        }
    }

    #[async_trait]
    impl TitleLookup for Fixture {
        async fn schema_of(&self, table: &str) -> Result<Arc<TableSchema>> {
            self.schemas
                .get(table)
                .cloned()
                .ok_or_else(|| TabulaError::NotFound(table.to_string()))
        }

        async fn fetch_record(&self, table: &str, pk: &Value) -> Result<Option<Record>> {
            let Some(id) = pk.as_i64() else {
                return Ok(None);
            };
            Ok(self.rows.get(&(table.to_string(), id)).cloned())
        }
    }

    #[tokio::test]
    async fn test_title_chains_through_foreign_keys() {
        let fixture = Fixture::new();
        let item = Record::from_values(
            fixture.schemas["items"].clone(),
            IndexMap::from([
                ("id".into(), Value::Int64(3)),
                ("type_id".into(), Value::Int64(1)),
                ("note".into(), Value::Null),
            ]),
        );
        assert_eq!(item.get_title("type_id", &fixture).await.unwrap(), Value::from("Felines"));
        assert_eq!(item.get_title("note", &fixture).await.unwrap(), Value::Null);
        assert_eq!(item.title(&fixture).await.unwrap(), "3");

        let referenced = item.referenced_record("type_id", &fixture).await.unwrap().unwrap();
        assert_eq!(referenced.pk(), Value::Int64(1));
        assert!(item.get_title("missing", &fixture).await.is_err());
    }

    #[tokio::test]
    async fn test_dangling_reference_keeps_value() {
        let fixture = Fixture::new();
        let item = Record::from_values(
            fixture.schemas["items"].clone(),
            IndexMap::from([("id".into(), Value::Int64(4)), ("type_id".into(), Value::Int64(99))]),
        );
        assert_eq!(item.get_title("type_id", &fixture).await.unwrap(), Value::Int64(99));
    }

    #[tokio::test]
    async fn test_bracket_title_without_keys() {
        let schema = Arc::new(TableSchema::from_parts(
            "log",
            "CREATE TABLE log (at TEXT, message TEXT)",
            &[describe("at", "text", KeyKind::None), describe("message", "text", KeyKind::None)],
        ));
        let record = Record::from_values(
            schema,
            IndexMap::from([("at".into(), Value::from("noon")), ("message".into(), Value::Null)]),
        );
        assert_eq!(record.title(&Fixture::new()).await.unwrap(), "[ noon |  ]");
    }

    #[test]
    fn test_boolean_columns_normalized() {
        let schema = Arc::new(TableSchema::from_parts(
            "flags",
            "CREATE TABLE flags (id INTEGER PRIMARY KEY, active TINYINT(1))",
            &[describe("id", "integer", KeyKind::Primary), describe("active", "tinyint(1)", KeyKind::None)],
        ));
        let record = Record::from_values(
            schema,
            IndexMap::from([("id".into(), Value::Int64(1)), ("active".into(), Value::Int64(1))]),
        );
        assert_eq!(record.get("active"), Value::Bool(true));
        assert_eq!(record.get("id"), Value::Int64(1));
        assert_eq!(record.get("absent"), Value::Null);
    }
}
