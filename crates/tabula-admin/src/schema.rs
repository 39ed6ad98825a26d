//! Table structure as read from the live schema

use crate::column::Column;
use crate::ddl::{self, ForeignKeyConstraint};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tabula_core::{ColumnDescription, Result, SchemaIntrospection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    View,
}

/// Columns, keys and foreign keys of one table, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    kind: TableKind,
    columns: IndexMap<String, Column>,
    foreign_keys: Vec<ForeignKeyConstraint>,
    comment: Option<String>,
    ddl: String,
}

impl TableSchema {
    #[tracing::instrument(skip(introspection))]
    pub async fn load(introspection: &dyn SchemaIntrospection, name: &str) -> Result<Self> {
        let descriptions = introspection.describe_columns(name).await?;
        let ddl = introspection.show_create(name).await?;
        let schema = Self::from_parts(name, &ddl, &descriptions);
        tracing::debug!(
            table = %name,
            columns = schema.columns.len(),
            foreign_keys = schema.foreign_keys.len(),
            "loaded table schema"
        );
        Ok(schema)
    }

    pub fn from_parts(name: &str, ddl: &str, descriptions: &[ColumnDescription]) -> Self {
        let foreign_keys = ddl::extract_foreign_key_constraints(ddl);
        let fk_map: HashMap<String, String> = foreign_keys
            .iter()
            .map(|fk| (fk.column.clone(), fk.referenced_table.clone()))
            .collect();
        let columns = descriptions
            .iter()
            .map(|desc| (desc.field.clone(), Column::from_description(name, desc, &fk_map)))
            .collect();
        let kind = if ddl::is_view_definition(ddl) {
            TableKind::View
        } else {
            TableKind::Table
        };

        Self {
            name: name.to_string(),
            kind,
            columns,
            foreign_keys,
            comment: ddl::table_comment(ddl),
            ddl: ddl.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn is_view(&self) -> bool {
        self.kind == TableKind::View
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(name)
    }

    pub fn pk_column(&self) -> Option<&Column> {
        self.columns.values().find(|c| c.is_pk())
    }

    pub fn pk_name(&self) -> Option<&str> {
        self.pk_column().map(Column::name)
    }

    /// First non-PK unique column, else the primary key
    pub fn title_column(&self) -> Option<&Column> {
        self.columns
            .values()
            .find(|c| c.is_unique() && !c.is_pk())
            .or_else(|| self.pk_column())
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyConstraint] {
        &self.foreign_keys
    }

    /// The foreign key constraint declared on `column`
    pub fn constraint_for(&self, column: &str) -> Option<&ForeignKeyConstraint> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Tables referenced by this table's foreign keys, without duplicates
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for fk in &self.foreign_keys {
            if !tables.contains(&fk.referenced_table) {
                tables.push(fk.referenced_table.clone());
            }
        }
        tables
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn ddl(&self) -> &str {
        &self.ddl
    }
}

#[derive(Debug, Clone, Default)]
pub enum SchemaState {
    #[default]
    Unloaded,
    Loaded(Arc<TableSchema>),
}

/// Memoized schema of one table; reset after DDL
#[derive(Debug, Default)]
pub struct TableMeta {
    state: RwLock<SchemaState>,
}

impl TableMeta {
    pub fn get(&self) -> Option<Arc<TableSchema>> {
        match &*self.state.read() {
            SchemaState::Loaded(schema) => Some(schema.clone()),
            SchemaState::Unloaded => None,
        }
    }

    pub fn set(&self, schema: Arc<TableSchema>) {
        *self.state.write() = SchemaState::Loaded(schema);
    }

    pub fn reset(&self) {
        *self.state.write() = SchemaState::Unloaded;
    }
}
