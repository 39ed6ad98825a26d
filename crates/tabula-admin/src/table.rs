//! Table handles: filters, ordering, paging and reads

use crate::column::Column;
use crate::database::Database;
use crate::filter::{self, Filter, FilterSpec, Operator};
use crate::query::{CompiledQuery, Direction, SelectQuery};
use crate::record::Record;
use crate::record_counter::RecordCounter;
use crate::schema::TableSchema;
use indexmap::IndexMap;
use std::sync::Arc;
use tabula_core::{Result, TabulaError, Value};

/// Alias of the base table in every generated SELECT
pub(crate) const BASE_ALIAS: &str = "t";

/// A table of the database with its own filter, order and page state
#[derive(Debug, Clone)]
pub struct Table {
    pub(crate) db: Database,
    pub(crate) name: String,
    filters: Vec<Filter>,
    order: Option<(String, Direction)>,
    page: u64,
    page_size: u64,
    pub(crate) counter: RecordCounter,
    last_query: Option<CompiledQuery>,
}

impl Table {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        let counter = RecordCounter::new(name, db.counts().clone());
        let page_size = db.config().page_size.max(1);
        Self {
            db,
            name: name.to_string(),
            filters: Vec::new(),
            order: None,
            page: 1,
            page_size,
            counter,
            last_query: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn schema(&self) -> Result<Arc<TableSchema>> {
        self.db.schema_of(&self.name).await
    }

    pub async fn columns(&self) -> Result<Vec<Column>> {
        Ok(self.schema().await?.columns().cloned().collect())
    }

    pub async fn column(&self, name: &str) -> Result<Column> {
        self.schema()
            .await?
            .column(name)
            .cloned()
            .ok_or_else(|| column_not_found(&self.name, name))
    }

    pub async fn pk_name(&self) -> Result<String> {
        self.schema()
            .await?
            .pk_name()
            .map(str::to_string)
            .ok_or_else(|| TabulaError::Schema(format!("Table '{}' has no primary key", self.name)))
    }

    pub async fn is_view(&self) -> Result<bool> {
        Ok(self.schema().await?.is_view())
    }

    /// Forget memoized structure; the next access reads the live schema
    pub fn reset(&self) {
        self.db.reset_table(&self.name);
    }

    pub async fn reload(&self) -> Result<Arc<TableSchema>> {
        self.reset();
        self.schema().await
    }

    pub async fn add_filter(
        &mut self,
        column: &str,
        operator: Operator,
        value: &str,
        force: bool,
    ) -> Result<()> {
        let filter = Filter {
            column: column.to_string(),
            operator,
            value: value.to_string(),
            force,
        };
        self.push_filter(filter).await
    }

    async fn push_filter(&mut self, filter: Filter) -> Result<()> {
        if !self.schema().await?.has_column(&filter.column) {
            return Err(TabulaError::Validation(format!(
                "'{}' is not a column of '{}'",
                filter.column, self.name
            )));
        }
        filter.validate()?;
        tracing::debug!(
            table = %self.name,
            column = %filter.column,
            operator = %filter.operator,
            "filter added"
        );
        self.filters.push(filter);
        Ok(())
    }

    /// Apply every well formed spec, skipping the others; returns how many applied
    pub async fn add_filters(&mut self, specs: &[FilterSpec]) -> Result<usize> {
        let mut applied = 0;
        for spec in specs {
            let filter = match spec.to_filter() {
                Ok(filter) => filter,
                Err(e) => {
                    tracing::debug!(table = %self.name, error = %e, "skipping malformed filter");
                    continue;
                }
            };
            match self.push_filter(filter).await {
                Ok(()) => applied += 1,
                Err(e) if e.is_validation() => {
                    tracing::debug!(table = %self.name, error = %e, "skipping malformed filter");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(applied)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    pub async fn set_order(&mut self, column: &str, direction: Direction) -> Result<()> {
        if !self.schema().await?.has_column(column) {
            return Err(column_not_found(&self.name, column));
        }
        self.order = Some((column.to_string(), direction));
        Ok(())
    }

    pub fn order(&self) -> Option<&(String, Direction)> {
        self.order.as_ref()
    }

    pub fn set_page(&mut self, page: u64) {
        self.page = page.max(1);
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn set_page_size(&mut self, page_size: u64) -> Result<()> {
        if page_size == 0 {
            return Err(TabulaError::Validation("Page size must be at least 1".into()));
        }
        self.page_size = page_size;
        Ok(())
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Statement retained by the last `get_records(_, true)`
    pub fn last_query(&self) -> Option<&CompiledQuery> {
        self.last_query.as_ref()
    }

    /// SQL expression a filter or order on `column` targets. Unforced
    /// foreign keys are joined to the referenced table's title column,
    /// following a title that is itself a foreign key one level further.
    pub(crate) async fn title_target(
        &self,
        column: &Column,
        alias: &str,
        query: &mut SelectQuery,
    ) -> Result<String> {
        let dialect = self.db.dialect();
        let q = |s: &str| dialect.quote_identifier(s);
        let raw = format!("{}.{}", q(BASE_ALIAS), q(column.name()));

        let Some(target) = column.references() else {
            return Ok(raw);
        };
        let target_schema = self.db.schema_of(target).await?;
        let (Some(title), Some(target_pk)) = (target_schema.title_column(), target_schema.pk_name())
        else {
            return Ok(raw);
        };
        if title.is_pk() {
            return Ok(raw);
        }
        query.left_join(
            &format!("{} AS {}", q(target), q(alias)),
            &format!("{}.{} = {}", q(alias), q(target_pk), raw),
        );
        let first_hop = format!("{}.{}", q(alias), q(title.name()));

        let Some(second) = title.references() else {
            return Ok(first_hop);
        };
        let second_schema = self.db.schema_of(second).await?;
        let (Some(second_title), Some(second_pk)) =
            (second_schema.title_column(), second_schema.pk_name())
        else {
            return Ok(first_hop);
        };
        if second_title.is_pk() {
            return Ok(first_hop);
        }
        let second_alias = format!("{}_2", alias);
        query.left_join(
            &format!("{} AS {}", q(second), q(&second_alias)),
            &format!("{}.{} = {}", q(&second_alias), q(second_pk), first_hop),
        );
        Ok(format!("{}.{}", q(&second_alias), q(second_title.name())))
    }

    /// Apply the current filters and order to `query`
    pub(crate) async fn apply_filters(
        &self,
        schema: &TableSchema,
        query: &mut SelectQuery,
    ) -> Result<()> {
        let dialect = self.db.dialect();
        for (idx, filter) in self.filters.iter().enumerate() {
            let column = schema
                .column(&filter.column)
                .ok_or_else(|| column_not_found(&self.name, &filter.column))?;
            let target = if filter.force {
                format!(
                    "{}.{}",
                    dialect.quote_identifier(BASE_ALIAS),
                    dialect.quote_identifier(column.name())
                )
            } else {
                self.title_target(column, &format!("f{}", idx), query).await?
            };
            let (sql, params) = filter::filter_condition(dialect, &target, filter);
            query.condition(sql, params);
        }
        Ok(())
    }

    async fn apply_order(&self, schema: &TableSchema, query: &mut SelectQuery) -> Result<()> {
        if let Some((name, direction)) = &self.order {
            let column = schema
                .column(name)
                .ok_or_else(|| column_not_found(&self.name, name))?;
            let target = self.title_target(column, "ord", query).await?;
            query.order_by(target, *direction);
        }
        Ok(())
    }

    fn base_query(&self, schema: &TableSchema) -> SelectQuery {
        let dialect = self.db.dialect();
        let mut query = SelectQuery::new(format!(
            "{} AS {}",
            dialect.quote_identifier(&self.name),
            dialect.quote_identifier(BASE_ALIAS)
        ));
        for column in schema.columns() {
            query.project(projection(&self.db, column));
        }
        query
    }

    /// Rows matching the current filters. With `paginated` the page is
    /// clamped to the available pages first; `save_sql` keeps the statement
    /// for `last_query`.
    #[tracing::instrument(skip(self), fields(table = %self.name))]
    pub async fn get_records(&mut self, paginated: bool, save_sql: bool) -> Result<Vec<Record>> {
        let schema = self.schema().await?;
        let mut query = self.base_query(&schema);
        self.apply_filters(&schema, &mut query).await?;
        self.apply_order(&schema, &mut query).await?;

        if paginated {
            let pages = self.page_count().await?;
            self.page = self.page.clamp(1, pages);
            query.limit(self.page_size, Some(self.page_size * (self.page - 1)));
        }

        let compiled = query.build();
        let result = self.db.query(&compiled.sql, &compiled.params).await?;
        tracing::debug!(table = %self.name, rows = result.row_count(), page = self.page, "records read");
        if save_sql {
            self.last_query = Some(compiled);
        }

        Ok(result
            .rows
            .into_iter()
            .map(|row| Record::from_row(schema.clone(), row))
            .collect())
    }

    /// The row with primary key `pk`, if it exists
    pub async fn find_record(&self, pk: &Value) -> Result<Option<Record>> {
        let schema = self.schema().await?;
        fetch_record(&self.db, &schema, pk).await
    }

    pub async fn get_record(&self, pk: &Value) -> Result<Record> {
        self.find_record(pk).await?.ok_or_else(|| {
            TabulaError::NotFound(format!("No record with id '{}' in '{}'", pk, self.name))
        })
    }

    /// Rows matching the current filters, cached when unfiltered
    pub async fn count_records(&self) -> Result<u64> {
        let schema = self.schema().await?;
        let mut query = self.base_query(&schema);
        self.apply_filters(&schema, &mut query).await?;
        let cacheable = !schema.is_view() && self.filters.is_empty();
        self.counter.get_count(&self.db, &query.count(), cacheable).await
    }

    /// Number of pages under the current filters, at least one
    pub async fn page_count(&self) -> Result<u64> {
        let total = self.count_records().await?;
        Ok(total.div_ceil(self.page_size).max(1))
    }

    /// Tables referenced by this table's foreign keys
    pub async fn referenced_tables(&self) -> Result<Vec<String>> {
        Ok(self.schema().await?.referenced_tables())
    }

    /// Tables whose foreign keys point at this table
    pub async fn referencing_tables(&self) -> Result<Vec<String>> {
        self.db.referencing_tables(&self.name).await
    }

    /// An unsaved record holding every column's default
    pub async fn default_record(&self) -> Result<Record> {
        let schema = self.schema().await?;
        let values: IndexMap<String, Value> = schema
            .columns()
            .map(|c| (c.name().to_string(), c.default_value()))
            .collect();
        Ok(Record::from_values(schema, values))
    }
}

/// Projection of one column; geometry is read as WKT
fn projection(db: &Database, column: &Column) -> String {
    let dialect = db.dialect();
    let expr = format!(
        "{}.{}",
        dialect.quote_identifier(BASE_ALIAS),
        dialect.quote_identifier(column.name())
    );
    if column.is_point() {
        format!(
            "{} AS {}",
            dialect.geometry_as_text(&expr),
            dialect.quote_identifier(column.name())
        )
    } else {
        expr
    }
}

pub(crate) fn column_not_found(table: &str, column: &str) -> TabulaError {
    TabulaError::Validation(format!("'{}' is not a column of '{}'", column, table))
}

/// Read one row by primary key, bypassing filters and grants
pub(crate) async fn fetch_record(
    db: &Database,
    schema: &Arc<TableSchema>,
    pk: &Value,
) -> Result<Option<Record>> {
    let Some(pk_name) = schema.pk_name() else {
        return Err(TabulaError::Schema(format!(
            "Table '{}' has no primary key",
            schema.name()
        )));
    };
    let dialect = db.dialect();
    let mut query = SelectQuery::new(format!(
        "{} AS {}",
        dialect.quote_identifier(schema.name()),
        dialect.quote_identifier(BASE_ALIAS)
    ));
    for column in schema.columns() {
        query.project(projection(db, column));
    }
    query
        .condition(
            format!(
                "{}.{} = ?",
                dialect.quote_identifier(BASE_ALIAS),
                dialect.quote_identifier(pk_name)
            ),
            vec![pk.clone()],
        )
        .limit(1, None);

    let compiled = query.build();
    let result = db.query(&compiled.sql, &compiled.params).await?;
    Ok(result
        .rows
        .into_iter()
        .next()
        .map(|row| Record::from_row(schema.clone(), row)))
}
