//! Tabula Admin - schema reflection and dynamic query engine
//!
//! Layers record browsing, filtering, CRUD, CSV import/export and change
//! tracking over an existing SQL database, driven entirely by the live
//! schema metadata.
//!
//! # Architecture
//!
//! ```text
//! Database (table registry, grants, guarded raw queries)
//!     ↓
//! Table (filters, ordering, pagination, CRUD, DDL)  ──  RecordCounter
//!     ↓                                              ──  ChangeTracker
//! TableSchema / Column (parsed metadata)
//!     ↓
//! Record (row values, lazy foreign-key titles)
//! ```
//!
//! Tables refer to each other by name only; every cross-table lookup goes
//! back through the owning [`Database`].

mod alter;
mod change_tracker;
mod column;
mod config;
mod csv_import;
mod database;
pub mod ddl;
mod export;
mod filter;
mod grants;
mod query;
mod record;
mod record_counter;
mod save;
mod schema;
mod table;
mod xtype;

pub use alter::ColumnDefinition;
pub use change_tracker::{Change, ChangeSession, ChangeTracker, Changeset, Snapshot};
pub use column::{Column, titlecase};
pub use config::AdminConfig;
pub use csv_import::{ColumnMap, CsvFile, ImportOutcome, ImportRowError};
pub use database::Database;
pub use filter::{Filter, FilterSpec, Operator};
pub use grants::{ALL_TABLES, Capability, Grants, GrantsProvider, User};
pub use query::{CompiledQuery, Direction, SelectQuery};
pub use record::{Record, TitleLookup, resolve_fk_title};
pub use record_counter::{CountCache, RecordCounter};
pub use schema::{TableKind, TableSchema};
pub use table::Table;
pub use xtype::XType;

pub use tabula_core::{Result, TabulaError, Value};
