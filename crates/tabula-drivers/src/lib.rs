//! Tabula Drivers - Database driver implementations
//!
//! This crate provides concrete implementations of the driver traits
//! defined in `tabula-core`.

#[cfg(feature = "mysql")]
pub use tabula_driver_mysql as mysql;
#[cfg(feature = "sqlite")]
pub use tabula_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from tabula-core
pub use tabula_core::{
    Connection, ConnectionConfig, DatabaseDriver, QueryResult, Result, Row, SchemaIntrospection,
    SqlDialect, StatementResult, TabulaError, Value,
};
