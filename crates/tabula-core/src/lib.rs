//! Tabula Core - shared abstractions for the tabula admin engine
//!
//! This crate provides the fundamental traits and types that the drivers
//! and the admin engine depend on:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` - Trait for database connections
//! - `SchemaIntrospection` - Trait for live schema metadata
//! - `SqlDialect` - The SQL variations the engine has to paper over
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod dialect;
mod driver;
mod error;
mod schema;
mod types;

pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use schema::*;
pub use types::*;
