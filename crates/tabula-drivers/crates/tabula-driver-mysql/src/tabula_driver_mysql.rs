//! MySQL/MariaDB driver implementation

mod connection;
mod driver;
mod schema;

pub use connection::MySqlConnection;
pub use driver::MySqlDriver;
