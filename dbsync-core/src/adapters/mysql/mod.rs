//! MySQL/MariaDB adapters: the remote schema inspector and the local sink.
//!
//! # Module Structure
//! - `connection`: connection options, the Inspector pool and the local connection
//! - `inspector`: INFORMATION_SCHEMA and `SHOW CREATE` introspection
//! - `paging`: ordering strategy detection and cell conversion
//! - `sink`: statement execution with the foreign-key toggle
//!
//! # Security Guarantees
//! - Inspector sessions are read-only
//! - Identifiers are always backtick-quoted
//! - Connection targets are sanitized in error messages

pub mod connection;
pub mod inspector;
pub mod paging;
pub mod sink;


pub use connection::{connect_options, validate_mysql_connection_string};
pub use inspector::{MySqlConnector, MySqlInspector};
pub use paging::{OrderingStrategy, cell_value, generate_order_by_clause};
pub use sink::MySqlSink;
