//! Persistence layer: libSQL-backed storage for messages, contacts,
//! policies, and the delivery log.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
