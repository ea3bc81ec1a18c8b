//! Persistence layer: libSQL-backed pending-message, destination and filter stores.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{DestinationStore, FilterStore, MessageStore};
