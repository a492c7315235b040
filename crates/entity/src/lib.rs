//! # elif-entity: Entity Relations for elif.rs
//!
//! Maps record types onto tables discovered at runtime, compiles declarative
//! condition maps into parameterized SQL, and resolves declared relations
//! lazily on first access.
//!
//! The engine talks to databases only through the [`Driver`] contract.
//! PostgreSQL and SQLite drivers ship in [`backends`]; [`testing`] holds a
//! recording driver for exercising the engine without a database.

pub mod backends;
pub mod conditions;
pub mod config;
pub mod entity;
pub mod error;
pub mod manager;
pub mod naming;
pub mod query;
pub mod relationships;
pub mod schema;
pub mod testing;

// Re-export core traits and types
pub use backends::{
    BackendKind, ColumnInfo, DatabaseValue, Driver, DriverConstructor, DriverRegistry, DriverWriteExt,
    FieldValues, PostgresDriver, ResultSet, Row, SqlDialect, SqliteDriver,
};
pub use conditions::*;
pub use config::{ConnectionConfig, DatabaseConfig};
pub use entity::*;
pub use error::*;
pub use manager::*;
pub use naming::*;
pub use query::*;
pub use relationships::*;
pub use schema::*;
