//! Database Backend Abstractions
//!
//! This module provides the driver contract together with the concrete
//! PostgreSQL and SQLite drivers, and the registry that maps a configured
//! driver identifier to its constructor.

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::collections::HashMap;

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};

// Re-export core traits and types
pub use core::*;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    PostgreSQL,
    SQLite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::PostgreSQL => write!(f, "postgres"),
            BackendKind::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pgsql" => Ok(BackendKind::PostgreSQL),
            "sqlite" | "sqlite3" => Ok(BackendKind::SQLite),
            _ => Err(OrmError::MissingDriver(s.to_string())),
        }
    }
}

/// Constructor registered for a driver identifier
pub type DriverConstructor = fn(&ConnectionConfig) -> OrmResult<Box<dyn Driver>>;

/// Maps driver identifiers to constructors.
///
/// Resolved once when a manager is built from configuration; lookups are
/// case-insensitive.
#[derive(Clone)]
pub struct DriverRegistry {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// Create a registry with no drivers
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the bundled PostgreSQL and SQLite drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("postgres", PostgresDriver::from_config);
        registry.register("postgresql", PostgresDriver::from_config);
        registry.register("sqlite", SqliteDriver::from_config);
        registry
    }

    /// Register (or replace) a constructor
    pub fn register(&mut self, identifier: &str, constructor: DriverConstructor) {
        self.constructors.insert(identifier.to_lowercase(), constructor);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.contains_key(&identifier.to_lowercase())
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }

    /// Build an unconnected driver for `config.driver`
    pub fn create(&self, config: &ConnectionConfig) -> OrmResult<Box<dyn Driver>> {
        let constructor = self
            .constructors
            .get(&config.driver.to_lowercase())
            .ok_or_else(|| OrmError::MissingDriver(config.driver.clone()))?;

        tracing::debug!("Creating '{}' driver", config.driver);
        constructor(config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

/// Whether a statement produces a row set that has to be fetched
pub(crate) fn statement_returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_uppercase();

    matches!(head.as_str(), "SELECT" | "WITH" | "PRAGMA" | "VALUES" | "SHOW" | "EXPLAIN")
        || sql.to_uppercase().contains(" RETURNING ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDriver;

    fn recording(_config: &ConnectionConfig) -> OrmResult<Box<dyn Driver>> {
        Ok(Box::new(RecordingDriver::new()))
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("PostgreSQL".parse::<BackendKind>().unwrap(), BackendKind::PostgreSQL);
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::SQLite);
        assert!(matches!("mysql".parse::<BackendKind>(), Err(OrmError::MissingDriver(_))));
    }

    #[test]
    fn test_registry_defaults() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.identifiers(), vec!["postgres", "postgresql", "sqlite"]);

        let driver = registry.create(&ConnectionConfig::sqlite(":memory:")).unwrap();
        assert_eq!(driver.name(), "sqlite");
        assert!(!driver.is_connected());
    }

    #[test]
    fn test_registry_unknown_driver() {
        let registry = DriverRegistry::with_defaults();
        let config = ConnectionConfig::new("oracle", "app");
        assert_eq!(
            registry.create(&config).err(),
            Some(OrmError::MissingDriver("oracle".to_string()))
        );
    }

    #[test]
    fn test_registry_custom_constructor() {
        let mut registry = DriverRegistry::new();
        registry.register("Recording", recording);
        assert!(registry.contains("recording"));

        let driver = registry.create(&ConnectionConfig::new("RECORDING", "app")).unwrap();
        assert_eq!(driver.name(), "recording");
    }

    #[test]
    fn test_statement_returns_rows() {
        assert!(statement_returns_rows("SELECT * FROM posts"));
        assert!(statement_returns_rows("  with x AS (SELECT 1) SELECT * FROM x"));
        assert!(statement_returns_rows("INSERT INTO posts (title) VALUES (?) RETURNING id"));
        assert!(!statement_returns_rows("UPDATE posts SET title = ? WHERE id = ?"));
        assert!(!statement_returns_rows("BEGIN"));
    }
}
