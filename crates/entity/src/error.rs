//! Error types for the entity engine
//!
//! Every failure is reported to the immediate caller; nothing here is retried
//! or swallowed.

use std::convert::Infallible;

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error type for schema lookup, condition compilation, relation resolution
/// and driver execution.
///
/// The type is `Clone` so a relation slot that failed to load can hand the
/// same error back on every later access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrmError {
    /// The table expected for an entity type is not present in the database
    #[error("Missing table '{table}' for entity '{entity}'")]
    MissingTable { entity: String, table: String },

    /// The table exists but an expected column or key is absent
    #[error("Missing schema for entity '{entity}': {detail}")]
    MissingSchema { entity: String, detail: String },

    /// No driver is registered under the requested identifier
    #[error("No driver registered for '{0}'")]
    MissingDriver(String),

    /// Connection configuration is absent or the connection is not open
    #[error("Connection error: {0}")]
    MissingConnection(String),

    /// A relation was requested that the entity type never declared
    #[error("Unknown property '{property}' on entity '{entity}'")]
    UnknownProperty { entity: String, property: String },

    /// Backend execution error, carrying the backend's own message
    #[error("Driver error: {message}")]
    Driver { message: String },

    /// Update or delete called without any condition
    #[error("Refusing unconditional {operation} on table '{table}'")]
    UnconditionalMutation { operation: String, table: String },

    /// Malformed condition input
    #[error("Condition error: {0}")]
    Condition(String),

    /// A statement could not be assembled from its descriptor
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid relation directive or relation type mismatch
    #[error("Relation error: {0}")]
    Relation(String),

    /// A row could not be decoded into an entity
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrmError {
    /// Wrap a backend message as a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        OrmError::Driver {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Driver {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Hydration(err.to_string())
    }
}

impl From<serde_yaml::Error> for OrmError {
    fn from(err: serde_yaml::Error) -> Self {
        OrmError::Configuration(err.to_string())
    }
}

impl From<url::ParseError> for OrmError {
    fn from(err: url::ParseError) -> Self {
        OrmError::Configuration(format!("Invalid database URL: {}", err))
    }
}

// Lets `ConditionTree` flow through the same `TryInto` bounds as JSON maps.
impl From<Infallible> for OrmError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
