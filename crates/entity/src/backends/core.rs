//! Core Driver Traits
//!
//! This module defines the driver contract every relational backend implements,
//! together with the value, row and column types that cross it. The entity
//! manager only ever sees these types; backend specifics stay inside the
//! concrete drivers.

use std::borrow::Cow;
use std::collections::BTreeMap;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::conditions::ConditionTree;
use crate::error::{OrmError, OrmResult};
use crate::query::Statement;

/// Column name to value map used for inserts and updates.
///
/// Ordered so identical input always renders identical SQL.
pub type FieldValues = BTreeMap<String, DatabaseValue>;

/// Driver contract for a single owned backend connection
#[async_trait]
pub trait Driver: Send {
    /// Identifier the driver was registered under
    fn name(&self) -> &str;

    /// SQL dialect spoken by the backend
    fn dialect(&self) -> SqlDialect;

    /// Whether a live connection is currently held
    fn is_connected(&self) -> bool;

    /// Open the connection. Calling this while connected is a no-op.
    async fn connect(&mut self) -> OrmResult<()>;

    /// Release the connection
    async fn disconnect(&mut self) -> OrmResult<()>;

    /// Execute a statement with `?` placeholders bound positionally
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ResultSet>;

    /// Begin a transaction on the owned connection
    async fn begin_transaction(&mut self) -> OrmResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> OrmResult<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> OrmResult<()>;

    /// List the tables visible to this connection
    async fn list_tables(&mut self) -> OrmResult<Vec<String>>;

    /// List the columns of a table, flagging the primary key
    async fn list_columns(&mut self, table: &str) -> OrmResult<Vec<ColumnInfo>>;

    /// Identifier generated by the most recent insert, if any
    async fn last_inserted_id(&mut self) -> OrmResult<Option<DatabaseValue>>;

    /// Rows affected by the most recent statement
    fn affected_rows(&self) -> u64;
}

/// Write helpers built on top of [`Driver::execute`].
///
/// Update and delete refuse an empty condition set unless
/// `allow_unconditional` is passed, so a missing filter can never turn into a
/// full-table mutation by accident.
#[async_trait]
pub trait DriverWriteExt {
    /// Insert one row
    async fn insert(&mut self, table: &str, fields: &FieldValues) -> OrmResult<ResultSet>;

    /// Update rows matching `conditions`
    async fn update(
        &mut self,
        table: &str,
        conditions: &ConditionTree,
        fields: &FieldValues,
        allow_unconditional: bool,
    ) -> OrmResult<u64>;

    /// Delete rows matching `conditions`
    async fn delete(
        &mut self,
        table: &str,
        conditions: &ConditionTree,
        allow_unconditional: bool,
    ) -> OrmResult<u64>;
}

#[async_trait]
impl<D: Driver + ?Sized> DriverWriteExt for D {
    async fn insert(&mut self, table: &str, fields: &FieldValues) -> OrmResult<ResultSet> {
        let statement = Statement::insert(table, fields)?;
        self.execute(&statement.sql, &statement.values).await
    }

    async fn update(
        &mut self,
        table: &str,
        conditions: &ConditionTree,
        fields: &FieldValues,
        allow_unconditional: bool,
    ) -> OrmResult<u64> {
        guard_unconditional("update", table, conditions, allow_unconditional)?;
        let statement = Statement::update(table, fields, conditions)?;
        let result = self.execute(&statement.sql, &statement.values).await?;
        Ok(result.rows_affected)
    }

    async fn delete(
        &mut self,
        table: &str,
        conditions: &ConditionTree,
        allow_unconditional: bool,
    ) -> OrmResult<u64> {
        guard_unconditional("delete", table, conditions, allow_unconditional)?;
        let statement = Statement::delete(table, conditions)?;
        let result = self.execute(&statement.sql, &statement.values).await?;
        Ok(result.rows_affected)
    }
}

/// Reject an update/delete without conditions
pub(crate) fn guard_unconditional(
    operation: &str,
    table: &str,
    conditions: &ConditionTree,
    allow_unconditional: bool,
) -> OrmResult<()> {
    if conditions.is_empty() && !allow_unconditional {
        tracing::warn!("Refused unconditional {} on '{}'", operation, table);
        return Err(OrmError::UnconditionalMutation {
            operation: operation.to_string(),
            table: table.to_string(),
        });
    }
    Ok(())
}

/// Outcome of a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: Option<DatabaseValue>,
}

impl ResultSet {
    /// Result carrying only rows
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Result of a write that touched `rows_affected` rows
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Attach the generated identifier of an insert
    pub fn with_last_insert_id(mut self, id: impl Into<DatabaseValue>) -> Self {
        self.last_insert_id = Some(id.into());
        self
    }
}

/// A fetched row with its columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style
    pub fn with(mut self, column: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<DatabaseValue>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    /// Get a column value by name
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.values[index])
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    /// Column names in select order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert the row to a JSON object keyed by column name
    pub fn to_json(&self) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.insert(column.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }
}

/// Column metadata returned by introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            default: None,
        }
    }

    /// Flag the column as the table's primary key
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value, if it is integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Int64(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => {
                JsonValue::Array(b.iter().map(|&x| JsonValue::Number(serde_json::Number::from(x))).collect())
            }
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }

    /// Create a scalar value from JSON.
    ///
    /// Arrays and objects are kept as JSON documents; condition lists are
    /// handled by the condition parser before values reach this point.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        DatabaseValue::Int32(i as i32)
                    } else {
                        DatabaseValue::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            other => DatabaseValue::Json(other),
        }
    }
}

impl std::fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDate> for DatabaseValue {
    fn from(value: chrono::NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::from_json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for backend-specific statement preparation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Rewrite the engine's positional `?` placeholders into the dialect's
    /// own style. Quoted literals and identifiers are left untouched.
    ///
    /// Comments and dollar-quoted bodies are not recognized: a `?` inside
    /// `-- ...`, `/* ... */` or `$$ ... $$` in raw fragments or hand-written
    /// SQL is rewritten like any other placeholder.
    pub fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if *self == SqlDialect::SQLite || !sql.contains('?') {
            return Cow::Borrowed(sql);
        }

        let mut prepared = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut quote: Option<char> = None;

        for ch in sql.chars() {
            match quote {
                Some(q) => {
                    if ch == q {
                        quote = None;
                    }
                    prepared.push(ch);
                }
                None => match ch {
                    '\'' | '"' => {
                        quote = Some(ch);
                        prepared.push(ch);
                    }
                    '?' => {
                        prepared.push_str(&self.parameter_placeholder(index));
                        index += 1;
                    }
                    _ => prepared.push(ch),
                },
            }
        }

        Cow::Owned(prepared)
    }
}
