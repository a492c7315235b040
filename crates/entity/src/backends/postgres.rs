//! PostgreSQL Driver Implementation
//!
//! This module provides the PostgreSQL implementation of the driver contract
//! using a single owned sqlx connection.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::{Column, Connection, Postgres, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use super::core::*;
use super::statement_returns_rows;

/// SQLSTATE raised by `lastval()` before any sequence was used in the session
const LASTVAL_UNDEFINED: &str = "55000";

const LIST_TABLES_SQL: &str = "SELECT table_name::text AS table_name \
    FROM information_schema.tables \
    WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
    ORDER BY table_name";

const LIST_COLUMNS_SQL: &str = "SELECT c.column_name::text AS column_name, \
    c.data_type::text AS data_type, \
    c.is_nullable::text AS is_nullable, \
    c.column_default::text AS column_default, \
    EXISTS ( \
        SELECT 1 FROM information_schema.table_constraints tc \
        JOIN information_schema.key_column_usage kcu \
          ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
        WHERE tc.constraint_type = 'PRIMARY KEY' \
          AND tc.table_schema = c.table_schema \
          AND tc.table_name = c.table_name \
          AND kcu.column_name = c.column_name \
    ) AS is_primary_key \
    FROM information_schema.columns c \
    WHERE c.table_schema = current_schema() AND c.table_name = $1 \
    ORDER BY c.ordinal_position";

/// PostgreSQL driver owning one connection
pub struct PostgresDriver {
    config: ConnectionConfig,
    conn: Option<PgConnection>,
    affected_rows: u64,
}

impl PostgresDriver {
    /// Create an unconnected driver
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            affected_rows: 0,
        }
    }

    /// Registry constructor
    pub fn from_config(config: &ConnectionConfig) -> OrmResult<Box<dyn Driver>> {
        Ok(Box::new(Self::new(config.clone())))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn connection(&mut self) -> OrmResult<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::MissingConnection("PostgreSQL driver is not connected".to_string()))
    }

    async fn run(&mut self, sql: &str) -> OrmResult<()> {
        let conn = self.connection()?;
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> OrmResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let url = self.config.to_url()?;
        let mut conn = PgConnection::connect(&url).await?;

        if let Some(schema) = &self.config.schema {
            let sql = format!("SET search_path TO {}", quote_identifier(schema));
            sqlx::query(&sql).execute(&mut conn).await?;
        }
        if let Some(encoding) = &self.config.encoding {
            let sql = format!("SET client_encoding TO '{}'", encoding.replace('\'', "''"));
            sqlx::query(&sql).execute(&mut conn).await?;
        }

        info!(
            "Connected to PostgreSQL database '{}' on {}",
            self.config.database,
            self.config.host.as_deref().unwrap_or("localhost")
        );
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> OrmResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            info!("Disconnected from PostgreSQL database '{}'", self.config.database);
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ResultSet> {
        let prepared = SqlDialect::PostgreSQL.prepare(sql);
        debug!("Executing SQL: {} ({} bound values)", prepared, params.len());

        let conn = self.connection()?;
        let mut query = sqlx::query(&prepared);
        for param in params {
            query = bind_database_value(query, param);
        }

        let result = if statement_returns_rows(sql) {
            let rows = query.fetch_all(&mut *conn).await?;
            let rows = rows.iter().map(convert_row).collect::<OrmResult<Vec<_>>>()?;
            let affected = if sql.to_uppercase().contains(" RETURNING ") {
                rows.len() as u64
            } else {
                0
            };
            ResultSet {
                rows,
                rows_affected: affected,
                last_insert_id: None,
            }
        } else {
            let done = query.execute(&mut *conn).await?;
            ResultSet::affected(done.rows_affected())
        };

        self.affected_rows = result.rows_affected;
        Ok(result)
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        debug!("BEGIN");
        self.run("BEGIN").await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        debug!("COMMIT");
        self.run("COMMIT").await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        debug!("ROLLBACK");
        self.run("ROLLBACK").await
    }

    async fn list_tables(&mut self) -> OrmResult<Vec<String>> {
        let conn = self.connection()?;
        let rows = sqlx::query(LIST_TABLES_SQL).fetch_all(&mut *conn).await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(OrmError::from))
            .collect()
    }

    async fn list_columns(&mut self, table: &str) -> OrmResult<Vec<ColumnInfo>> {
        let conn = self.connection()?;
        let rows = sqlx::query(LIST_COLUMNS_SQL)
            .bind(table)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> OrmResult<ColumnInfo> {
                let nullable: String = row.try_get("is_nullable")?;
                Ok(ColumnInfo {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: nullable.eq_ignore_ascii_case("YES"),
                    is_primary_key: row.try_get("is_primary_key")?,
                    default: row.try_get("column_default")?,
                })
            })
            .collect()
    }

    async fn last_inserted_id(&mut self) -> OrmResult<Option<DatabaseValue>> {
        let conn = self.connection()?;
        match sqlx::query_scalar::<_, i64>("SELECT lastval()").fetch_one(&mut *conn).await {
            Ok(id) => Ok(Some(DatabaseValue::Int64(id))),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(LASTVAL_UNDEFINED) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(*u),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn convert_row(row: &PgRow) -> OrmResult<Row> {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), postgres_value_to_database_value(row, index)?);
    }
    Ok(converted)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int32(row.try_get::<i16, _>(index)? as i32),
        "INT4" => DatabaseValue::Int32(row.try_get(index)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float64(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => DatabaseValue::String(row.try_get(index)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index)?;
            DatabaseValue::DateTime(chrono::TimeZone::from_utc_datetime(&chrono::Utc, &naive))
        }
        "DATE" => DatabaseValue::Date(row.try_get(index)?),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        _ => {
            // Fallback: try to get as string
            let value: String = row.try_get(index).map_err(|e| {
                OrmError::driver(format!("Unsupported PostgreSQL type '{}': {}", type_name, e))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_driver_is_disconnected() {
        let driver = PostgresDriver::new(ConnectionConfig::postgres("localhost", "blog"));
        assert_eq!(driver.name(), "postgres");
        assert_eq!(driver.dialect(), SqlDialect::PostgreSQL);
        assert!(!driver.is_connected());
        assert_eq!(driver.affected_rows(), 0);
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let mut driver = PostgresDriver::new(ConnectionConfig::postgres("localhost", "blog"));
        let err = driver.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, OrmError::MissingConnection(_)));

        // Disconnecting a driver that never connected is a no-op
        assert!(driver.disconnect().await.is_ok());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("content"), "\"content\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
