//! SQLite Driver Implementation
//!
//! SQLite implementation of the driver contract over a single owned sqlx
//! connection. Mostly used for embedded deployments and tests against an
//! in-memory database.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row as SqlxRow, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use super::core::*;
use super::statement_returns_rows;

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
    WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
    ORDER BY name";

const LIST_COLUMNS_SQL: &str = "SELECT name, type, \"notnull\", dflt_value, pk \
    FROM pragma_table_info(?) \
    ORDER BY cid";

/// SQLite driver owning one connection
pub struct SqliteDriver {
    config: ConnectionConfig,
    conn: Option<SqliteConnection>,
    affected_rows: u64,
    last_insert_id: Option<i64>,
}

impl SqliteDriver {
    /// Create an unconnected driver
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            conn: None,
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    /// Unconnected driver for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(ConnectionConfig::sqlite(":memory:"))
    }

    /// Registry constructor
    pub fn from_config(config: &ConnectionConfig) -> OrmResult<Box<dyn Driver>> {
        Ok(Box::new(Self::new(config.clone())))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn connection(&mut self) -> OrmResult<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::MissingConnection("SQLite driver is not connected".to_string()))
    }

    async fn run(&mut self, sql: &str) -> OrmResult<()> {
        let conn = self.connection()?;
        sqlx::query(sql).execute(&mut *conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("database", &self.config.database)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn connect(&mut self) -> OrmResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let url = self.config.to_url()?;
        let mut conn = SqliteConnection::connect(&url).await?;
        if let Some(encoding) = &self.config.encoding {
            let sql = format!("PRAGMA encoding = '{}'", encoding.replace('\'', "''"));
            sqlx::query(&sql).execute(&mut conn).await?;
        }

        info!("Connected to SQLite database '{}'", self.config.database);
        self.conn = Some(conn);
        Ok(())
    }

    async fn disconnect(&mut self) -> OrmResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            info!("Disconnected from SQLite database '{}'", self.config.database);
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ResultSet> {
        debug!("Executing SQL: {} ({} bound values)", sql, params.len());

        let conn = self.connection()?;
        let mut query = sqlx::query(sql);
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
            let mut result = ResultSet::affected(done.rows_affected());
            if sql.trim_start().to_uppercase().starts_with("INSERT") && done.rows_affected() > 0 {
                result = result.with_last_insert_id(done.last_insert_rowid());
            }
            result
        };

        self.affected_rows = result.rows_affected;
        if let Some(id) = result.last_insert_id.as_ref().and_then(DatabaseValue::as_i64) {
            self.last_insert_id = Some(id);
        }
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
            .map(|row| row.try_get::<String, _>("name").map_err(OrmError::from))
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
                let not_null: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                    nullable: not_null == 0 && pk == 0,
                    is_primary_key: pk == 1,
                    default: row.try_get("dflt_value")?,
                })
            })
            .collect()
    }

    async fn last_inserted_id(&mut self) -> OrmResult<Option<DatabaseValue>> {
        if let Some(id) = self.last_insert_id {
            return Ok(Some(DatabaseValue::Int64(id)));
        }

        let conn = self.connection()?;
        let id: i64 = sqlx::query_scalar("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await?;
        Ok((id != 0).then_some(DatabaseValue::Int64(id)))
    }

    fn affected_rows(&self) -> u64 {
        self.affected_rows
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(u.to_string()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Date(d) => query.bind(*d),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

fn convert_row(row: &SqliteRow) -> OrmResult<Row> {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), sqlite_value_to_database_value(row, index)?);
    }
    Ok(converted)
}

/// Convert a SQLite column value to DatabaseValue.
///
/// SQLite types values, not columns, so the stored value's type decides the
/// conversion. Declared `BOOLEAN` columns are the exception and decode as
/// booleans.
fn sqlite_value_to_database_value(row: &SqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let declared = row.columns()[index].type_info().name().to_string();

    let value = match (declared.as_str(), storage.as_str()) {
        ("BOOLEAN", _) => DatabaseValue::Bool(row.try_get(index)?),
        (_, "INTEGER") => DatabaseValue::Int64(row.try_get(index)?),
        (_, "REAL") => DatabaseValue::Float64(row.try_get(index)?),
        (_, "BLOB") => DatabaseValue::Bytes(row.try_get(index)?),
        _ => {
            let value: String = row.try_get_unchecked(index).map_err(|e| {
                OrmError::driver(format!("Unsupported SQLite value of type '{}': {}", storage, e))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}
