//! Schema/Table Cache - memoized table metadata per entity type
//!
//! Entries are populated once through the driver's introspection calls and
//! then served without touching the driver again. There is no background
//! refresh: a table altered at runtime keeps its cached shape until
//! [`SchemaCache::invalidate`] or [`SchemaCache::clear`] is called.

use std::sync::Arc;
use dashmap::DashMap;
use tracing::debug;

use crate::backends::{ColumnInfo, Driver};
use crate::error::{OrmError, OrmResult};
use crate::naming::NamingConvention;

/// Table metadata for one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaInfo {
    pub entity: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: String,
}

impl SchemaInfo {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Cache of [`SchemaInfo`] keyed by entity type name.
///
/// Safe to share across managers behind an `Arc`. Two managers racing to
/// populate the same entry both introspect and the later write wins; the
/// entries are identical so the overwrite is harmless.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: DashMap<String, Arc<SchemaInfo>>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache ready to be shared between managers
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Resolve the schema for an entity type, introspecting on first access.
    ///
    /// The expected table is `table_override` if given, else the naming
    /// convention's table name for `entity`. A missing table fails with
    /// [`OrmError::MissingTable`] before any column introspection happens.
    pub async fn get(
        &self,
        entity: &str,
        table_override: Option<&str>,
        naming: &dyn NamingConvention,
        driver: &mut dyn Driver,
    ) -> OrmResult<Arc<SchemaInfo>> {
        if let Some(info) = self.cached(entity) {
            return Ok(info);
        }

        let expected = table_override
            .map(str::to_string)
            .unwrap_or_else(|| naming.table_name(entity));

        let tables = driver.list_tables().await?;
        let table_name = tables
            .into_iter()
            .find(|t| t == &expected || t.eq_ignore_ascii_case(&expected))
            .ok_or_else(|| OrmError::MissingTable {
                entity: entity.to_string(),
                table: expected.clone(),
            })?;

        let columns = driver.list_columns(&table_name).await?;
        let primary_key = columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .ok_or_else(|| OrmError::MissingSchema {
                entity: entity.to_string(),
                detail: format!("table '{}' has no primary key column", table_name),
            })?;

        debug!(
            "Cached schema for {}: table={}, columns={}, primary_key={}",
            entity,
            table_name,
            columns.len(),
            primary_key
        );

        let info = Arc::new(SchemaInfo {
            entity: entity.to_string(),
            table_name,
            columns,
            primary_key,
        });
        self.entries.insert(entity.to_string(), info.clone());

        Ok(info)
    }

    /// Cached entry, if populated
    pub fn cached(&self, entity: &str) -> Option<Arc<SchemaInfo>> {
        self.entries.get(entity).map(|entry| entry.value().clone())
    }

    /// Seed an entry without introspection
    pub fn insert(&self, info: SchemaInfo) {
        self.entries.insert(info.entity.clone(), Arc::new(info));
    }

    /// Drop one entry; returns whether it was present
    pub fn invalidate(&self, entity: &str) -> bool {
        self.entries.remove(entity).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
