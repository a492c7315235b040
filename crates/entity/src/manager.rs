//! Entity Manager - reads, writes and relation resolution over one owned
//! driver.
//!
//! The manager is the only component that sends data statements to the
//! driver. Every operation resolves the entity's [`SchemaInfo`] first, so a
//! missing table surfaces before any statement is built.

use std::any::TypeId;
use std::sync::Arc;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::backends::core::guard_unconditional;
use crate::backends::{DatabaseValue, Driver, DriverRegistry, DriverWriteExt, FieldValues, ResultSet, Row};
use crate::conditions::ConditionTree;
use crate::config::{ConnectionConfig, DatabaseConfig};
use crate::entity::{Entity, Related, RelationName, RelationState};
use crate::error::{OrmError, OrmResult};
use crate::naming::{DefaultNamingConvention, NamingConvention};
use crate::query::{QueryDescriptor, Statement};
use crate::relationships::{RelationDirective, RelationKind, RelationPlan, RelationRegistry, RelationResolver};
use crate::schema::{SchemaCache, SchemaInfo};

/// Façade over one driver connection.
///
/// The schema cache and relation registry are shared through `Arc`s so a
/// host can keep them alive across many short-lived managers.
pub struct EntityManager {
    driver: Box<dyn Driver>,
    schemas: Arc<SchemaCache>,
    naming: Arc<dyn NamingConvention>,
    relations: Arc<RelationRegistry>,
}

impl EntityManager {
    /// Manager with private caches and the default naming convention
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self {
            driver,
            schemas: SchemaCache::shared(),
            naming: Arc::new(DefaultNamingConvention),
            relations: RelationRegistry::shared(),
        }
    }

    pub fn with_driver<D: Driver + 'static>(driver: D) -> Self {
        Self::new(Box::new(driver))
    }

    /// Build the driver for `config` through `registry`
    pub fn from_connection_config(config: &ConnectionConfig, registry: &DriverRegistry) -> OrmResult<Self> {
        Ok(Self::new(registry.create(config)?))
    }

    /// Build the driver for the config's default environment
    pub fn from_config(config: &DatabaseConfig, registry: &DriverRegistry) -> OrmResult<Self> {
        Self::from_connection_config(config.default_connection()?, registry)
    }

    /// Build the driver for a named environment
    pub fn for_environment(config: &DatabaseConfig, environment: &str, registry: &DriverRegistry) -> OrmResult<Self> {
        Self::from_connection_config(config.connection(environment)?, registry)
    }

    pub fn with_schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_naming(mut self, naming: Arc<dyn NamingConvention>) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_relation_registry(mut self, relations: Arc<RelationRegistry>) -> Self {
        self.relations = relations;
        self
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    pub fn schema_cache(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    pub fn relation_registry(&self) -> &Arc<RelationRegistry> {
        &self.relations
    }

    pub fn naming(&self) -> &dyn NamingConvention {
        self.naming.as_ref()
    }

    /// Open the driver connection; a no-op when already connected
    pub async fn connect(&mut self) -> OrmResult<()> {
        self.driver.connect().await
    }

    pub async fn disconnect(&mut self) -> OrmResult<()> {
        self.driver.disconnect().await
    }

    async fn ensure_connected(&mut self) -> OrmResult<()> {
        if !self.driver.is_connected() {
            self.driver.connect().await?;
        }
        Ok(())
    }

    /// Cached schema of `T`
    pub async fn schema<T: Entity>(&mut self) -> OrmResult<Arc<SchemaInfo>> {
        self.schema_for(T::entity_name(), T::table_name()).await
    }

    async fn schema_for(&mut self, entity: &str, table: Option<&str>) -> OrmResult<Arc<SchemaInfo>> {
        self.ensure_connected().await?;
        self.schemas
            .get(entity, table, self.naming.as_ref(), self.driver.as_mut())
            .await
    }

    async fn run(&mut self, statement: &Statement) -> OrmResult<ResultSet> {
        self.ensure_connected().await?;
        self.driver.execute(&statement.sql, &statement.values).await
    }

    /// Run a raw statement on the owned driver
    pub async fn execute(&mut self, sql: &str, values: &[DatabaseValue]) -> OrmResult<ResultSet> {
        self.run(&Statement::new(sql, values.to_vec())).await
    }

    /// Entities matching a query descriptor. An unset table defaults to the
    /// entity's table.
    pub async fn find<T: Entity>(&mut self, query: QueryDescriptor) -> OrmResult<Vec<T>> {
        let schema = self.schema::<T>().await?;
        let query = match query.table {
            Some(_) => query,
            None => query.table(schema.table_name.as_str()),
        };

        let statement = Statement::select(&query)?;
        debug!("find {}: {}", T::entity_name(), statement.sql);
        let result = self.run(&statement).await?;
        hydrate(result.rows)
    }

    /// First entity matching a query descriptor
    pub async fn find_one<T: Entity>(&mut self, query: QueryDescriptor) -> OrmResult<Option<T>> {
        let found = self.find::<T>(query.limit(1)).await?;
        Ok(found.into_iter().next())
    }

    /// First entity matching a condition map
    pub async fn find_one_by<T, C>(&mut self, conditions: C) -> OrmResult<Option<T>>
    where
        T: Entity,
        C: TryInto<ConditionTree>,
        OrmError: From<C::Error>,
    {
        let conditions = conditions.try_into()?;
        self.find_one(QueryDescriptor::new().conditions(conditions)).await
    }

    /// All entities matching a condition map
    pub async fn find_by<T, C>(&mut self, conditions: C) -> OrmResult<Vec<T>>
    where
        T: Entity,
        C: TryInto<ConditionTree>,
        OrmError: From<C::Error>,
    {
        let conditions = conditions.try_into()?;
        self.find(QueryDescriptor::new().conditions(conditions)).await
    }

    /// Hydrate the rows of a hand-written select
    pub async fn find_by_sql<T: Entity>(&mut self, sql: &str, values: &[DatabaseValue]) -> OrmResult<Vec<T>> {
        self.schema::<T>().await?;
        let result = self.execute(sql, values).await?;
        hydrate(result.rows)
    }

    /// Number of rows matching a condition map
    pub async fn count<T, C>(&mut self, conditions: C) -> OrmResult<u64>
    where
        T: Entity,
        C: TryInto<ConditionTree>,
        OrmError: From<C::Error>,
    {
        let conditions = conditions.try_into()?;
        let schema = self.schema::<T>().await?;
        let query = QueryDescriptor::for_table(schema.table_name.as_str()).conditions(conditions);

        let result = self.run(&Statement::count(&query)?).await?;
        let row = result
            .rows
            .first()
            .ok_or_else(|| OrmError::Query(format!("COUNT on '{}' returned no row", schema.table_name)))?;
        row.get("count")
            .or_else(|| row.get_by_index(0))
            .and_then(DatabaseValue::as_i64)
            .map(|count| count.max(0) as u64)
            .ok_or_else(|| OrmError::Query(format!("COUNT on '{}' returned a non-integer", schema.table_name)))
    }

    /// Insert a row and return its primary key: the supplied value if one
    /// was given, else the identifier generated by the backend.
    pub async fn create<T: Entity>(&mut self, fields: FieldValues) -> OrmResult<Option<DatabaseValue>> {
        let schema = self.schema::<T>().await?;
        validate_columns(&schema, &fields)?;

        let result = self.driver.insert(&schema.table_name, &fields).await?;
        debug!("Inserted {} into {}", T::entity_name(), schema.table_name);

        if let Some(key) = fields.get(&schema.primary_key).filter(|value| !value.is_null()) {
            return Ok(Some(key.clone()));
        }
        if result.last_insert_id.is_some() {
            return Ok(result.last_insert_id);
        }
        self.driver.last_inserted_id().await
    }

    /// Insert an entity's serialized fields. A null primary key is left to
    /// the backend.
    pub async fn insert<T: Entity>(&mut self, entity: &T) -> OrmResult<Option<DatabaseValue>> {
        let schema = self.schema::<T>().await?;
        let mut fields = entity_fields(entity)?;
        if fields.get(&schema.primary_key).map_or(false, DatabaseValue::is_null) {
            fields.remove(&schema.primary_key);
        }
        self.create::<T>(fields).await
    }

    /// Update rows matching a non-empty condition map
    pub async fn update<T, C>(&mut self, conditions: C, fields: FieldValues) -> OrmResult<u64>
    where
        T: Entity,
        C: TryInto<ConditionTree>,
        OrmError: From<C::Error>,
    {
        let conditions = conditions.try_into()?;
        self.update_rows::<T>(conditions, fields, false).await
    }

    /// Update every row of `T`'s table
    pub async fn update_all<T: Entity>(&mut self, fields: FieldValues) -> OrmResult<u64> {
        self.update_rows::<T>(ConditionTree::empty(), fields, true).await
    }

    async fn update_rows<T: Entity>(
        &mut self,
        conditions: ConditionTree,
        fields: FieldValues,
        allow_unconditional: bool,
    ) -> OrmResult<u64> {
        let table_hint = T::table_name().unwrap_or_else(T::entity_name);
        guard_unconditional("update", table_hint, &conditions, allow_unconditional)?;

        let schema = self.schema::<T>().await?;
        validate_columns(&schema, &fields)?;

        let affected = self
            .driver
            .update(&schema.table_name, &conditions, &fields, allow_unconditional)
            .await?;
        debug!("Updated {} row(s) in {}", affected, schema.table_name);
        Ok(affected)
    }

    /// Delete rows matching a non-empty condition map, removing dependent
    /// relation rows first
    pub async fn delete<T, C>(&mut self, conditions: C) -> OrmResult<u64>
    where
        T: Entity,
        C: TryInto<ConditionTree>,
        OrmError: From<C::Error>,
    {
        let conditions = conditions.try_into()?;
        self.delete_rows::<T>(conditions, false).await
    }

    /// Delete every row of `T`'s table
    pub async fn delete_all<T: Entity>(&mut self) -> OrmResult<u64> {
        self.delete_rows::<T>(ConditionTree::empty(), true).await
    }

    async fn delete_rows<T: Entity>(&mut self, conditions: ConditionTree, allow_unconditional: bool) -> OrmResult<u64> {
        let table_hint = T::table_name().unwrap_or_else(T::entity_name);
        guard_unconditional("delete", table_hint, &conditions, allow_unconditional)?;

        let schema = self.schema::<T>().await?;
        self.delete_dependents::<T>(&schema, &conditions).await?;

        let affected = self
            .driver
            .delete(&schema.table_name, &conditions, allow_unconditional)
            .await?;
        debug!("Deleted {} row(s) from {}", affected, schema.table_name);
        Ok(affected)
    }

    async fn delete_dependents<T: Entity>(&mut self, schema: &SchemaInfo, conditions: &ConditionTree) -> OrmResult<()> {
        let dependents: Vec<RelationDirective> = self
            .relations
            .relations_for::<T>()?
            .iter()
            .filter(|directive| directive.dependent && directive.kind != RelationKind::ManyToOne)
            .cloned()
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }

        let owners_query = QueryDescriptor::for_table(schema.table_name.as_str()).conditions(conditions.clone());
        let owners: Vec<JsonValue> = self
            .run(&Statement::select(&owners_query)?)
            .await?
            .rows
            .iter()
            .map(Row::to_json)
            .collect();

        for directive in &dependents {
            let target = self
                .schema_for(directive.target.entity_name, directive.target.table_name)
                .await?;
            for owner in &owners {
                let planned = RelationResolver::new(self.naming.as_ref())
                    .dependent_delete(directive, schema, &target, owner)?;
                if let Some(delete) = planned {
                    let removed = self.driver.delete(&delete.table, &delete.conditions, false).await?;
                    debug!(
                        "Removed {} dependent row(s) from {} for relation '{}'",
                        removed, delete.table, directive.name
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn begin(&mut self) -> OrmResult<()> {
        self.ensure_connected().await?;
        self.driver.begin_transaction().await
    }

    pub async fn commit(&mut self) -> OrmResult<()> {
        self.driver.commit().await
    }

    pub async fn rollback(&mut self) -> OrmResult<()> {
        self.driver.rollback().await
    }

    /// Load a relation of `entity` on first access and return the memoized
    /// value afterwards.
    pub async fn resolve<'e, T, R>(&mut self, entity: &'e mut T, relation: T::Relation) -> OrmResult<&'e Related<R>>
    where
        T: Entity,
        R: Entity,
    {
        self.resolve_named::<T, R>(entity, relation.name()).await
    }

    /// [`EntityManager::resolve`] by relation name.
    ///
    /// An undeclared name fails with [`OrmError::UnknownProperty`] without
    /// querying. A failed load is stored on the slot and returned again on
    /// every later access.
    pub async fn resolve_named<'e, T, R>(&mut self, entity: &'e mut T, relation: &str) -> OrmResult<&'e Related<R>>
    where
        T: Entity,
        R: Entity,
    {
        match entity.relation_slots().state(relation) {
            RelationState::Resolved | RelationState::Failed => return stored(entity, relation),
            RelationState::Unresolved | RelationState::Resolving => {}
        }

        let directive = self.relations.directive::<T>(relation)?;
        if directive.target.type_id != TypeId::of::<R>() {
            return Err(OrmError::Relation(format!(
                "Relation '{}' on '{}' targets {}, not {}",
                relation,
                T::entity_name(),
                directive.target.type_name,
                std::any::type_name::<R>()
            )));
        }

        entity.relation_slots_mut().mark_resolving(relation);
        debug!("Resolving {}.{} ({:?})", T::entity_name(), relation, directive.kind);

        match self.load_relation::<T, R>(&directive, entity).await {
            Ok(related) => entity.relation_slots_mut().preload(relation, related),
            Err(err) => {
                warn!("Failed to resolve {}.{}: {}", T::entity_name(), relation, err);
                entity.relation_slots_mut().mark_failed(relation, err.clone());
                return Err(err);
            }
        }

        stored(entity, relation)
    }

    async fn load_relation<T: Entity, R: Entity>(
        &mut self,
        directive: &RelationDirective,
        owner: &T,
    ) -> OrmResult<Related<R>> {
        let owner_values = serde_json::to_value(owner)?;
        let owner_schema = self.schema::<T>().await?;
        let target_schema = self
            .schema_for(directive.target.entity_name, directive.target.table_name)
            .await?;

        let plan = RelationResolver::new(self.naming.as_ref()).plan(
            directive,
            &owner_schema,
            &target_schema,
            &owner_values,
        )?;

        let entities = match plan {
            RelationPlan::Empty => Vec::new(),
            RelationPlan::Query(query) => {
                let result = self.run(&Statement::select(&query)?).await?;
                hydrate::<R>(result.rows)?
            }
        };

        Ok(if directive.kind.is_collection() {
            Related::Many(entities)
        } else {
            Related::One(entities.into_iter().next())
        })
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("driver", &self.driver.name())
            .field("connected", &self.driver.is_connected())
            .field("cached_schemas", &self.schemas.len())
            .finish()
    }
}

fn stored<'e, T: Entity, R: 'static>(entity: &'e T, relation: &str) -> OrmResult<&'e Related<R>> {
    entity
        .relation_slots()
        .get::<R>(relation)
        .unwrap_or_else(|| Err(OrmError::Relation(format!("Relation '{}' is not loaded", relation))))
}

/// Decode rows into entities through their serde representation
pub fn hydrate<T: Entity>(rows: Vec<Row>) -> OrmResult<Vec<T>> {
    rows.iter()
        .map(|row| {
            serde_json::from_value(row.to_json())
                .map_err(|e| OrmError::Hydration(format!("Cannot hydrate {}: {}", T::entity_name(), e)))
        })
        .collect()
}

/// Column values of an entity, from its serde representation
pub fn entity_fields<T: Entity>(entity: &T) -> OrmResult<FieldValues> {
    match serde_json::to_value(entity)? {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(column, value)| (column, DatabaseValue::from_json(value)))
            .collect()),
        other => Err(OrmError::Hydration(format!(
            "{} does not serialize to an object: {}",
            T::entity_name(),
            other
        ))),
    }
}

/// Field values from a JSON object such as `json!({"title": "Hello"})`
pub fn field_values(json: JsonValue) -> OrmResult<FieldValues> {
    match json {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(column, value)| (column, DatabaseValue::from_json(value)))
            .collect()),
        other => Err(OrmError::Query(format!("Field values must be a JSON object, got {}", other))),
    }
}

fn validate_columns(schema: &SchemaInfo, fields: &FieldValues) -> OrmResult<()> {
    match fields.keys().find(|column| !schema.has_column(column)) {
        Some(column) => Err(OrmError::MissingSchema {
            entity: schema.entity.clone(),
            detail: format!("column '{}' does not exist on table '{}'", column, schema.table_name),
        }),
        None => Ok(()),
    }
}
