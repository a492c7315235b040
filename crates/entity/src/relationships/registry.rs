//! Relation Registry - lazily loaded directive tables per entity type

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;
use dashmap::DashMap;

use crate::entity::{Entity, RelationName};
use crate::error::{OrmError, OrmResult};
use super::metadata::RelationDirective;

/// Ordered directives declared by one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRelations {
    pub entity: &'static str,
    directives: Vec<RelationDirective>,
}

impl EntityRelations {
    /// Validate and index the directives of `entity`
    pub fn new(entity: &'static str, directives: Vec<RelationDirective>) -> OrmResult<Self> {
        let mut seen = HashSet::new();
        for directive in &directives {
            directive.validate(entity)?;
            if !seen.insert(directive.name.as_str()) {
                return Err(OrmError::Relation(format!(
                    "Relation '{}' is declared twice on '{}'",
                    directive.name, entity
                )));
            }
        }

        Ok(Self { entity, directives })
    }

    pub fn get(&self, name: &str) -> Option<&RelationDirective> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationDirective> {
        self.directives.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.directives.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Thread-safe store of directive tables keyed by entity type.
///
/// A type's table is read from [`Entity::relations`] on first use and is
/// immutable afterwards.
#[derive(Debug, Default)]
pub struct RelationRegistry {
    relations: DashMap<TypeId, Arc<EntityRelations>>,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Directive table for `T`, loading it on first access
    pub fn relations_for<T: Entity>(&self) -> OrmResult<Arc<EntityRelations>> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.relations.get(&key) {
            return Ok(entry.value().clone());
        }

        let relations = Arc::new(EntityRelations::new(T::entity_name(), T::relations())?);
        tracing::debug!(
            "Registered {} relation(s) for {}: {:?}",
            relations.len(),
            relations.entity,
            relations.names()
        );
        self.relations.insert(key, relations.clone());
        Ok(relations)
    }

    /// Directive `name` of `T`, or [`OrmError::UnknownProperty`]
    pub fn directive<T: Entity>(&self, name: &str) -> OrmResult<RelationDirective> {
        self.relations_for::<T>()?
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownProperty {
                entity: T::entity_name().to_string(),
                property: name.to_string(),
            })
    }

    /// Typed form of [`RelationRegistry::directive`]
    pub fn directive_for<T: Entity>(&self, relation: T::Relation) -> OrmResult<RelationDirective> {
        self.directive::<T>(relation.name())
    }

    pub fn is_loaded<T: Entity>(&self) -> bool {
        self.relations.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn clear(&self) {
        self.relations.clear();
    }
}
