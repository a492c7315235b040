//! Relation Metadata - declarative relation directives

use std::any::TypeId;

use crate::conditions::ConditionTree;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};

/// Defines the type of relation between entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// hasOne: the target carries a foreign key to the owner
    OneToOne,
    /// hasMany: many targets carry a foreign key to the owner
    OneToMany,
    /// belongsTo: the owner carries a foreign key to the target
    ManyToOne,
    /// hasAndBelongsToMany: linked through a join table
    ManyToMany,
}

impl RelationKind {
    /// Returns true if this relation resolves to a collection
    pub fn is_collection(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Returns true if the foreign key lives on the owner's table
    pub fn key_on_owner(self) -> bool {
        matches!(self, Self::ManyToOne)
    }

    /// Returns true if this relation requires a join table
    pub fn requires_join_table(self) -> bool {
        matches!(self, Self::ManyToMany)
    }
}

/// Target entity type of a directive, captured at declaration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationTarget {
    pub entity_name: &'static str,
    pub table_name: Option<&'static str>,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl RelationTarget {
    pub fn of<R: Entity>() -> Self {
        Self {
            entity_name: R::entity_name(),
            table_name: R::table_name(),
            type_id: TypeId::of::<R>(),
            type_name: std::any::type_name::<R>(),
        }
    }
}

/// One declared relation of an entity type.
///
/// Key names left unset are derived from the naming convention when the
/// relation is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDirective {
    pub name: String,
    pub kind: RelationKind,
    pub target: RelationTarget,
    pub foreign_key: Option<String>,
    pub join_table: Option<String>,
    pub association_foreign_key: Option<String>,
    pub extra_conditions: ConditionTree,
    /// Delete dependent targets (join rows for many-to-many) with the owner
    pub dependent: bool,
}

impl RelationDirective {
    pub fn new<R: Entity>(kind: RelationKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: RelationTarget::of::<R>(),
            foreign_key: None,
            join_table: None,
            association_foreign_key: None,
            extra_conditions: ConditionTree::empty(),
            dependent: false,
        }
    }

    pub fn has_one<R: Entity>(name: impl Into<String>) -> Self {
        Self::new::<R>(RelationKind::OneToOne, name)
    }

    pub fn has_many<R: Entity>(name: impl Into<String>) -> Self {
        Self::new::<R>(RelationKind::OneToMany, name)
    }

    pub fn belongs_to<R: Entity>(name: impl Into<String>) -> Self {
        Self::new::<R>(RelationKind::ManyToOne, name)
    }

    pub fn has_and_belongs_to_many<R: Entity>(name: impl Into<String>) -> Self {
        Self::new::<R>(RelationKind::ManyToMany, name)
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.join_table = Some(table.into());
        self
    }

    pub fn association_foreign_key(mut self, column: impl Into<String>) -> Self {
        self.association_foreign_key = Some(column.into());
        self
    }

    /// Extra conditions AND-ed onto every resolution query
    pub fn conditions(mut self, conditions: ConditionTree) -> Self {
        self.extra_conditions = conditions;
        self
    }

    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    /// Reject empty names and overrides that only apply to join-table relations
    pub fn validate(&self, owner: &str) -> OrmResult<()> {
        let fail = |detail: String| {
            Err(OrmError::Relation(format!(
                "Invalid relation '{}' on '{}': {}",
                self.name, owner, detail
            )))
        };

        if self.name.trim().is_empty() {
            return fail("relation name is empty".to_string());
        }
        if self.target.entity_name.trim().is_empty() {
            return fail("target entity name is empty".to_string());
        }

        let overrides = [
            ("foreign key", &self.foreign_key),
            ("join table", &self.join_table),
            ("association foreign key", &self.association_foreign_key),
        ];
        for (label, value) in overrides {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return fail(format!("{} override is empty", label));
            }
        }

        if !self.kind.requires_join_table()
            && (self.join_table.is_some() || self.association_foreign_key.is_some())
        {
            return fail(format!("{:?} relations do not use a join table", self.kind));
        }

        Ok(())
    }
}
