//! Relation Resolver - turns a directive and an owner instance into the
//! query that loads the related entities.
//!
//! Planning is synchronous. The entity manager supplies both schemas, runs
//! the planned query and stores the result in the owner's relation slot.

use serde_json::Value as JsonValue;

use crate::backends::DatabaseValue;
use crate::conditions::ConditionTree;
use crate::error::{OrmError, OrmResult};
use crate::naming::NamingConvention;
use crate::query::QueryDescriptor;
use crate::schema::SchemaInfo;
use super::metadata::{RelationDirective, RelationKind};

/// Key names after defaults have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveKeys {
    /// Column holding the reference: on the target for one-to-one and
    /// one-to-many, on the owner for many-to-one, on the join table for
    /// many-to-many
    pub foreign_key: String,
    /// Join table and its column referencing the target (many-to-many only)
    pub join_table: Option<String>,
    pub association_foreign_key: Option<String>,
}

/// Query planned for one relation access
#[derive(Debug, Clone, PartialEq)]
pub enum RelationPlan {
    /// The referencing key is null; the relation is empty without querying
    Empty,
    Query(QueryDescriptor),
}

/// Rows removed alongside an owner for a dependent relation
#[derive(Debug, Clone, PartialEq)]
pub struct DependentDelete {
    pub table: String,
    pub conditions: ConditionTree,
}

/// Plans relation queries using a naming convention for defaults
pub struct RelationResolver<'a> {
    naming: &'a dyn NamingConvention,
}

impl<'a> RelationResolver<'a> {
    pub fn new(naming: &'a dyn NamingConvention) -> Self {
        Self { naming }
    }

    /// Apply naming defaults to the directive's key overrides
    pub fn effective_keys(
        &self,
        directive: &RelationDirective,
        owner: &SchemaInfo,
        target: &SchemaInfo,
    ) -> EffectiveKeys {
        let default_fk = if directive.kind.key_on_owner() {
            self.naming.foreign_key(&target.entity, &target.primary_key)
        } else {
            self.naming.foreign_key(&owner.entity, &owner.primary_key)
        };
        let foreign_key = directive.foreign_key.clone().unwrap_or(default_fk);

        if directive.kind != RelationKind::ManyToMany {
            return EffectiveKeys {
                foreign_key,
                join_table: None,
                association_foreign_key: None,
            };
        }

        EffectiveKeys {
            foreign_key,
            join_table: Some(
                directive
                    .join_table
                    .clone()
                    .unwrap_or_else(|| self.naming.join_table(&owner.entity, &target.entity)),
            ),
            association_foreign_key: Some(
                directive
                    .association_foreign_key
                    .clone()
                    .unwrap_or_else(|| self.naming.foreign_key(&target.entity, &target.primary_key)),
            ),
        }
    }

    /// Plan the query that loads `directive` for the owner whose column
    /// values are `owner_values`.
    pub fn plan(
        &self,
        directive: &RelationDirective,
        owner: &SchemaInfo,
        target: &SchemaInfo,
        owner_values: &JsonValue,
    ) -> OrmResult<RelationPlan> {
        let keys = self.effective_keys(directive, owner, target);

        let plan = match directive.kind {
            RelationKind::OneToOne | RelationKind::OneToMany => {
                let owner_key = owner_value(owner, owner_values, &owner.primary_key)?;
                if owner_key.is_null() {
                    return Ok(RelationPlan::Empty);
                }
                let conditions = ConditionTree::eq(keys.foreign_key, owner_key)
                    .and_also(directive.extra_conditions.clone());
                QueryDescriptor::for_table(target.table_name.as_str()).conditions(conditions)
            }
            RelationKind::ManyToOne => {
                let reference = owner_value(owner, owner_values, &keys.foreign_key)?;
                if reference.is_null() {
                    return Ok(RelationPlan::Empty);
                }
                let conditions = ConditionTree::eq(target.primary_key.as_str(), reference)
                    .and_also(directive.extra_conditions.clone());
                QueryDescriptor::for_table(target.table_name.as_str()).conditions(conditions)
            }
            RelationKind::ManyToMany => {
                let owner_key = owner_value(owner, owner_values, &owner.primary_key)?;
                if owner_key.is_null() {
                    return Ok(RelationPlan::Empty);
                }
                let (join_table, association_key) = join_keys(&keys)?;
                let target_table = target.table_name.as_str();

                let conditions = ConditionTree::eq(format!("{}.{}", join_table, keys.foreign_key), owner_key)
                    .and_also(directive.extra_conditions.clone());
                QueryDescriptor::for_table(target_table)
                    .select(&[format!("{}.*", target_table).as_str()])
                    .inner_join(
                        join_table,
                        &format!("{}.{}", join_table, association_key),
                        &format!("{}.{}", target_table, target.primary_key),
                    )
                    .conditions(conditions)
            }
        };

        if !directive.kind.is_collection() {
            return Ok(RelationPlan::Query(plan.limit(1)));
        }
        Ok(RelationPlan::Query(plan))
    }

    /// Rows to delete before the owner when `directive` is dependent.
    ///
    /// Many-to-many relations only lose their join rows; many-to-one
    /// targets are never removed.
    pub fn dependent_delete(
        &self,
        directive: &RelationDirective,
        owner: &SchemaInfo,
        target: &SchemaInfo,
        owner_values: &JsonValue,
    ) -> OrmResult<Option<DependentDelete>> {
        if !directive.dependent || directive.kind == RelationKind::ManyToOne {
            return Ok(None);
        }

        let owner_key = owner_value(owner, owner_values, &owner.primary_key)?;
        if owner_key.is_null() {
            return Ok(None);
        }

        let keys = self.effective_keys(directive, owner, target);
        let delete = match directive.kind {
            RelationKind::ManyToMany => {
                let (join_table, _) = join_keys(&keys)?;
                DependentDelete {
                    table: join_table.to_string(),
                    conditions: ConditionTree::eq(keys.foreign_key, owner_key),
                }
            }
            _ => DependentDelete {
                table: target.table_name.clone(),
                conditions: ConditionTree::eq(keys.foreign_key, owner_key)
                    .and_also(directive.extra_conditions.clone()),
            },
        };

        Ok(Some(delete))
    }
}

fn join_keys(keys: &EffectiveKeys) -> OrmResult<(&str, &str)> {
    match (&keys.join_table, &keys.association_foreign_key) {
        (Some(table), Some(association)) => Ok((table.as_str(), association.as_str())),
        _ => Err(OrmError::Relation("Many-to-many relation without join keys".to_string())),
    }
}

/// Read one column of the owner instance
fn owner_value(owner: &SchemaInfo, values: &JsonValue, column: &str) -> OrmResult<DatabaseValue> {
    values
        .get(column)
        .cloned()
        .map(DatabaseValue::from_json)
        .ok_or_else(|| OrmError::MissingSchema {
            entity: owner.entity.clone(),
            detail: format!("instance has no value for key column '{}'", column),
        })
}
