//! Entity trait and per-instance relation slots

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{OrmError, OrmResult};
use crate::relationships::RelationDirective;

/// Name of a declared relation.
///
/// Entity types usually implement this on a field-less enum so relation
/// access is checked at compile time.
pub trait RelationName: Copy + fmt::Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;
}

/// Relation enum for entity types that declare no relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoRelations {}

impl RelationName for NoRelations {
    fn name(&self) -> &'static str {
        match *self {}
    }
}

/// A record type mapped to one table.
///
/// Rows are hydrated through serde: every selected column is offered as a
/// JSON field, so the struct's field names (or serde renames) must match
/// the column names. The [`RelationSlots`] field should be marked
/// `#[serde(skip)]`.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Relation names this type declares
    type Relation: RelationName;

    /// Type name used for naming conventions and cache keys.
    ///
    /// Defaults to the last path segment of the Rust type name.
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Explicit table name, overriding the naming convention
    fn table_name() -> Option<&'static str> {
        None
    }

    /// Relation directives, in declaration order
    fn relations() -> Vec<RelationDirective> {
        Vec::new()
    }

    fn relation_slots(&self) -> &RelationSlots;

    fn relation_slots_mut(&mut self) -> &mut RelationSlots;
}

/// Loaded value of a relation
#[derive(Debug, Clone, PartialEq)]
pub enum Related<R> {
    /// One-to-one and many-to-one relations
    One(Option<R>),
    /// One-to-many and many-to-many relations
    Many(Vec<R>),
}

impl<R> Related<R> {
    /// The single related entity, if this is a single-valued relation
    pub fn as_one(&self) -> Option<&R> {
        match self {
            Related::One(value) => value.as_ref(),
            Related::Many(_) => None,
        }
    }

    /// All related entities
    pub fn as_slice(&self) -> &[R] {
        match self {
            Related::One(Some(value)) => std::slice::from_ref(value),
            Related::One(None) => &[],
            Related::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn into_vec(self) -> Vec<R> {
        match self {
            Related::One(value) => value.into_iter().collect(),
            Related::Many(values) => values,
        }
    }
}

/// Observable state of one relation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

#[derive(Clone)]
enum Slot {
    Resolving,
    Resolved(Arc<dyn Any + Send + Sync>),
    Failed(OrmError),
}

/// Memoized relation values of one entity instance.
///
/// Each slot moves `Unresolved -> Resolving -> Resolved | Failed`. A failed
/// slot keeps its error and hands it back on every access; nothing retries
/// it short of [`RelationSlots::reset`].
#[derive(Clone, Default)]
pub struct RelationSlots {
    slots: HashMap<String, Slot>,
}

impl RelationSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, relation: &str) -> RelationState {
        match self.slots.get(relation) {
            None => RelationState::Unresolved,
            Some(Slot::Resolving) => RelationState::Resolving,
            Some(Slot::Resolved(_)) => RelationState::Resolved,
            Some(Slot::Failed(_)) => RelationState::Failed,
        }
    }

    pub fn is_resolved(&self, relation: &str) -> bool {
        self.state(relation) == RelationState::Resolved
    }

    /// Loaded value of a relation.
    ///
    /// `None` while unresolved or resolving; the stored error for a failed
    /// slot; a relation error if the slot holds another target type.
    pub fn get<R: 'static>(&self, relation: &str) -> Option<OrmResult<&Related<R>>> {
        match self.slots.get(relation)? {
            Slot::Resolving => None,
            Slot::Failed(err) => Some(Err(err.clone())),
            Slot::Resolved(value) => Some(value.downcast_ref::<Related<R>>().ok_or_else(|| {
                OrmError::Relation(format!(
                    "Relation '{}' does not hold {}",
                    relation,
                    std::any::type_name::<R>()
                ))
            })),
        }
    }

    /// Store a value without querying
    pub fn preload<R: Send + Sync + 'static>(&mut self, relation: &str, value: Related<R>) {
        self.slots.insert(relation.to_string(), Slot::Resolved(Arc::new(value)));
    }

    /// Return a slot to `Unresolved`
    pub fn reset(&mut self, relation: &str) {
        self.slots.remove(relation);
    }

    /// Return every slot to `Unresolved`
    pub fn reset_all(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn mark_resolving(&mut self, relation: &str) {
        self.slots.insert(relation.to_string(), Slot::Resolving);
    }

    pub(crate) fn mark_failed(&mut self, relation: &str, err: OrmError) {
        self.slots.insert(relation.to_string(), Slot::Failed(err));
    }

    /// Names and states of every touched slot, sorted by name
    pub fn states(&self) -> Vec<(&str, RelationState)> {
        let mut states: Vec<(&str, RelationState)> =
            self.slots.keys().map(|name| (name.as_str(), self.state(name))).collect();
        states.sort_by(|a, b| a.0.cmp(b.0));
        states
    }
}

impl fmt::Debug for RelationSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.states()).finish()
    }
}

// Slots compare by state only; loaded values are not inspected.
impl PartialEq for RelationSlots {
    fn eq(&self, other: &Self) -> bool {
        self.states() == other.states()
    }
}
