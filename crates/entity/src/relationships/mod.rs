//! Relationships - declared relation metadata, the per-type registry and the
//! resolver that plans relation queries.

pub mod metadata;
pub mod registry;
pub mod resolver;

pub use metadata::{RelationDirective, RelationKind, RelationTarget};
pub use registry::{EntityRelations, RelationRegistry};
pub use resolver::{DependentDelete, EffectiveKeys, RelationPlan, RelationResolver};
