//! Query Conditions
//!
//! Declarative condition trees, the field-token grammar (`"age >="`), and the
//! compiler that turns a tree into a parameterized predicate.

pub mod compiler;
pub mod operators;
pub mod tree;

pub use compiler::{CompiledPredicate, ConditionCompiler};
pub use operators::{parse_field_token, ComparisonOperator, LogicalOperator};
pub use tree::{ConditionTree, ConditionValue};
