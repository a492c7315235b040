//! Query Module - descriptors and statement generation

pub mod descriptor;
pub mod statement;
pub mod types;

pub use descriptor::QueryDescriptor;
pub use statement::Statement;
pub use types::{JoinClause, JoinType, OrderBy, OrderDirection};
