//! Query Descriptor - full structured description of one read operation

use crate::conditions::ConditionTree;
use crate::error::{OrmError, OrmResult};
use super::types::{JoinClause, JoinType, OrderBy, OrderDirection};

/// Structured description of a select.
///
/// Built fresh per operation. The entity manager fills in `table` from the
/// schema cache when it is left unset; nothing else is touched once the
/// descriptor has been handed over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub table: Option<String>,
    pub fields: Vec<String>,
    pub distinct: bool,
    pub conditions: ConditionTree,
    pub joins: Vec<JoinClause>,
    pub group_by: Vec<String>,
    pub having: ConditionTree,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryDescriptor {
    /// Create an empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor targeting an explicit table
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    /// Set the table
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Select specific columns instead of `*`
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Add DISTINCT to the select
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Replace the WHERE conditions
    pub fn conditions(mut self, conditions: ConditionTree) -> Self {
        self.conditions = conditions;
        self
    }

    /// AND another condition tree onto the WHERE conditions
    pub fn and_where(mut self, conditions: ConditionTree) -> Self {
        self.conditions = std::mem::take(&mut self.conditions).and_also(conditions);
        self
    }

    /// Replace the WHERE conditions from the JSON map form
    pub fn filter(self, conditions: serde_json::Value) -> OrmResult<Self> {
        let tree = ConditionTree::try_from(conditions)?;
        Ok(self.conditions(tree))
    }

    /// Add a join clause
    pub fn join(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    /// `INNER JOIN table ON left = right`
    pub fn inner_join(self, table: &str, left: &str, right: &str) -> Self {
        self.join(JoinClause::new(JoinType::Inner, table).on(left, right))
    }

    /// `LEFT JOIN table ON left = right`
    pub fn left_join(self, table: &str, left: &str, right: &str) -> Self {
        self.join(JoinClause::new(JoinType::Left, table).on(left, right))
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn having(mut self, conditions: ConditionTree) -> Self {
        self.having = conditions;
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn order_asc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Asc)
    }

    pub fn order_desc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The table this descriptor targets
    pub fn table_name(&self) -> OrmResult<&str> {
        self.table
            .as_deref()
            .ok_or_else(|| OrmError::Query("Query descriptor has no table".to_string()))
    }
}
