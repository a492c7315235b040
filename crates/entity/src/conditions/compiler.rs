//! Condition compiler - turns a [`ConditionTree`] into a SQL predicate with
//! positional `?` placeholders and the matching bound values.
//!
//! Output is deterministic: the same tree always yields the same text, and
//! the N-th placeholder always corresponds to the N-th bound value.

use crate::backends::DatabaseValue;
use crate::error::OrmResult;
use super::operators::{ComparisonOperator, LogicalOperator};
use super::tree::{ConditionTree, ConditionValue};

/// Predicate text plus bound values in placeholder order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub values: Vec<DatabaseValue>,
}

impl CompiledPredicate {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// A compiled fragment and whether it needs parentheses when conjoined
struct Fragment {
    sql: String,
    compound: bool,
}

/// Stateless compiler for condition trees
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionCompiler;

impl ConditionCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a tree into a predicate. An empty tree yields an empty
    /// predicate, which statement builders render as "no WHERE clause".
    pub fn compile(&self, tree: &ConditionTree) -> OrmResult<CompiledPredicate> {
        let mut values = Vec::new();
        let sql = Self::compile_node(tree, &mut values)?
            .map(|fragment| fragment.sql)
            .unwrap_or_default();
        Ok(CompiledPredicate { sql, values })
    }

    /// Compile into an existing value list, for statements that bind values
    /// ahead of the predicate (e.g. `UPDATE ... SET`).
    pub fn compile_into(&self, tree: &ConditionTree, values: &mut Vec<DatabaseValue>) -> OrmResult<String> {
        Ok(Self::compile_node(tree, values)?
            .map(|fragment| fragment.sql)
            .unwrap_or_default())
    }

    fn compile_node(tree: &ConditionTree, values: &mut Vec<DatabaseValue>) -> OrmResult<Option<Fragment>> {
        match tree {
            ConditionTree::All(children) => {
                let mut fragments = Self::compile_children(children, values)?;
                match fragments.len() {
                    0 => Ok(None),
                    1 => Ok(fragments.pop()),
                    _ => {
                        let sql = fragments
                            .into_iter()
                            .map(|fragment| {
                                if fragment.compound {
                                    format!("({})", fragment.sql)
                                } else {
                                    fragment.sql
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(" AND ");
                        Ok(Some(Fragment { sql, compound: true }))
                    }
                }
            }
            ConditionTree::Logical { operator, children } => {
                let fragments = Self::compile_children(children, values)?;
                if fragments.is_empty() {
                    return Ok(None);
                }

                if *operator == LogicalOperator::Not {
                    let inner = if fragments.len() == 1 {
                        fragments.into_iter().map(|f| f.sql).collect::<String>()
                    } else {
                        Self::join_parenthesized(fragments, LogicalOperator::And)
                    };
                    return Ok(Some(Fragment {
                        sql: format!("NOT ({})", inner),
                        compound: false,
                    }));
                }

                Ok(Some(Fragment {
                    sql: Self::join_parenthesized(fragments, *operator),
                    compound: true,
                }))
            }
            ConditionTree::Comparison { field, operator, value } => {
                Ok(Some(Self::compile_comparison(field, *operator, value, values)))
            }
            ConditionTree::Raw { sql, values: raw_values } => {
                let sql = sql.trim();
                if sql.is_empty() {
                    return Ok(None);
                }
                values.extend(raw_values.iter().cloned());
                // Opaque text may carry its own OR; wrap it when conjoined
                Ok(Some(Fragment {
                    sql: sql.to_string(),
                    compound: true,
                }))
            }
        }
    }

    fn compile_children(children: &[ConditionTree], values: &mut Vec<DatabaseValue>) -> OrmResult<Vec<Fragment>> {
        let mut fragments = Vec::with_capacity(children.len());
        for child in children {
            if let Some(fragment) = Self::compile_node(child, values)? {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    fn join_parenthesized(fragments: Vec<Fragment>, operator: LogicalOperator) -> String {
        fragments
            .into_iter()
            .map(|fragment| format!("({})", fragment.sql))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", operator.as_sql()))
    }

    fn compile_comparison(
        field: &str,
        operator: ComparisonOperator,
        value: &ConditionValue,
        values: &mut Vec<DatabaseValue>,
    ) -> Fragment {
        let sql = match value {
            ConditionValue::List(items) if items.is_empty() => "1 = 0".to_string(),
            ConditionValue::List(items) => {
                values.extend(items.iter().cloned());
                let placeholders = vec!["?"; items.len()].join(", ");
                format!("{} IN ({})", field, placeholders)
            }
            ConditionValue::Scalar(DatabaseValue::Null) if operator == ComparisonOperator::Equal => {
                format!("{} IS NULL", field)
            }
            ConditionValue::Scalar(DatabaseValue::Null) if operator.is_inequality() => {
                format!("{} IS NOT NULL", field)
            }
            ConditionValue::Scalar(scalar) => {
                values.push(scalar.clone());
                format!("{} {} ?", field, operator.as_sql())
            }
        };

        Fragment { sql, compound: false }
    }
}
