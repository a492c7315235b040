//! Condition trees - the structured input of the condition compiler

use serde_json::Value as JsonValue;

use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};
use super::operators::{parse_field_token, ComparisonOperator, LogicalOperator};

/// Right-hand side of a comparison leaf
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Scalar(DatabaseValue),
    /// Compiles to `IN (...)` regardless of the leaf's operator
    List(Vec<DatabaseValue>),
}

impl From<DatabaseValue> for ConditionValue {
    fn from(value: DatabaseValue) -> Self {
        ConditionValue::Scalar(value)
    }
}

impl<T: Into<DatabaseValue>> From<Vec<T>> for ConditionValue {
    fn from(values: Vec<T>) -> Self {
        ConditionValue::List(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! scalar_condition_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ConditionValue {
                fn from(value: $ty) -> Self {
                    ConditionValue::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_condition_value!(bool, i32, i64, f64, String, &str, uuid::Uuid);

/// Recursive condition structure.
///
/// The shorthand map form (`{"a": 1, "b": [2, 3]}`) parses into [`All`], an
/// implicit conjunction whose plain comparisons are joined without
/// parentheses. Explicit logical nodes parenthesize every child.
///
/// [`All`]: ConditionTree::All
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTree {
    All(Vec<ConditionTree>),
    Logical {
        operator: LogicalOperator,
        children: Vec<ConditionTree>,
    },
    Comparison {
        field: String,
        operator: ComparisonOperator,
        value: ConditionValue,
    },
    /// Pre-formed SQL emitted verbatim. Never build this from untrusted input.
    Raw {
        sql: String,
        values: Vec<DatabaseValue>,
    },
}

impl Default for ConditionTree {
    fn default() -> Self {
        ConditionTree::All(Vec::new())
    }
}

impl ConditionTree {
    /// A tree that matches everything
    pub fn empty() -> Self {
        Self::default()
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        ConditionTree::Comparison {
            field: field.into(),
            operator: ComparisonOperator::Equal,
            value: ConditionValue::Scalar(value.into()),
        }
    }

    /// Comparison with an explicit operator
    pub fn compare(
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<ConditionValue>,
    ) -> Self {
        ConditionTree::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// Comparison from a field token such as `"age >="`
    pub fn field(token: &str, value: impl Into<ConditionValue>) -> OrmResult<Self> {
        let (field, operator) = parse_field_token(token)?;
        Ok(ConditionTree::Comparison {
            field,
            operator,
            value: value.into(),
        })
    }

    /// `field IN (values...)`
    pub fn in_list<V: Into<DatabaseValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        ConditionTree::Comparison {
            field: field.into(),
            operator: ComparisonOperator::Equal,
            value: ConditionValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn and(children: Vec<ConditionTree>) -> Self {
        Self::logical(LogicalOperator::And, children)
    }

    pub fn or(children: Vec<ConditionTree>) -> Self {
        Self::logical(LogicalOperator::Or, children)
    }

    pub fn xor(children: Vec<ConditionTree>) -> Self {
        Self::logical(LogicalOperator::Xor, children)
    }

    pub fn not(child: ConditionTree) -> Self {
        Self::logical(LogicalOperator::Not, vec![child])
    }

    pub fn logical(operator: LogicalOperator, children: Vec<ConditionTree>) -> Self {
        ConditionTree::Logical { operator, children }
    }

    /// Raw SQL fragment with its own bound values
    pub fn raw(sql: impl Into<String>, values: Vec<DatabaseValue>) -> Self {
        ConditionTree::Raw {
            sql: sql.into(),
            values,
        }
    }

    /// Whether the tree contributes no predicate at all
    pub fn is_empty(&self) -> bool {
        match self {
            ConditionTree::All(children) | ConditionTree::Logical { children, .. } => {
                children.iter().all(ConditionTree::is_empty)
            }
            ConditionTree::Comparison { .. } => false,
            ConditionTree::Raw { sql, .. } => sql.trim().is_empty(),
        }
    }

    /// AND-merge another tree into this one, keeping the implicit-conjunction
    /// form so plain comparisons stay unparenthesized.
    pub fn and_also(self, other: ConditionTree) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }

        let mut children = match self {
            ConditionTree::All(children) => children,
            node => vec![node],
        };
        match other {
            ConditionTree::All(more) => children.extend(more),
            node => children.push(node),
        }
        ConditionTree::All(children)
    }

    /// Parse the declarative JSON form.
    ///
    /// - an object is an implicit AND of its entries
    /// - `and` / `or` / `xor` / `not` keys open a logical node whose children
    ///   are the elements of an array value or the entries of an object value
    /// - a numeric key holds a raw fragment (string) or a nested group
    /// - any other key is a field token; an array value becomes `IN (...)`
    pub fn from_json(json: &JsonValue) -> OrmResult<Self> {
        match json {
            JsonValue::Null => Ok(Self::empty()),
            JsonValue::Object(map) => {
                let children = map
                    .iter()
                    .map(|(key, value)| Self::parse_entry(key, value))
                    .collect::<OrmResult<Vec<_>>>()?;
                Ok(ConditionTree::All(children))
            }
            JsonValue::Array(items) => {
                let children = items.iter().map(Self::from_json).collect::<OrmResult<Vec<_>>>()?;
                Ok(ConditionTree::All(children))
            }
            JsonValue::String(sql) => Ok(Self::raw(sql.clone(), Vec::new())),
            other => Err(OrmError::Condition(format!(
                "Expected a condition map, got '{}'",
                other
            ))),
        }
    }

    fn parse_entry(key: &str, value: &JsonValue) -> OrmResult<Self> {
        if let Some(operator) = LogicalOperator::from_key(key) {
            let children = match value {
                JsonValue::Array(items) => items.iter().map(Self::from_json).collect::<OrmResult<Vec<_>>>()?,
                JsonValue::Object(map) => map
                    .iter()
                    .map(|(key, value)| Self::parse_entry(key, value))
                    .collect::<OrmResult<Vec<_>>>()?,
                other => {
                    return Err(OrmError::Condition(format!(
                        "'{}' expects a list or map of conditions, got '{}'",
                        key, other
                    )))
                }
            };
            return Ok(Self::logical(operator, children));
        }

        if key.trim().parse::<usize>().is_ok() {
            return match value {
                JsonValue::String(sql) => Ok(Self::raw(sql.clone(), Vec::new())),
                JsonValue::Array(_) | JsonValue::Object(_) => Self::from_json(value),
                other => Err(OrmError::Condition(format!(
                    "Positional condition '{}' must be SQL text or a nested group, got '{}'",
                    key, other
                ))),
            };
        }

        let value = match value {
            JsonValue::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| match item {
                        JsonValue::Array(_) | JsonValue::Object(_) => Err(OrmError::Condition(format!(
                            "List for '{}' may only contain scalars",
                            key
                        ))),
                        scalar => Ok(DatabaseValue::from_json(scalar.clone())),
                    })
                    .collect::<OrmResult<Vec<_>>>()?;
                ConditionValue::List(values)
            }
            JsonValue::Object(_) => {
                return Err(OrmError::Condition(format!(
                    "Field '{}' cannot be compared against a map",
                    key
                )))
            }
            scalar => ConditionValue::Scalar(DatabaseValue::from_json(scalar.clone())),
        };

        Self::field(key, value)
    }
}

impl TryFrom<JsonValue> for ConditionTree {
    type Error = OrmError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        ConditionTree::from_json(&json)
    }
}

impl TryFrom<&JsonValue> for ConditionTree {
    type Error = OrmError;

    fn try_from(json: &JsonValue) -> Result<Self, Self::Error> {
        ConditionTree::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_parses_to_implicit_conjunction() {
        let tree = ConditionTree::from_json(&json!({"a": 1, "b": [2, 3]})).unwrap();
        assert_eq!(
            tree,
            ConditionTree::All(vec![
                ConditionTree::eq("a", 1),
                ConditionTree::in_list("b", [2, 3]),
            ])
        );
    }

    #[test]
    fn test_logical_key_with_object_children() {
        let tree = ConditionTree::from_json(&json!({"or": {"a": 1, "b >": 2}})).unwrap();
        assert_eq!(
            tree,
            ConditionTree::All(vec![ConditionTree::or(vec![
                ConditionTree::eq("a", 1),
                ConditionTree::compare("b", ComparisonOperator::GreaterThan, 2),
            ])])
        );
    }

    #[test]
    fn test_positional_keys() {
        let tree = ConditionTree::from_json(&json!({"0": "created_at > NOW()", "1": {"a": 1}})).unwrap();
        assert_eq!(
            tree,
            ConditionTree::All(vec![
                ConditionTree::raw("created_at > NOW()", Vec::new()),
                ConditionTree::All(vec![ConditionTree::eq("a", 1)]),
            ])
        );
    }

    #[test]
    fn test_rejects_nested_map_value() {
        assert!(ConditionTree::from_json(&json!({"a": {"b": 1}})).is_err());
        assert!(ConditionTree::from_json(&json!({"a": [[1]]})).is_err());
        assert!(ConditionTree::from_json(&json!(42)).is_err());
    }

    #[test]
    fn test_emptiness() {
        assert!(ConditionTree::empty().is_empty());
        assert!(ConditionTree::from_json(&json!({})).unwrap().is_empty());
        assert!(ConditionTree::from_json(&json!({"or": []})).unwrap().is_empty());
        assert!(!ConditionTree::eq("id", 1).is_empty());
    }

    #[test]
    fn test_and_also_flattens() {
        let merged = ConditionTree::eq("post_id", 5).and_also(ConditionTree::from_json(&json!({"approved": true})).unwrap());
        assert_eq!(
            merged,
            ConditionTree::All(vec![ConditionTree::eq("post_id", 5), ConditionTree::eq("approved", true)])
        );

        let untouched = ConditionTree::eq("post_id", 5).and_also(ConditionTree::empty());
        assert_eq!(untouched, ConditionTree::eq("post_id", 5));
    }
}
