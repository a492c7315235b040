//! Condition operators and field-token parsing

use std::fmt;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{OrmError, OrmResult};

/// Comparison operators accepted in a field token such as `"age >="`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    /// `!=`, kept apart from `<>` so the emitted SQL matches the input
    BangNotEqual,
    LessThanOrEqual,
    LessThan,
    GreaterThanOrEqual,
    GreaterThan,
    NullSafeEqual,
    Like,
    Regexp,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,
}

impl ComparisonOperator {
    /// SQL token for the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::BangNotEqual => "!=",
            Self::LessThanOrEqual => "<=",
            Self::LessThan => "<",
            Self::GreaterThanOrEqual => ">=",
            Self::GreaterThan => ">",
            Self::NullSafeEqual => "<=>",
            Self::Like => "LIKE",
            Self::Regexp => "REGEXP",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitNot => "~",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }

    /// Parse an operator token, case-insensitive for the word operators
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token.trim().to_uppercase().as_str() {
            "=" => Self::Equal,
            "<>" => Self::NotEqual,
            "!=" => Self::BangNotEqual,
            "<=" => Self::LessThanOrEqual,
            "<" => Self::LessThan,
            ">=" => Self::GreaterThanOrEqual,
            ">" => Self::GreaterThan,
            "<=>" => Self::NullSafeEqual,
            "LIKE" => Self::Like,
            "REGEXP" => Self::Regexp,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "~" => Self::BitNot,
            "<<" => Self::ShiftLeft,
            ">>" => Self::ShiftRight,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operator negates equality
    pub fn is_inequality(&self) -> bool {
        matches!(self, Self::NotEqual | Self::BangNotEqual)
    }
}

impl Default for ComparisonOperator {
    fn default() -> Self {
        Self::Equal
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Logical operators joining condition groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
    Xor,
    Not,
}

impl LogicalOperator {
    /// Uppercase SQL token
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
        }
    }

    /// Recognise a logical key in a condition map (`and`, `OR`, ...)
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "XOR" => Some(Self::Xor),
            "NOT" => Some(Self::Not),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// Longest symbolic operators first so `<=>` wins over `<=` and `=`.
static FIELD_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<field>.+?)(?:\s*(?P<sym><=>|<>|!=|<=|>=|<<|>>|=|<|>|&|\||\^|~)|\s+(?P<word>(?i:LIKE|REGEXP)))?\s*$",
    )
    .expect("field token pattern is valid")
});

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("field name pattern is valid")
});

/// Split a field token into column name and operator.
///
/// `"age >="` yields `("age", >=)`, `"title LIKE"` yields `("title", LIKE)`
/// and a bare `"name"` defaults to `=`.
pub fn parse_field_token(token: &str) -> OrmResult<(String, ComparisonOperator)> {
    let captures = FIELD_TOKEN
        .captures(token)
        .ok_or_else(|| OrmError::Condition(format!("Invalid condition field '{}'", token)))?;

    let field = captures
        .name("field")
        .map(|m| m.as_str().trim())
        .unwrap_or_default();

    if !FIELD_NAME.is_match(field) {
        return Err(OrmError::Condition(format!(
            "Invalid column reference '{}' in condition field '{}'",
            field, token
        )));
    }

    let operator = match captures.name("sym").or_else(|| captures.name("word")) {
        Some(op) => ComparisonOperator::from_token(op.as_str())
            .ok_or_else(|| OrmError::Condition(format!("Unsupported operator '{}'", op.as_str())))?,
        None => ComparisonOperator::Equal,
    };

    Ok((field.to_string(), operator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_field_defaults_to_equal() {
        assert_eq!(
            parse_field_token("name").unwrap(),
            ("name".to_string(), ComparisonOperator::Equal)
        );
    }

    #[test]
    fn test_symbolic_operators() {
        let cases = [
            ("age >=", "age", ComparisonOperator::GreaterThanOrEqual),
            ("age>", "age", ComparisonOperator::GreaterThan),
            ("a <=>", "a", ComparisonOperator::NullSafeEqual),
            ("a <>", "a", ComparisonOperator::NotEqual),
            ("a !=", "a", ComparisonOperator::BangNotEqual),
            ("flags &", "flags", ComparisonOperator::BitAnd),
            ("bits >>", "bits", ComparisonOperator::ShiftRight),
            ("posts.id <", "posts.id", ComparisonOperator::LessThan),
        ];

        for (token, field, op) in cases {
            assert_eq!(parse_field_token(token).unwrap(), (field.to_string(), op), "token {:?}", token);
        }
    }

    #[test]
    fn test_word_operators_need_whitespace() {
        assert_eq!(
            parse_field_token("title like").unwrap(),
            ("title".to_string(), ComparisonOperator::Like)
        );
        assert_eq!(
            parse_field_token("slug REGEXP").unwrap(),
            ("slug".to_string(), ComparisonOperator::Regexp)
        );
        // A column that merely ends in "like" is not split
        assert_eq!(
            parse_field_token("unlike").unwrap(),
            ("unlike".to_string(), ComparisonOperator::Equal)
        );
    }

    #[test]
    fn test_rejects_non_identifier_fields() {
        assert!(parse_field_token("id; DROP TABLE posts").is_err());
        assert!(parse_field_token(">=").is_err());
        assert!(parse_field_token("").is_err());
    }

    #[test]
    fn test_logical_keys() {
        assert_eq!(LogicalOperator::from_key("or"), Some(LogicalOperator::Or));
        assert_eq!(LogicalOperator::from_key("XOR"), Some(LogicalOperator::Xor));
        assert_eq!(LogicalOperator::from_key("title"), None);
    }
}
