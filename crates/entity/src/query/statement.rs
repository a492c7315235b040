//! Statement generation - renders descriptors and write requests into SQL
//! with positional `?` placeholders.

use crate::backends::{DatabaseValue, FieldValues};
use crate::conditions::{ConditionCompiler, ConditionTree};
use crate::error::{OrmError, OrmResult};
use super::descriptor::QueryDescriptor;

/// A ready-to-execute statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<DatabaseValue>,
}

impl Statement {
    /// Raw statement
    pub fn new(sql: impl Into<String>, values: Vec<DatabaseValue>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Build SELECT SQL from a descriptor
    pub fn select(query: &QueryDescriptor) -> OrmResult<Self> {
        let table = query.table_name()?;
        let mut sql = String::new();

        if query.distinct {
            sql.push_str("SELECT DISTINCT ");
        } else {
            sql.push_str("SELECT ");
        }

        if query.fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&query.fields.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(table);

        Self::finish_select(sql, query)
    }

    /// Build `SELECT COUNT(*)` over the descriptor's table, joins and conditions
    pub fn count(query: &QueryDescriptor) -> OrmResult<Self> {
        let table = query.table_name()?;
        let sql = format!("SELECT COUNT(*) AS count FROM {}", table);

        let counting = QueryDescriptor {
            order: Vec::new(),
            limit: None,
            offset: None,
            ..query.clone()
        };
        Self::finish_select(sql, &counting)
    }

    fn finish_select(mut sql: String, query: &QueryDescriptor) -> OrmResult<Self> {
        let compiler = ConditionCompiler::new();
        let mut values = Vec::new();

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&join.join_type.to_string());
            sql.push(' ');
            sql.push_str(&join.table);
            if !join.on_conditions.is_empty() {
                sql.push_str(" ON ");
                let on = join
                    .on_conditions
                    .iter()
                    .map(|(left, right)| format!("{} = {}", left, right))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                sql.push_str(&on);
            }
        }

        let predicate = compiler.compile_into(&query.conditions, &mut values)?;
        if !predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }

        if !query.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&query.group_by.join(", "));
        }

        let having = compiler.compile_into(&query.having, &mut values)?;
        if !having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        if !query.order.is_empty() {
            sql.push_str(" ORDER BY ");
            let order = query
                .order
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&order);
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok(Self { sql, values })
    }

    /// Build INSERT SQL. Null values are written as `NULL` literals so the
    /// backend types them from the target column.
    pub fn insert(table: &str, fields: &FieldValues) -> OrmResult<Self> {
        if fields.is_empty() {
            return Ok(Self::new(format!("INSERT INTO {} DEFAULT VALUES", table), Vec::new()));
        }

        let mut values = Vec::with_capacity(fields.len());
        let columns = fields.keys().cloned().collect::<Vec<_>>().join(", ");
        let placeholders = fields
            .values()
            .map(|value| value_slot(value, &mut values))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self::new(
            format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders),
            values,
        ))
    }

    /// Build UPDATE SQL; SET values are bound before WHERE values
    pub fn update(table: &str, fields: &FieldValues, conditions: &ConditionTree) -> OrmResult<Self> {
        if fields.is_empty() {
            return Err(OrmError::Query(format!("Update of '{}' has no fields to set", table)));
        }

        let mut values: Vec<DatabaseValue> = Vec::with_capacity(fields.len());
        let assignments = fields
            .iter()
            .map(|(column, value)| format!("{} = {}", column, value_slot(value, &mut values)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("UPDATE {} SET {}", table, assignments);
        let predicate = ConditionCompiler::new().compile_into(conditions, &mut values)?;
        if !predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }

        Ok(Self { sql, values })
    }

    /// Build DELETE SQL
    pub fn delete(table: &str, conditions: &ConditionTree) -> OrmResult<Self> {
        let compiled = ConditionCompiler::new().compile(conditions)?;
        let mut sql = format!("DELETE FROM {}", table);
        if !compiled.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&compiled.sql);
        }

        Ok(Self {
            sql,
            values: compiled.values,
        })
    }
}

/// Placeholder for a written value, binding it unless it is null
fn value_slot(value: &DatabaseValue, values: &mut Vec<DatabaseValue>) -> &'static str {
    if value.is_null() {
        "NULL"
    } else {
        values.push(value.clone());
        "?"
    }
}
