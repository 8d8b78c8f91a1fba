//! Per-column value conversion between the SQLite and PostgreSQL type systems.
//!
//! Which conversion applies is decided by the static rule set in the
//! [`MigrationPlan`](crate::plan::MigrationPlan), never by inspecting the
//! runtime value: SQLite columns are dynamically typed, so the same column can
//! hold integers in one row and text in the next, and schema-driven dispatch
//! is the only way to keep the mapping deterministic.

use crate::plan::MigrationPlan;
use crate::target::SqlValue;
use rusqlite::types::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Conversion rule for a (table, column) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// SQLite INTEGER 0/1 (or any truthy value) to BOOLEAN.
    Boolean,
    /// SQLite TEXT holding JSON to JSONB.
    Json,
    /// SQLite DATETIME text to TIMESTAMPTZ.
    Timestamp,
    /// Value carried over unchanged.
    Passthrough,
}

/// A single value could not be converted; the owning row is dropped.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("column {column}: cannot convert binary value to {target}")]
    Binary {
        column: String,
        target: &'static str,
    },
}

/// Stateless converter, built once from the plan's rule sets.
pub struct ValueConverter {
    rules: HashMap<String, HashMap<String, Rule>>,
}

impl ValueConverter {
    pub fn new(plan: &MigrationPlan) -> Self {
        let mut rules: HashMap<String, HashMap<String, Rule>> = HashMap::new();

        let mut insert = |map: &std::collections::BTreeMap<String, Vec<String>>, rule: Rule| {
            for (table, columns) in map {
                let entry = rules.entry(table.clone()).or_default();
                for column in columns {
                    entry.insert(column.clone(), rule);
                }
            }
        };

        insert(&plan.boolean_columns, Rule::Boolean);
        insert(&plan.json_columns, Rule::Json);
        insert(&plan.timestamp_columns, Rule::Timestamp);

        ValueConverter { rules }
    }

    /// Look up the rule for a column. Columns absent from every rule set
    /// pass through unchanged.
    pub fn rule_for(&self, table: &str, column: &str) -> Rule {
        self.rules
            .get(table)
            .and_then(|columns| columns.get(column))
            .copied()
            .unwrap_or(Rule::Passthrough)
    }

    /// Convert a single value. NULL passes through as NULL under every rule.
    pub fn convert(
        &self,
        table: &str,
        column: &str,
        value: Value,
    ) -> Result<SqlValue, ConvertError> {
        if matches!(value, Value::Null) {
            return Ok(SqlValue::Null);
        }

        match self.rule_for(table, column) {
            Rule::Boolean => Ok(SqlValue::Bool(truthy(&value))),
            Rule::Json => convert_json(column, value),
            Rule::Timestamp => convert_timestamp(column, value),
            Rule::Passthrough => Ok(passthrough(value)),
        }
    }

    /// Convert a whole row positionally. Fails on the first bad column;
    /// the caller records the error and moves on to the next row.
    pub fn convert_row(
        &self,
        table: &str,
        columns: &[String],
        row: Vec<Value>,
    ) -> Result<Vec<SqlValue>, ConvertError> {
        columns
            .iter()
            .zip(row)
            .map(|(column, value)| self.convert(table, column, value))
            .collect()
    }
}

/// Two-state truthiness: zero/empty is false, anything else true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Integer(n) => *n != 0,
        Value::Real(f) => *f != 0.0,
        Value::Text(s) => !s.is_empty(),
        Value::Blob(b) => !b.is_empty(),
    }
}

/// Textual JSON is parsed and re-serialized canonically. Malformed text
/// becomes NULL: an intentional lossy fallback inherited from the system
/// being migrated, not a row error. Numeric values are already structured
/// and serialize directly.
fn convert_json(column: &str, value: Value) -> Result<SqlValue, ConvertError> {
    match value {
        Value::Text(s) => match serde_json::from_str::<serde_json::Value>(&s) {
            Ok(parsed) => Ok(SqlValue::Json(parsed)),
            Err(_) => Ok(SqlValue::Null),
        },
        Value::Integer(n) => Ok(SqlValue::Json(serde_json::Value::from(n))),
        Value::Real(f) => Ok(SqlValue::Json(serde_json::Value::from(f))),
        Value::Blob(_) => Err(ConvertError::Binary {
            column: column.to_string(),
            target: "json",
        }),
        Value::Null => Ok(SqlValue::Null),
    }
}

/// SQLite stores datetimes as text ("2024-01-30 15:21:00"), which PostgreSQL
/// accepts directly; numeric values are carried over as their text form.
fn convert_timestamp(column: &str, value: Value) -> Result<SqlValue, ConvertError> {
    match value {
        Value::Text(s) => Ok(SqlValue::Timestamp(s)),
        Value::Integer(n) => Ok(SqlValue::Timestamp(n.to_string())),
        Value::Real(f) => Ok(SqlValue::Timestamp(f.to_string())),
        Value::Blob(_) => Err(ConvertError::Binary {
            column: column.to_string(),
            target: "timestamp",
        }),
        Value::Null => Ok(SqlValue::Null),
    }
}

fn passthrough(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(n) => SqlValue::I64(n),
        Value::Real(f) => SqlValue::F64(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Bytes(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn converter() -> ValueConverter {
        let plan: MigrationPlan = serde_yaml::from_str(
            r#"
table_order: [users, sessions]
boolean_columns:
  users: [is_active]
json_columns:
  sessions: [metadata]
timestamp_columns:
  users: [created_at]
"#,
        )
        .unwrap();
        ValueConverter::new(&plan)
    }

    #[test]
    fn boolean_truthiness() {
        let c = converter();
        let cases = [
            (Value::Integer(0), SqlValue::Bool(false)),
            (Value::Integer(1), SqlValue::Bool(true)),
            (Value::Null, SqlValue::Null),
            (Value::Text("".into()), SqlValue::Bool(false)),
            (Value::Text("x".into()), SqlValue::Bool(true)),
        ];
        for (input, expected) in cases {
            assert_eq!(c.convert("users", "is_active", input).unwrap(), expected);
        }
    }

    #[test]
    fn null_passes_through_under_every_rule() {
        let c = converter();
        for (table, column) in [
            ("users", "is_active"),
            ("sessions", "metadata"),
            ("users", "created_at"),
            ("users", "name"),
        ] {
            assert_eq!(c.convert(table, column, Value::Null).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn json_text_reserializes_canonically() {
        let c = converter();
        let raw = Value::Text(r#" {"b": 2,  "a": [1, null]} "#.into());
        let converted = c.convert("sessions", "metadata", raw).unwrap();
        assert_eq!(converted, SqlValue::Json(json!({"a": [1, null], "b": 2})));
    }

    #[test]
    fn malformed_json_becomes_null_not_an_error() {
        let c = converter();
        let raw = Value::Text("{not json".into());
        assert_eq!(c.convert("sessions", "metadata", raw).unwrap(), SqlValue::Null);
    }

    #[test]
    fn numeric_json_serializes_without_parsing() {
        let c = converter();
        assert_eq!(
            c.convert("sessions", "metadata", Value::Integer(7)).unwrap(),
            SqlValue::Json(json!(7))
        );
    }

    #[test]
    fn blob_in_json_column_is_a_row_error() {
        let c = converter();
        let err = c
            .convert("sessions", "metadata", Value::Blob(vec![0xde, 0xad]))
            .unwrap_err();
        assert!(err.to_string().contains("metadata"));
    }

    #[test]
    fn timestamp_text_passes_through_verbatim() {
        let c = converter();
        let raw = Value::Text("2024-01-30 15:21:00".into());
        assert_eq!(
            c.convert("users", "created_at", raw).unwrap(),
            SqlValue::Timestamp("2024-01-30 15:21:00".into())
        );
    }

    #[test]
    fn unruled_column_passes_through() {
        let c = converter();
        assert_eq!(
            c.convert("users", "name", Value::Text("ada".into())).unwrap(),
            SqlValue::Text("ada".into())
        );
        assert_eq!(
            c.convert("users", "age", Value::Integer(37)).unwrap(),
            SqlValue::I64(37)
        );
    }

    #[test]
    fn convert_row_applies_rules_positionally() {
        let c = converter();
        let columns: Vec<String> = ["id", "is_active", "created_at"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = vec![
            Value::Integer(1),
            Value::Integer(1),
            Value::Text("2024-01-01 00:00:00".into()),
        ];
        let converted = c.convert_row("users", &columns, row).unwrap();
        assert_eq!(
            converted,
            vec![
                SqlValue::I64(1),
                SqlValue::Bool(true),
                SqlValue::Timestamp("2024-01-01 00:00:00".into()),
            ]
        );
    }
}
