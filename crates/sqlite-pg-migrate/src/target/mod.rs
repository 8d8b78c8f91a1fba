//! PostgreSQL target database operations.

use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Rows per INSERT statement. PostgreSQL caps a statement at 65535 bind
/// parameters, so wide tables are split into several statements inside the
/// same per-table transaction.
const MAX_BATCH_ROWS: usize = 1000;

/// Destination value, produced by the row converter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    /// Timestamp kept in its source text form; PostgreSQL parses it on
    /// assignment to the TIMESTAMPTZ column.
    Timestamp(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

/// Session-wide referential-integrity enforcement toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    /// Foreign-key triggers suspended for the session.
    Replica,
    /// Normal enforcement.
    Origin,
}

impl ReplicationRole {
    fn as_sql(self) -> &'static str {
        match self {
            ReplicationRole::Replica => "replica",
            ReplicationRole::Origin => "origin",
        }
    }
}

/// Trait for target database operations.
#[async_trait]
pub trait TargetStore: Send {
    /// Toggle session-scoped referential-integrity enforcement.
    async fn set_replication_role(&mut self, role: ReplicationRole) -> Result<()>;

    /// Insert converted rows with a conflict policy of "skip silently",
    /// wrapped in one transaction: commit on success, rollback on any
    /// failure, never a partial write. Returns the number of rows the
    /// destination actually persisted, which is less than the number
    /// submitted when some rows were already present from a prior run.
    /// An empty row set is a no-op that issues no statement.
    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Advance the sequence behind a generated-key column past the largest
    /// migrated value. Returns the value the sequence was set to, or `None`
    /// when the table is empty or holds no positive key (setval rejects
    /// values below the sequence minimum), leaving the sequence untouched.
    async fn reset_sequence(&mut self, table: &str, column: &str) -> Result<Option<i64>>;

    /// Row count for a table.
    async fn row_count(&mut self, table: &str) -> Result<i64>;
}

/// PostgreSQL target backed by a single exclusively-owned connection.
/// The session replication role is connection-wide state, so no second
/// connection may write while a migration run holds this one.
pub struct PgTarget {
    client: tokio_postgres::Client,
}

impl PgTarget {
    /// Connect to PostgreSQL. Failing here is fatal to the run.
    pub async fn connect(conn_str: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_str, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL");

        Ok(Self { client })
    }
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn set_replication_role(&mut self, role: ReplicationRole) -> Result<()> {
        let sql = format!("SET session_replication_role = '{}'", role.as_sql());
        self.client.simple_query(&sql).await?;
        debug!("Session replication role set to '{}'", role.as_sql());
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.client.transaction().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(MAX_BATCH_ROWS) {
            let (sql, params) = build_insert_sql(table, columns, chunk);
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

            match tx.execute(&sql, &param_refs).await {
                Ok(count) => written += count,
                Err(e) => {
                    tx.rollback().await?;
                    return Err(MigrateError::Target(e));
                }
            }
        }

        tx.commit().await?;
        debug!("Inserted {} rows into {}", written, table);
        Ok(written)
    }

    async fn reset_sequence(&mut self, table: &str, column: &str) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT MAX({})::bigint FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        let row = self.client.query_one(&sql, &[]).await?;
        let max: Option<i64> = row.get(0);

        let max = match max {
            Some(v) if v > 0 => v,
            _ => return Ok(None),
        };

        let sql = format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), $1)",
            escape_literal(&quote_ident(table)),
            escape_literal(column)
        );
        self.client.query_one(&sql, &[&max]).await?;

        debug!("Reset sequence for {}.{} to {}", table, column, max);
        Ok(Some(max))
    }

    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}

/// NULL bind parameter accepted by any column type.
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Cast suffix for a placeholder, chosen from the value the converter
/// produced. Text timestamps go through an explicit text cast so the bind
/// parameter stays textual while the column receives a TIMESTAMPTZ.
fn cast_for_value(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "",
        SqlValue::Bool(_) => "::boolean",
        SqlValue::I64(_) => "::bigint",
        SqlValue::F64(_) => "::double precision",
        SqlValue::Text(_) => "::text",
        SqlValue::Timestamp(_) => "::text::timestamptz",
        SqlValue::Json(_) => "::jsonb",
        SqlValue::Bytes(_) => "::bytea",
    }
}

/// Convert a SqlValue to a boxed bind parameter.
fn param_for_value(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(SqlNull),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I64(n) => Box::new(*n),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Timestamp(s) => Box::new(s.clone()),
        SqlValue::Json(v) => Box::new(v.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
    }
}

/// Build one parameterized multi-row INSERT whose conflict policy is
/// "skip silently", so re-running the migration never errors on or
/// duplicates rows that already exist.
fn build_insert_sql(
    table: &str,
    columns: &[String],
    rows: &[Vec<SqlValue>],
) -> (String, Vec<Box<dyn ToSql + Sync + Send>>) {
    let column_list: String = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut placeholders = Vec::with_capacity(rows.len());
    let mut params: Vec<Box<dyn ToSql + Sync + Send>> =
        Vec::with_capacity(rows.len() * columns.len());
    let mut idx = 1;

    for row in rows {
        let row_placeholders: Vec<String> = row
            .iter()
            .map(|value| {
                let p = format!("${}{}", idx, cast_for_value(value));
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));

        for value in row {
            params.push(param_for_value(value));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
        quote_ident(table),
        column_list,
        placeholders.join(", ")
    );

    (sql, params)
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a string for use inside a SQL literal.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_sql_has_conflict_skip_and_per_value_casts() {
        let columns: Vec<String> = ["id", "is_active", "metadata", "created_at"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![vec![
            SqlValue::I64(1),
            SqlValue::Bool(true),
            SqlValue::Json(json!({"a": 1})),
            SqlValue::Timestamp("2024-01-30 15:21:00".into()),
        ]];

        let (sql, params) = build_insert_sql("users", &columns, &rows);

        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"is_active\", \"metadata\", \"created_at\") \
             VALUES ($1::bigint, $2::boolean, $3::jsonb, $4::text::timestamptz) \
             ON CONFLICT DO NOTHING"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn null_placeholders_carry_no_cast() {
        let columns: Vec<String> = vec!["id".into(), "name".into()];
        let rows = vec![vec![SqlValue::I64(7), SqlValue::Null]];

        let (sql, _) = build_insert_sql("users", &columns, &rows);
        assert!(sql.contains("($1::bigint, $2)"));
    }

    #[test]
    fn placeholder_numbering_spans_rows() {
        let columns: Vec<String> = vec!["id".into(), "name".into()];
        let rows = vec![
            vec![SqlValue::I64(1), SqlValue::Text("a".into())],
            vec![SqlValue::I64(2), SqlValue::Text("b".into())],
        ];

        let (sql, params) = build_insert_sql("t", &columns, &rows);
        assert!(sql.contains("($1::bigint, $2::text), ($3::bigint, $4::text)"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
