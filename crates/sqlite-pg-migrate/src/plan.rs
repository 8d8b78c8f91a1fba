//! Migration plan: table order and per-column conversion rule sets.
//!
//! The plan is explicit configuration, not schema introspection. The table
//! order must list parent tables before any table that references them by
//! foreign key; with referential checks suspended during the load this
//! ordering is the only thing keeping cross-table references consistent.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Immutable migration plan, passed into the orchestrator at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Tables in foreign-key dependency order (parents first).
    pub table_order: Vec<String>,

    /// Columns stored as SQLite INTEGER that map to PostgreSQL BOOLEAN.
    #[serde(default)]
    pub boolean_columns: BTreeMap<String, Vec<String>>,

    /// Columns stored as SQLite TEXT that map to PostgreSQL JSONB.
    #[serde(default)]
    pub json_columns: BTreeMap<String, Vec<String>>,

    /// Columns stored as SQLite DATETIME text that map to TIMESTAMPTZ.
    #[serde(default)]
    pub timestamp_columns: BTreeMap<String, Vec<String>>,

    /// Tables whose primary key is generated by the destination
    /// (SERIAL / IDENTITY), mapped to the key column name. These need a
    /// sequence reset after the bulk load.
    #[serde(default)]
    pub serial_columns: BTreeMap<String, String>,
}

impl MigrationPlan {
    /// Load a plan from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let plan: MigrationPlan = serde_yaml::from_str(&content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Validate internal consistency of the plan.
    pub fn validate(&self) -> Result<()> {
        if self.table_order.is_empty() {
            return Err(MigrateError::Config("plan.table_order is empty".into()));
        }

        let mut seen = BTreeSet::new();
        for table in &self.table_order {
            if !seen.insert(table.as_str()) {
                return Err(MigrateError::Config(format!(
                    "plan.table_order lists '{}' more than once",
                    table
                )));
            }
        }

        let rule_tables = self
            .boolean_columns
            .keys()
            .chain(self.json_columns.keys())
            .chain(self.timestamp_columns.keys())
            .chain(self.serial_columns.keys());

        for table in rule_tables {
            if !seen.contains(table.as_str()) {
                return Err(MigrateError::Config(format!(
                    "plan references table '{}' that is not in table_order",
                    table
                )));
            }
        }

        Ok(())
    }

    /// The production plan for the unified application database.
    pub fn builtin() -> Self {
        let plan = MigrationPlan {
            table_order: [
                "users",
                "conversation_sessions",
                "custom_agents",
                "conversation_messages",
                "agent_usage_logs",
                "agent_feedback",
                "audit_logs",
                "alert_history",
                "user_memories",
                "memory_tags",
                "research_sessions",
                "research_steps",
                "agent_marketplace",
                "agent_reviews",
                "agent_installations",
                "canvas_documents",
                "canvas_versions",
                "external_connections",
                "external_files",
                "api_usage",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),

            boolean_columns: column_map(&[
                ("users", &["is_active"]),
                ("custom_agents", &["enabled"]),
                ("agent_marketplace", &["is_free", "is_featured", "is_verified"]),
                ("alert_history", &["acknowledged"]),
                ("agent_usage_logs", &["success"]),
                ("canvas_documents", &["is_shared"]),
                ("external_connections", &["is_active"]),
            ]),

            json_columns: column_map(&[
                ("conversation_sessions", &["metadata"]),
                ("api_usage", &["models"]),
                ("agent_feedback", &["tags"]),
                ("custom_agents", &["keywords"]),
                ("audit_logs", &["details"]),
                ("alert_history", &["data"]),
                ("agent_marketplace", &["tags"]),
                ("research_sessions", &["key_findings", "sources"]),
                ("research_steps", &["sources"]),
                ("external_connections", &["metadata"]),
            ]),

            timestamp_columns: column_map(&[
                ("users", &["created_at", "updated_at", "last_login"]),
                ("conversation_sessions", &["created_at", "updated_at"]),
                ("conversation_messages", &["created_at"]),
                ("api_usage", &["created_at", "updated_at"]),
                ("agent_usage_logs", &["timestamp"]),
                ("agent_feedback", &["created_at"]),
                ("custom_agents", &["created_at", "updated_at"]),
                ("audit_logs", &["timestamp"]),
                ("alert_history", &["created_at", "acknowledged_at"]),
                (
                    "user_memories",
                    &["last_accessed", "created_at", "updated_at", "expires_at"],
                ),
                (
                    "research_sessions",
                    &["created_at", "updated_at", "completed_at"],
                ),
                ("research_steps", &["created_at"]),
                (
                    "agent_marketplace",
                    &["created_at", "updated_at", "published_at"],
                ),
                ("agent_reviews", &["created_at"]),
                ("agent_installations", &["installed_at"]),
                ("canvas_documents", &["created_at", "updated_at"]),
                ("canvas_versions", &["created_at"]),
                (
                    "external_connections",
                    &["token_expires_at", "created_at", "updated_at"],
                ),
                ("external_files", &["last_synced", "created_at"]),
            ]),

            serial_columns: [
                ("conversation_messages", "id"),
                ("api_usage", "id"),
                ("agent_usage_logs", "id"),
                ("audit_logs", "id"),
                ("alert_history", "id"),
                ("memory_tags", "id"),
                ("research_steps", "id"),
                ("agent_installations", "id"),
                ("canvas_versions", "id"),
            ]
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect(),
        };

        debug_assert!(plan.validate().is_ok());
        plan
    }
}

fn column_map(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(table, columns)| {
            (
                table.to_string(),
                columns.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}
