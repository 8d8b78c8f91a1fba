//! Migration orchestrator - main workflow coordinator.
//!
//! Connection failures before the first table are the only fatal errors.
//! Once table migration begins the run is non-aborting: row and table
//! failures are folded into the stats and the run continues, so the
//! referential-integrity session toggle is always restored before the
//! orchestrator returns.

use crate::config::Config;
use crate::convert::ValueConverter;
use crate::error::Result;
use crate::plan::MigrationPlan;
use crate::source::{SourceStore, SqliteSource};
use crate::stats::MigrationStats;
use crate::target::{PgTarget, ReplicationRole, TargetStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Migration orchestrator. Exclusively owns the single source and target
/// connections for the duration of the run; tables are migrated strictly
/// sequentially because the suspended referential checks are session-wide
/// state on the target connection.
pub struct Orchestrator<S, T> {
    plan: MigrationPlan,
    converter: ValueConverter,
    source: S,
    target: T,
}

/// Result of a migration run.
#[derive(Debug, Serialize)]
pub struct MigrationReport {
    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Final status: "completed" or "completed_with_errors".
    pub status: String,

    /// Accumulated per-table and per-row statistics.
    pub stats: MigrationStats,
}

impl MigrationReport {
    /// The run succeeded when the aggregated error list is empty.
    pub fn is_success(&self) -> bool {
        self.stats.is_success()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row-count comparison for one table. A `None` count means the table
/// could not be counted on that side (absent, or the count query failed),
/// which is never a match.
#[derive(Debug, Serialize)]
pub struct CountCheck {
    pub table: String,
    pub source_rows: Option<i64>,
    pub target_rows: Option<i64>,
    pub matches: bool,
}

impl Orchestrator<SqliteSource, PgTarget> {
    /// Open both connections. This is the run's only fatal failure point:
    /// nothing has been written yet, so there is no partial state to clean
    /// up.
    pub async fn connect(config: &Config, plan: MigrationPlan) -> Result<Self> {
        let source = SqliteSource::open(&config.source.path)?;
        let target = PgTarget::connect(&config.target.connection_string()).await?;
        Self::new(plan, source, target)
    }
}

impl<S: SourceStore, T: TargetStore> Orchestrator<S, T> {
    /// Build an orchestrator over already-opened stores.
    pub fn new(plan: MigrationPlan, source: S, target: T) -> Result<Self> {
        plan.validate()?;
        let converter = ValueConverter::new(&plan);
        Ok(Self {
            plan,
            converter,
            source,
            target,
        })
    }

    /// Run the migration: suspend referential checks, migrate every table
    /// in plan order, repair sequences once, restore referential checks.
    pub async fn run(&mut self) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let mut stats = MigrationStats::default();

        info!("Phase 1: suspending referential integrity checks");
        self.target
            .set_replication_role(ReplicationRole::Replica)
            .await?;

        // From here on nothing aborts the run; every failure is recorded
        // and the session role is restored below.
        info!(
            "Phase 2: migrating {} tables",
            self.plan.table_order.len()
        );
        let order = self.plan.table_order.clone();
        for table in &order {
            self.migrate_table(table, &mut stats).await;
            stats.tables_migrated += 1;
        }

        info!("Phase 3: repairing sequences");
        self.repair_sequences(&mut stats).await;

        info!("Phase 4: restoring referential integrity checks");
        self.target
            .set_replication_role(ReplicationRole::Origin)
            .await?;

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let status = if stats.is_success() {
            "completed"
        } else {
            "completed_with_errors"
        };

        info!(
            "Migration {}: {} tables, {} rows in {:.1}s",
            status, stats.tables_migrated, stats.rows_written, duration_seconds
        );

        Ok(MigrationReport {
            started_at,
            completed_at,
            duration_seconds,
            status: status.to_string(),
            stats,
        })
    }

    /// Migrate a single table. Never fails the run: all failures are
    /// recorded in the stats and the next table proceeds regardless.
    async fn migrate_table(&mut self, table: &str, stats: &mut MigrationStats) {
        let columns = match self.source.table_columns(table) {
            Ok(Some(columns)) => columns,
            Ok(None) => {
                warn!("{}: not found in source, skipping", table);
                stats.add_missing_table(table);
                return;
            }
            Err(e) => {
                warn!("{}: failed to read schema - {}", table, e);
                stats.add_table_error(table, format!("failed to read schema: {}", e));
                return;
            }
        };

        let rows = match self.source.read_rows(table) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{}: failed to read rows - {}", table, e);
                stats.add_table_error(table, format!("failed to read rows: {}", e));
                return;
            }
        };

        if rows.is_empty() {
            info!("{}: 0 rows", table);
            return;
        }

        // Convert rows one at a time: a bad row is recorded by its 1-based
        // index and dropped, and conversion continues with the next one.
        let mut converted = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            match self.converter.convert_row(table, &columns, row) {
                Ok(row) => converted.push(row),
                Err(e) => stats.add_row_error(table, i + 1, e.to_string()),
            }
        }

        if converted.is_empty() {
            info!("{}: 0 rows (all skipped due to errors)", table);
            return;
        }

        let submitted = converted.len();
        match self.target.insert_rows(table, &columns, converted).await {
            Ok(written) => {
                stats.add_written(table, written);
                if written < submitted as u64 {
                    info!(
                        "{}: {} rows migrated ({} already present)",
                        table,
                        written,
                        submitted as u64 - written
                    );
                } else {
                    info!("{}: {} rows migrated", table, written);
                }
            }
            Err(e) => {
                warn!("{}: batch insert failed - {}", table, e);
                stats.add_table_error(table, format!("batch insert failed: {}", e));
            }
        }
    }

    /// Repair the sequence behind each destination-generated key. A failed
    /// repair is recorded and the remaining repairs continue.
    async fn repair_sequences(&mut self, stats: &mut MigrationStats) {
        let serial = self.plan.serial_columns.clone();
        for (table, column) in &serial {
            match self.target.reset_sequence(table, column).await {
                Ok(Some(value)) => info!("{}: sequence reset to {}", table, value),
                Ok(None) => info!("{}: empty, sequence left untouched", table),
                Err(e) => {
                    warn!("{}: could not reset sequence - {}", table, e);
                    stats.add_table_error(table, format!("sequence repair failed: {}", e));
                }
            }
        }
    }

    /// Compare source and target row counts per plan table.
    pub async fn validate(&mut self) -> Result<Vec<CountCheck>> {
        let order = self.plan.table_order.clone();
        let mut checks = Vec::with_capacity(order.len());

        for table in &order {
            let source_rows = self.source.row_count(table)?;
            let target_rows = match self.target.row_count(table).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!("{}: could not count target rows - {}", table, e);
                    None
                }
            };
            let matches = source_rows.is_some() && source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, target_rows.unwrap_or(0));
            } else {
                warn!(
                    "{}: source={:?} target={:?} (MISMATCH)",
                    table, source_rows, target_rows
                );
            }

            checks.push(CountCheck {
                table: table.clone(),
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(checks)
    }
}
