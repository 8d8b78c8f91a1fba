//! SQLite to PostgreSQL data migration library.
//!
//! One-shot bulk transfer of relational data from a SQLite file into an
//! already-provisioned PostgreSQL schema. The table order and per-column
//! type conversions come from an explicit [`MigrationPlan`]; the
//! [`Orchestrator`] drives the run and accumulates per-row failures
//! instead of aborting, so one bad row or table never blocks the rest.
//!
//! # Example
//!
//! ```no_run
//! use sqlite_pg_migrate::{Config, MigrationPlan, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::from_parts("data/unified.db", None)?;
//!     let plan = MigrationPlan::builtin();
//!
//!     let mut orchestrator = Orchestrator::connect(&config, plan).await?;
//!     let report = orchestrator.run().await?;
//!
//!     print!("{}", report.stats.render_summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod source;
pub mod stats;
pub mod target;

pub use config::{Config, SourceConfig, TargetConfig};
pub use convert::{ConvertError, Rule, ValueConverter};
pub use error::{MigrateError, Result};
pub use orchestrator::{CountCheck, MigrationReport, Orchestrator};
pub use plan::MigrationPlan;
pub use source::{SourceStore, SqliteSource};
pub use stats::{MigrationStats, RowError};
pub use target::{PgTarget, ReplicationRole, SqlValue, TargetStore};
