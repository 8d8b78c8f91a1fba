//! Migration statistics and the final human-readable summary.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// How many error lines the summary prints before collapsing the rest
/// into a count.
const SUMMARY_ERROR_LIMIT: usize = 20;

/// One recorded failure. `row` is the 1-based index within the table's
/// source row set; 0 marks a table-level failure (whole batch rolled back,
/// sequence repair, unreadable table).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowError {
    pub table: String,
    pub row: usize,
    pub message: String,
}

/// Mutable aggregate owned by the orchestrator for the duration of a run.
#[derive(Debug, Default, Serialize)]
pub struct MigrationStats {
    /// Tables processed (including skipped and failed ones).
    pub tables_migrated: usize,

    /// Rows the destination actually persisted across all tables.
    pub rows_written: u64,

    /// Rows persisted per table, in plan order of first write.
    pub table_rows: BTreeMap<String, u64>,

    /// Ordered list of non-fatal errors.
    pub errors: Vec<RowError>,

    /// Rows dropped per table because a value failed to convert.
    pub skipped_rows: BTreeMap<String, u64>,

    /// Tables absent from the source. Reported, but not errors: the run's
    /// exit code stays clean when a table simply never existed.
    pub missing_tables: Vec<String>,
}

impl MigrationStats {
    /// Record a row-level conversion failure. The row is dropped; the
    /// table's migration continues.
    pub fn add_row_error(&mut self, table: &str, row: usize, message: impl Into<String>) {
        self.errors.push(RowError {
            table: table.to_string(),
            row,
            message: message.into(),
        });
        *self.skipped_rows.entry(table.to_string()).or_insert(0) += 1;
    }

    /// Record a table-level failure (batch insert rolled back, table
    /// unreadable, sequence unrepairable).
    pub fn add_table_error(&mut self, table: &str, message: impl Into<String>) {
        self.errors.push(RowError {
            table: table.to_string(),
            row: 0,
            message: message.into(),
        });
    }

    /// Record a table that does not exist in the source.
    pub fn add_missing_table(&mut self, table: &str) {
        self.missing_tables.push(table.to_string());
    }

    /// Record rows persisted for a table.
    pub fn add_written(&mut self, table: &str, rows: u64) {
        self.rows_written += rows;
        *self.table_rows.entry(table.to_string()).or_insert(0) += rows;
    }

    /// The run succeeded when no errors were accumulated.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Render the end-of-run summary block.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "MIGRATION SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Tables migrated: {}", self.tables_migrated);
        let _ = writeln!(out, "Total rows migrated: {}", self.rows_written);

        if !self.missing_tables.is_empty() {
            let _ = writeln!(
                out,
                "Tables not found in source: {}",
                self.missing_tables.join(", ")
            );
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "Errors encountered: {}", self.errors.len());
            let _ = writeln!(out, "\nError details:");
            for error in self.errors.iter().take(SUMMARY_ERROR_LIMIT) {
                if error.row == 0 {
                    let _ = writeln!(out, "  {}: {}", error.table, error.message);
                } else {
                    let _ = writeln!(out, "  {} row {}: {}", error.table, error.row, error.message);
                }
            }
            if self.errors.len() > SUMMARY_ERROR_LIMIT {
                let _ = writeln!(
                    out,
                    "  ... and {} more errors",
                    self.errors.len() - SUMMARY_ERROR_LIMIT
                );
            }
        }

        if !self.skipped_rows.is_empty() {
            let _ = writeln!(out, "\nSkipped rows by table:");
            for (table, count) in &self.skipped_rows {
                let _ = writeln!(out, "  {}: {}", table, count);
            }
        }

        let _ = writeln!(out, "{}", rule);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_errors_increment_skip_counts() {
        let mut stats = MigrationStats::default();
        stats.add_row_error("users", 3, "bad value");
        stats.add_row_error("users", 7, "bad value");
        stats.add_row_error("audit_logs", 1, "bad value");

        assert_eq!(stats.skipped_rows["users"], 2);
        assert_eq!(stats.skipped_rows["audit_logs"], 1);
        assert_eq!(stats.errors.len(), 3);
        assert!(!stats.is_success());
    }

    #[test]
    fn table_errors_do_not_count_as_skipped_rows() {
        let mut stats = MigrationStats::default();
        stats.add_table_error("users", "batch insert failed");
        assert!(stats.skipped_rows.is_empty());
        assert_eq!(stats.errors[0].row, 0);
    }

    #[test]
    fn missing_tables_leave_the_run_successful() {
        let mut stats = MigrationStats::default();
        stats.add_missing_table("legacy_table");
        assert!(stats.is_success());
        assert!(stats.render_summary().contains("legacy_table"));
    }

    #[test]
    fn summary_truncates_long_error_lists() {
        let mut stats = MigrationStats::default();
        for i in 1..=25 {
            stats.add_row_error("users", i, "boom");
        }

        let summary = stats.render_summary();
        assert!(summary.contains("Errors encountered: 25"));
        assert!(summary.contains("... and 5 more errors"));
    }

    #[test]
    fn summary_reports_rows_and_tables() {
        let mut stats = MigrationStats::default();
        stats.tables_migrated = 2;
        stats.add_written("users", 10);
        stats.add_written("audit_logs", 5);

        let summary = stats.render_summary();
        assert!(summary.contains("Tables migrated: 2"));
        assert!(summary.contains("Total rows migrated: 15"));
    }
}
