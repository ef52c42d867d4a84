// ABOUTME: Repair command: copies every table into a fresh database with JSON columns unwrapped
// ABOUTME: Validates paths, migrates tables in order and optionally runs the integrity pass

use crate::config::RepairConfig;
use crate::migration::{migrate_table, verify_table, IntegrityReport, TableMigrationStats};
use crate::sqlite::reader::list_tables;
use crate::sqlite::{
    create_destination, open_source, validate_destination_path, validate_source_path,
};
use crate::utils::validate_input_output_different;
use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// What a completed repair run did
#[derive(Debug, Clone, Default)]
pub struct RepairSummary {
    pub tables: Vec<TableMigrationStats>,
    /// Present when the integrity pass ran
    pub integrity: Option<IntegrityReport>,
}

impl RepairSummary {
    pub fn rows_copied(&self) -> usize {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    pub fn values_rewritten(&self) -> usize {
        self.tables.iter().map(|t| t.values_rewritten).sum()
    }
}

/// Repair the database at `input` into a new database at `output`
///
/// Usage problems (empty paths, identical paths, missing input, existing
/// output) are reported before any database is opened. Every user table is
/// then migrated in creation order; the first error stops the run.
///
/// When `config.check_integrity` is set every table is verified afterwards.
/// Verification stops at the first issue unless `config.keep_going` is set,
/// in which case all issues are collected and reported together.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_json_repair::commands::repair;
/// # use sqlite_json_repair::config::RepairConfig;
/// # fn example() -> anyhow::Result<()> {
/// let config = RepairConfig::default().with_check_integrity(true);
/// let summary = repair("broken.db", "fixed.db", &config)?;
/// println!("{} values rewritten", summary.values_rewritten());
/// # Ok(())
/// # }
/// ```
pub fn repair(input: &str, output: &str, config: &RepairConfig) -> Result<RepairSummary> {
    if input.is_empty() {
        bail!("Missing input");
    }
    if output.is_empty() {
        bail!("Missing output");
    }
    validate_input_output_different(input, output)?;
    let input_path = validate_source_path(input)?;
    let output_path = validate_destination_path(output)?;

    let source = open_source(&input_path)?;
    let mut destination = create_destination(&output_path, config.busy_timeout)?;

    tracing::info!("Getting tables");
    let tables = list_tables(&source)?;

    let mut summary = RepairSummary::default();
    for table in &tables {
        let stats = migrate_table(
            &source,
            &mut destination,
            table,
            &config.columns_for(table),
            config.show_progress,
        )?;
        summary.tables.push(stats);
    }

    tracing::info!(
        "Done! {} tables, {} rows copied, {} json values rewritten",
        summary.tables.len(),
        summary.rows_copied(),
        summary.values_rewritten()
    );

    if config.check_integrity {
        let report = check_integrity(&source, &destination, &tables, config)?;
        tracing::info!("{}", report.summary());
        summary.integrity = Some(report);
    }

    source
        .close()
        .map_err(|(_, e)| e)
        .context("Failed to close input database")?;
    destination
        .close()
        .map_err(|(_, e)| e)
        .context("Failed to close output database")?;

    Ok(summary)
}

fn check_integrity(
    source: &Connection,
    destination: &Connection,
    tables: &[String],
    config: &RepairConfig,
) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    for table in tables {
        let verification = verify_table(
            source,
            destination,
            table,
            &config.columns_for(table),
            !config.keep_going,
        )?;
        report.tables.push(verification);
    }

    if !report.is_clean() {
        let details = report
            .issues()
            .map(|issue| format!("  - {}", issue))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("{}\n{}", report.summary(), details);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn seed(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"CREATE TABLE a (ID TEXT PRIMARY KEY, json TEXT);
            INSERT INTO a VALUES ('1', '"\"5\""');
            CREATE TABLE b (ID INTEGER PRIMARY KEY AUTOINCREMENT, json TEXT, tag TEXT);
            INSERT INTO b (json, tag) VALUES ('"[1]"', 'x');"#,
        )
        .unwrap();
    }

    #[test]
    fn test_repair_rejects_same_path_before_opening() {
        let err = repair("same.db", "same.db", &RepairConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Output cannot be the same as input");
        assert!(!Path::new("same.db").exists());
    }

    #[test]
    fn test_repair_rejects_missing_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("missing.db");
        let output = temp_dir.path().join("out.db");

        let err = repair(
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            &RepairConfig::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("file doesn't exist"));
        assert!(!output.exists());
    }

    #[test]
    fn test_repair_rejects_empty_paths() {
        let err = repair("", "out.db", &RepairConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing input");
        let err = repair("in.db", "", &RepairConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing output");
    }

    #[test]
    fn test_repair_all_tables_with_integrity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("in.db");
        let output = temp_dir.path().join("out.db");
        seed(&input);

        let config = RepairConfig::default().with_check_integrity(true);
        let summary = repair(
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            &config,
        )
        .unwrap();

        let names: Vec<&str> = summary.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(summary.rows_copied(), 2);
        assert_eq!(summary.values_rewritten(), 2);
        assert!(summary.integrity.unwrap().is_clean());

        let conn = Connection::open(&output).unwrap();
        let json: String = conn
            .query_row("SELECT json FROM a WHERE ID = '1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(json, "5");
        // sqlite_sequence is recreated by the engine, never copied
        let sequences: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'sqlite_sequence'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(sequences, 1);
    }

    #[test]
    fn test_integrity_report_lists_every_issue_when_keep_going() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = Connection::open(temp_dir.path().join("in.db")).unwrap();
        let destination = Connection::open(temp_dir.path().join("out.db")).unwrap();
        source
            .execute_batch(
                "CREATE TABLE a (ID TEXT, json TEXT);
                 INSERT INTO a VALUES ('x', '1'), ('y', '2');",
            )
            .unwrap();
        destination
            .execute_batch("CREATE TABLE a (ID TEXT, json TEXT);")
            .unwrap();

        let config = RepairConfig::default().with_keep_going(true);
        let err = check_integrity(&source, &destination, &["a".to_string()], &config)
            .unwrap_err()
            .to_string();

        assert!(err.starts_with("Integrity check failed"), "{}", err);
        assert!(err.contains("Row with ID x is missing"), "{}", err);
        assert!(err.contains("Row with ID y is missing"), "{}", err);
        assert!(err.contains("2 rows in the source but 0"), "{}", err);
    }
}
