// ABOUTME: Post-repair integrity checks between the source and output databases
// ABOUTME: Confirms every keyed source row exists in the output and non-JSON data is unchanged

use crate::config::ColumnNames;
use crate::migration::migrate::describe_key;
use crate::sqlite::reader::{get_table_columns, get_table_ddl, get_table_row_count};
use crate::utils::{quote_identifier, sanitize_identifier};
use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::fmt;

/// A single difference between a source table and its repaired copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    MissingTable {
        table: String,
    },
    MissingRow {
        table: String,
        key_column: String,
        key: String,
    },
    RowCountMismatch {
        table: String,
        source: usize,
        destination: usize,
    },
    SchemaMismatch {
        table: String,
    },
    ContentMismatch {
        table: String,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::MissingTable { table } => {
                write!(f, "Table '{}' is missing from the destination", table)
            }
            IntegrityIssue::MissingRow {
                table,
                key_column,
                key,
            } => write!(
                f,
                "Row with {} {} is missing or null in the destination table '{}'",
                key_column, key, table
            ),
            IntegrityIssue::RowCountMismatch {
                table,
                source,
                destination,
            } => write!(
                f,
                "Table '{}' has {} rows in the source but {} in the destination",
                table, source, destination
            ),
            IntegrityIssue::SchemaMismatch { table } => write!(
                f,
                "Table '{}' has a different CREATE TABLE statement in the destination",
                table
            ),
            IntegrityIssue::ContentMismatch { table } => write!(
                f,
                "Table '{}' has different non-JSON column data in the destination",
                table
            ),
        }
    }
}

/// Result of checking one table
#[derive(Debug, Clone, Default)]
pub struct TableVerification {
    pub table: String,
    pub rows_checked: usize,
    /// False when the table has no key column and only table-level checks ran
    pub key_checked: bool,
    pub issues: Vec<IntegrityIssue>,
}

impl TableVerification {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Issues found across every verified table
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub tables: Vec<TableVerification>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableVerification::is_clean)
    }

    pub fn issues(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.tables.iter().flat_map(|t| t.issues.iter())
    }

    pub fn rows_checked(&self) -> usize {
        self.tables.iter().map(|t| t.rows_checked).sum()
    }

    pub fn summary(&self) -> String {
        let issue_count = self.issues().count();
        if issue_count == 0 {
            format!(
                "Integrity check passed: {} tables, {} rows",
                self.tables.len(),
                self.rows_checked()
            )
        } else {
            format!(
                "Integrity check failed: {} issues across {} tables",
                issue_count,
                self.tables.iter().filter(|t| !t.is_clean()).count()
            )
        }
    }
}

/// Verify one table of the output database against the source
///
/// For every source row, looks the row up in the destination by its key
/// column (`IS` comparison, so NULL keys match). Then compares row counts,
/// the `CREATE TABLE` text and a checksum over every non-JSON column.
/// Tables without the key column get only the table-level checks.
///
/// With `fail_fast` the first issue is returned as an error. Otherwise
/// issues are collected in the returned [`TableVerification`]. Database
/// errors are always returned as errors. Nothing is ever written.
pub fn verify_table(
    source: &Connection,
    destination: &Connection,
    table: &str,
    columns: &ColumnNames,
    fail_fast: bool,
) -> Result<TableVerification> {
    tracing::info!("Checking integrity for table: {}", sanitize_identifier(table));

    let mut verification = TableVerification {
        table: table.to_string(),
        ..Default::default()
    };
    let record = |issue: IntegrityIssue, verification: &mut TableVerification| -> Result<()> {
        if fail_fast {
            bail!("{}", issue);
        }
        tracing::warn!("{}", issue);
        verification.issues.push(issue);
        Ok(())
    };

    let source_ddl = get_table_ddl(source, table)?;
    if !table_exists(destination, table)? {
        record(
            IntegrityIssue::MissingTable {
                table: table.to_string(),
            },
            &mut verification,
        )?;
        return Ok(verification);
    }
    let destination_ddl = get_table_ddl(destination, table)?;

    let column_names = get_table_columns(source, table)?;
    if column_names.contains(&columns.key_column) {
        verification.key_checked = true;

        let mut select = source
            .prepare(&format!(
                "SELECT {} FROM {}",
                quote_identifier(&columns.key_column),
                quote_identifier(table)
            ))
            .with_context(|| format!("Failed to prepare key scan for table '{}'", table))?;
        let mut lookup = destination
            .prepare(&format!(
                "SELECT 1 FROM {} WHERE {} IS ?1 LIMIT 1",
                quote_identifier(table),
                quote_identifier(&columns.key_column)
            ))
            .with_context(|| format!("Failed to prepare key lookup for table '{}'", table))?;

        let mut rows = select
            .query([])
            .with_context(|| format!("Failed to query keys from table '{}'", table))?;
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read key from table '{}'", table))?
        {
            let key: Value = row.get(0)?;
            let found = lookup
                .exists([&key])
                .with_context(|| format!("Failed to look up row in table '{}'", table))?;

            if found {
                tracing::debug!(
                    "Row with {} {} exists in both tables.",
                    columns.key_column,
                    describe_key(&key)
                );
            } else {
                record(
                    IntegrityIssue::MissingRow {
                        table: table.to_string(),
                        key_column: columns.key_column.clone(),
                        key: describe_key(&key),
                    },
                    &mut verification,
                )?;
            }
            verification.rows_checked += 1;
        }
    } else {
        tracing::warn!(
            "Table '{}' has no '{}' column, skipping per-row key check",
            sanitize_identifier(table),
            columns.key_column
        );
    }

    let source_count = get_table_row_count(source, table)?;
    let destination_count = get_table_row_count(destination, table)?;
    if source_count != destination_count {
        record(
            IntegrityIssue::RowCountMismatch {
                table: table.to_string(),
                source: source_count,
                destination: destination_count,
            },
            &mut verification,
        )?;
    }

    if source_ddl != destination_ddl {
        record(
            IntegrityIssue::SchemaMismatch {
                table: table.to_string(),
            },
            &mut verification,
        )?;
    }

    let content_columns: Vec<String> = column_names
        .into_iter()
        .filter(|c| *c != columns.json_column)
        .collect();
    let source_sum = compute_content_checksum(source, table, &content_columns)?;
    let destination_sum = compute_content_checksum(destination, table, &content_columns)?;
    if source_sum != destination_sum {
        record(
            IntegrityIssue::ContentMismatch {
                table: table.to_string(),
            },
            &mut verification,
        )?;
    }

    Ok(verification)
}

/// SHA-256 over the given columns of every row, independent of row order
///
/// Each row is hashed on its own (type tag plus raw bytes per cell), the
/// row digests are sorted, and the sorted list is hashed again. Returned as
/// lowercase hex.
pub fn compute_content_checksum(
    conn: &Connection,
    table: &str,
    columns: &[String],
) -> Result<String> {
    let select_list = if columns.is_empty() {
        "1".to_string()
    } else {
        columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM {}",
            select_list,
            quote_identifier(table)
        ))
        .with_context(|| format!("Failed to prepare checksum scan for table '{}'", table))?;

    let mut row_digests = Vec::new();
    let mut rows = stmt
        .query([])
        .with_context(|| format!("Failed to query rows from table '{}'", table))?;
    while let Some(row) = rows.next()? {
        let mut hasher = Sha256::new();
        for idx in 0..columns.len() {
            let value: Value = row.get(idx)?;
            hash_cell(&mut hasher, &value);
        }
        row_digests.push(hasher.finalize().to_vec());
    }
    row_digests.sort_unstable();

    let mut hasher = Sha256::new();
    for digest in &row_digests {
        hasher.update(digest);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn hash_cell(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([b'n']),
        Value::Integer(i) => {
            hasher.update([b'i']);
            hasher.update(i.to_le_bytes());
        }
        Value::Real(f) => {
            hasher.update([b'r']);
            hasher.update(f.to_bits().to_le_bytes());
        }
        Value::Text(s) => {
            hasher.update([b't']);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Blob(b) => {
            hasher.update([b'b']);
            hasher.update((b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .with_context(|| format!("Failed to look up table '{}'", table))?;
    Ok(count > 0)
}
