// ABOUTME: Copies one table from the source into the output database
// ABOUTME: Replays the CREATE TABLE statement and rewrites the JSON column of every row

use crate::config::ColumnNames;
use crate::progress::TableProgress;
use crate::sqlite::converter::{sqlite_value_to_stored, stored_to_sqlite_value, ColumnAffinity};
use crate::sqlite::reader::{
    get_column_declared_type, get_table_columns, get_table_ddl, get_table_row_count,
};
use crate::unwrap::{check_real_magnitude, repair_value, UnwrapError};
use crate::utils::{quote_identifier, sanitize_identifier};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Outcome of migrating one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMigrationStats {
    pub table: String,
    pub rows_copied: usize,
    /// JSON cells whose stored value changed
    pub values_rewritten: usize,
    /// JSON cells copied verbatim because they hold NULL or a BLOB
    pub values_passed_through: usize,
    pub has_json_column: bool,
}

/// Migrate a single table into the output database
///
/// Executes the table's `CREATE TABLE` statement verbatim on `destination`,
/// then streams every source row through the unwrapper (JSON column only)
/// and inserts it. All inserts for the table share one transaction that is
/// committed after the last row. Any error aborts the table: the transaction
/// is dropped and the caller is expected to stop the run.
///
/// Repaired values are written in the form the JSON column's declared type
/// stores them (see [`ColumnAffinity`]), so a number lands as `42` text in a
/// `TEXT` column and as an INTEGER in an untyped one. Tables without the JSON
/// column are copied verbatim.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_json_repair::config::RepairConfig;
/// # use sqlite_json_repair::migration::migrate_table;
/// # fn example(src: &rusqlite::Connection, dst: &mut rusqlite::Connection) -> anyhow::Result<()> {
/// let config = RepairConfig::default();
/// let stats = migrate_table(src, dst, "events", &config.columns_for("events"), false)?;
/// println!("{} rows copied", stats.rows_copied);
/// # Ok(())
/// # }
/// ```
pub fn migrate_table(
    source: &Connection,
    destination: &mut Connection,
    table: &str,
    columns: &ColumnNames,
    show_progress: bool,
) -> Result<TableMigrationStats> {
    tracing::info!("Processing table: {}", sanitize_identifier(table));

    let ddl = get_table_ddl(source, table)?;
    destination
        .execute_batch(&ddl)
        .with_context(|| format!("Failed to create table '{}' in output database", table))?;

    let column_names = get_table_columns(source, table)?;
    let json_idx = column_names.iter().position(|c| *c == columns.json_column);
    let key_idx = column_names.iter().position(|c| *c == columns.key_column);

    let json_affinity = match json_idx {
        Some(_) => {
            let declared = get_column_declared_type(source, table, &columns.json_column)?
                .unwrap_or_default();
            ColumnAffinity::from_declared_type(&declared)
        }
        None => {
            tracing::info!(
                "Table '{}' has no '{}' column, copying rows verbatim",
                sanitize_identifier(table),
                columns.json_column
            );
            ColumnAffinity::Blob
        }
    };

    let quoted_columns = column_names
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=column_names.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let select_sql = format!(
        "SELECT {} FROM {}",
        quoted_columns,
        quote_identifier(table)
    );
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table),
        quoted_columns,
        placeholders
    );

    let total_rows = get_table_row_count(source, table)?;
    let progress = TableProgress::new(table, total_rows as u64, show_progress);

    let mut stats = TableMigrationStats {
        table: table.to_string(),
        has_json_column: json_idx.is_some(),
        ..Default::default()
    };

    let mut select = source
        .prepare(&select_sql)
        .with_context(|| format!("Failed to prepare statement for table '{}'", table))?;

    let tx = destination
        .transaction()
        .with_context(|| format!("Failed to begin transaction for table '{}'", table))?;

    {
        let mut insert = tx
            .prepare(&insert_sql)
            .with_context(|| format!("Failed to prepare insert for table '{}'", table))?;

        let mut rows = select
            .query([])
            .with_context(|| format!("Failed to query rows from table '{}'", table))?;

        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read row from table '{}'", table))?
        {
            let mut values = (0..column_names.len())
                .map(|idx| row.get::<_, Value>(idx))
                .collect::<rusqlite::Result<Vec<Value>>>()
                .with_context(|| format!("Failed to read row from table '{}'", table))?;

            let row_label = match key_idx {
                Some(idx) => format!("{} {}", columns.key_column, describe_key(&values[idx])),
                None => format!("number {}", stats.rows_copied + 1),
            };
            tracing::debug!("Inserting row with {}", row_label);

            if let Some(idx) = json_idx {
                let original = std::mem::replace(&mut values[idx], Value::Null);
                let outcome = repair_cell(original, json_affinity).with_context(|| {
                    format!(
                        "Failed to repair column '{}' of row with {} in table '{}'",
                        columns.json_column,
                        row_label,
                        sanitize_identifier(table)
                    )
                })?;
                match outcome {
                    CellOutcome::Rewritten(value) => {
                        stats.values_rewritten += 1;
                        values[idx] = value;
                    }
                    CellOutcome::Unchanged(value) => values[idx] = value,
                    CellOutcome::PassedThrough(value) => {
                        stats.values_passed_through += 1;
                        values[idx] = value;
                    }
                }
            }

            insert
                .execute(params_from_iter(values.iter()))
                .with_context(|| {
                    format!(
                        "Failed to insert row with {} into table '{}'",
                        row_label,
                        sanitize_identifier(table)
                    )
                })?;

            stats.rows_copied += 1;
            progress.inc();
        }
    }

    tx.commit()
        .with_context(|| format!("Failed to commit rows for table '{}'", table))?;

    let elapsed = progress.finish(table);
    tracing::info!(
        "Table '{}': {} rows copied, {} json values rewritten ({:.2}s)",
        sanitize_identifier(table),
        stats.rows_copied,
        stats.values_rewritten,
        elapsed.as_secs_f64()
    );

    Ok(stats)
}

enum CellOutcome {
    Rewritten(Value),
    Unchanged(Value),
    PassedThrough(Value),
}

/// Repair one JSON cell and compare the result in its persisted form
fn repair_cell(value: Value, affinity: ColumnAffinity) -> Result<CellOutcome, UnwrapError> {
    if let Value::Real(f) = value {
        check_real_magnitude(f)?;
    }

    let Some(stored) = sqlite_value_to_stored(&value) else {
        return Ok(CellOutcome::PassedThrough(value));
    };

    let repaired = stored_to_sqlite_value(repair_value(stored)?, affinity);
    if repaired == value {
        Ok(CellOutcome::Unchanged(value))
    } else {
        Ok(CellOutcome::Rewritten(repaired))
    }
}

/// Render a key cell for log and error messages
pub(crate) fn describe_key(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => sanitize_identifier(s),
        Value::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}
