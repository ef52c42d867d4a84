// ABOUTME: SQLite table enumeration and schema introspection
// ABOUTME: Lists user tables, fetches their CREATE TABLE statements, columns and row counts

use crate::utils::quote_identifier;
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// List all user tables in a SQLite database
///
/// Queries sqlite_master for tables in the order they were created.
/// Excludes every table whose name starts with `sqlite_`, a prefix reserved
/// by the engine (sqlite_sequence, sqlite_stat1, ...).
///
/// # Examples
///
/// ```no_run
/// # use sqlite_json_repair::sqlite::{open_source, reader::list_tables};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_source(std::path::Path::new("database.db"))?;
/// for table in list_tables(&conn)? {
///     println!("Table: {}", table);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    tracing::debug!("Listing tables from SQLite database");

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' \
             AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY rowid",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::info!("Tables found: [{}]", tables.join(", "));

    Ok(tables)
}

/// Fetch the verbatim `CREATE TABLE` statement of a table
///
/// Fails if the table has no entry in sqlite_master or its entry carries no
/// SQL text.
pub fn get_table_ddl(conn: &Connection, table: &str) -> Result<String> {
    let sql: Option<Option<String>> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read schema of table '{}'", table))?;

    match sql {
        Some(Some(ddl)) => Ok(ddl),
        Some(None) => bail!("Table '{}' has no CREATE TABLE statement", table),
        None => bail!("Table '{}' not found in sqlite_master", table),
    }
}

/// Column names of a table, in declaration order
pub fn get_table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .context("Failed to query table columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect column names")?;

    Ok(columns)
}

/// Declared type of one column (empty when the column has none)
///
/// Returns `None` if the table has no column with exactly that name.
pub fn get_column_declared_type(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<Option<String>> {
    let query = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })
        .context("Failed to query table columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect column types")?;

    Ok(columns
        .into_iter()
        .find(|(name, _)| name == column)
        .map(|(_, declared)| declared))
}

/// Get row count for a specific table
pub fn get_table_row_count(conn: &Connection, table: &str) -> Result<usize> {
    tracing::debug!("Getting row count for table '{}'", table);

    let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows in table '{}'", table))?;

    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();

        conn.execute_batch(
            "CREATE TABLE users (ID TEXT PRIMARY KEY, json TEXT);
             CREATE TABLE \"audit log\" (ID INTEGER PRIMARY KEY, json TEXT, note TEXT);
             CREATE TABLE attachments (ID TEXT, json TEXT);
             CREATE INDEX idx_attachments ON attachments (ID);
             INSERT INTO users VALUES ('a', '\"1\"'), ('b', '\"2\"'), ('c', 'true');
             INSERT INTO \"audit log\" VALUES (1, '{}', 'first');",
        )
        .unwrap();

        (temp_dir, db_path)
    }

    #[test]
    fn test_list_tables_in_creation_order() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let tables = list_tables(&conn).unwrap();

        assert_eq!(tables, vec!["users", "audit log", "attachments"]);
    }

    #[test]
    fn test_list_tables_excludes_system_tables() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(&db_path).unwrap();

        // AUTOINCREMENT creates sqlite_sequence
        conn.execute_batch(
            "CREATE TABLE counters (id INTEGER PRIMARY KEY AUTOINCREMENT, json TEXT);
             INSERT INTO counters (json) VALUES ('1');
             CREATE TABLE sqliteish (json TEXT);",
        )
        .unwrap();

        let tables = list_tables(&conn).unwrap();

        assert!(!tables.iter().any(|t| t.starts_with("sqlite_")));
        assert!(tables.contains(&"counters".to_string()));
        // Only the literal prefix is reserved
        assert!(tables.contains(&"sqliteish".to_string()));
    }

    #[test]
    fn test_get_table_ddl() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let ddl = get_table_ddl(&conn, "users").unwrap();
        assert_eq!(ddl, "CREATE TABLE users (ID TEXT PRIMARY KEY, json TEXT)");

        let ddl = get_table_ddl(&conn, "audit log").unwrap();
        assert!(ddl.starts_with("CREATE TABLE \"audit log\""));
    }

    #[test]
    fn test_get_table_ddl_missing_table() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let err = get_table_ddl(&conn, "ghosts").unwrap_err();
        assert!(err.to_string().contains("not found"));

        // Indexes are not tables
        assert!(get_table_ddl(&conn, "idx_attachments").is_err());
    }

    #[test]
    fn test_get_table_columns() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let columns = get_table_columns(&conn, "audit log").unwrap();
        assert_eq!(columns, vec!["ID", "json", "note"]);
    }

    #[test]
    fn test_get_column_declared_type() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();
        conn.execute_batch("CREATE TABLE loose (ID, json)").unwrap();

        assert_eq!(
            get_column_declared_type(&conn, "audit log", "ID").unwrap(),
            Some("INTEGER".to_string())
        );
        assert_eq!(
            get_column_declared_type(&conn, "users", "json").unwrap(),
            Some("TEXT".to_string())
        );
        assert_eq!(
            get_column_declared_type(&conn, "loose", "json").unwrap(),
            Some(String::new())
        );
        assert_eq!(get_column_declared_type(&conn, "users", "JSON").unwrap(), None);
    }

    #[test]
    fn test_get_table_row_count() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        assert_eq!(get_table_row_count(&conn, "users").unwrap(), 3);
        assert_eq!(get_table_row_count(&conn, "audit log").unwrap(), 1);
        assert_eq!(get_table_row_count(&conn, "attachments").unwrap(), 0);
    }

    #[test]
    fn test_get_table_row_count_quotes_names() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        // Treated as an identifier, never as SQL
        let result = get_table_row_count(&conn, "users; DROP TABLE users;");
        assert!(result.is_err());
        assert_eq!(get_table_row_count(&conn, "users").unwrap(), 3);
    }
}
