// ABOUTME: SQLite database handles for the source and repaired output files
// ABOUTME: Validates paths, opens the source read-only and creates the output exclusively

pub mod converter;
pub mod reader;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Validate the path of the database to repair
///
/// Canonicalizes the path (resolving symlinks and relative segments) and
/// verifies it names an existing regular file.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_json_repair::sqlite::validate_source_path;
/// assert!(validate_source_path("broken.db").is_ok());
/// assert!(validate_source_path("/nonexistent.db").is_err());
/// ```
pub fn validate_source_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Missing input");
    }

    let canonical = PathBuf::from(path)
        .canonicalize()
        .with_context(|| format!("{}: file doesn't exist", path))?;

    if !canonical.is_file() {
        bail!("Path '{}' is not a regular file (may be a directory)", path);
    }

    tracing::debug!("Validated input path: {}", canonical.display());

    Ok(canonical)
}

/// Validate the path the repaired database will be written to
///
/// The file must not exist yet: the repair never merges into an existing
/// store.
pub fn validate_destination_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Missing output");
    }

    let path_buf = PathBuf::from(path);
    if path_buf.exists() {
        bail!("output file already exist: {}", path);
    }

    Ok(path_buf)
}

/// Open the database to repair in read-only mode
///
/// The source is never modified. A trivial query runs right after opening so
/// that a file which is not a SQLite database fails here, not mid-run.
pub fn open_source(path: &Path) -> Result<Connection> {
    tracing::info!("Loading {} file", path.display());

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;

    let _version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version (database may be corrupted)")?;

    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .with_context(|| format!("'{}' is not a readable SQLite database", path.display()))?;

    tracing::info!("Sqlite loaded");

    Ok(conn)
}

/// Create the output database
///
/// The file is created with `create_new`, so creation fails if anything
/// appeared at `path` since validation. The connection gets `busy_timeout`
/// as its single lock-contention wait budget.
pub fn create_destination(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    tracing::info!("Creating output sqlite file: {}", path.display());

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                anyhow::anyhow!("output file already exist: {}", path.display())
            } else {
                anyhow::Error::new(e)
                    .context(format!("Failed to create output file {}", path.display()))
            }
        })?;

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open output database: {}", path.display()))?;

    conn.busy_timeout(busy_timeout)
        .context("Failed to configure busy timeout on output database")?;

    tracing::debug!(
        "Output database ready with a {}s busy timeout",
        busy_timeout.as_secs()
    );

    Ok(conn)
}
