// ABOUTME: Utility functions for SQL identifiers and path sanity checks
// ABOUTME: Provides identifier quoting, display sanitizing and input/output path comparison

use anyhow::{bail, Result};
use std::path::Path;

/// Quote a SQLite identifier (table or column name)
///
/// Wraps the name in double quotes and doubles any embedded double quote, so
/// every name SQLite accepts can be used safely in generated SQL.
///
/// # Examples
///
/// ```
/// # use sqlite_json_repair::utils::quote_identifier;
/// assert_eq!(quote_identifier("users"), "\"users\"");
/// assert_eq!(quote_identifier("audit log"), "\"audit log\"");
/// assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sanitize an identifier or key for display
///
/// Removes control characters and limits length to keep log lines readable.
/// Display only, never use the result in SQL.
///
/// # Examples
///
/// ```
/// # use sqlite_json_repair::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// assert_eq!(sanitize_identifier(&"a".repeat(200)).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Validate that the input and output paths are different
///
/// Compares the paths as given, before anything touches the filesystem.
/// When both already exist they are also compared after canonicalization,
/// which catches `./db.sqlite` vs `db.sqlite` and symlinks.
///
/// # Examples
///
/// ```
/// # use sqlite_json_repair::utils::validate_input_output_different;
/// assert!(validate_input_output_different("in.db", "out.db").is_ok());
/// assert!(validate_input_output_different("same.db", "same.db").is_err());
/// ```
pub fn validate_input_output_different(input: &str, output: &str) -> Result<()> {
    if input == output {
        bail!("Output cannot be the same as input");
    }

    let (input_path, output_path) = (Path::new(input), Path::new(output));
    if let (Ok(a), Ok(b)) = (input_path.canonicalize(), output_path.canonicalize()) {
        if a == b {
            bail!(
                "Output cannot be the same as input ({} and {} are the same file)",
                input,
                output
            );
        }
    }

    Ok(())
}
