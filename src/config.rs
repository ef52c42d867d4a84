// ABOUTME: Repair run configuration from CLI flags and an optional TOML file
// ABOUTME: Resolves the JSON and key column names per table plus run-wide knobs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

pub const DEFAULT_JSON_COLUMN: &str = "json";
pub const DEFAULT_KEY_COLUMN: &str = "ID";
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    json_column: Option<String>,
    key_column: Option<String>,
    busy_timeout_secs: Option<u64>,
    #[serde(default)]
    tables: HashMap<String, TableConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
struct TableConfig {
    json_column: Option<String>,
    key_column: Option<String>,
}

/// Column names the repair uses for one table. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub json_column: String,
    pub key_column: String,
}

#[derive(Debug, Clone)]
pub struct RepairConfig {
    defaults: ColumnNames,
    tables: HashMap<String, TableConfig>,
    pub busy_timeout: Duration,
    pub check_integrity: bool,
    pub keep_going: bool,
    pub show_progress: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            defaults: ColumnNames {
                json_column: DEFAULT_JSON_COLUMN.to_string(),
                key_column: DEFAULT_KEY_COLUMN.to_string(),
            },
            tables: HashMap::new(),
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
            check_integrity: false,
            keep_going: false,
            show_progress: false,
        }
    }
}

impl RepairConfig {
    /// Load defaults and per-table overrides from a TOML file
    ///
    /// ```toml
    /// json_column = "json"
    /// key_column = "ID"
    /// busy_timeout_secs = 60
    ///
    /// [tables.events]
    /// json_column = "payload"
    /// key_column = "id"
    /// ```
    pub fn load_from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path))?;
        let parsed: ConfigFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse TOML config at {}", path))?;

        let mut config = Self::default();
        if let Some(column) = parsed.json_column {
            config = config.with_json_column(column)?;
        }
        if let Some(column) = parsed.key_column {
            config = config.with_key_column(column)?;
        }
        if let Some(secs) = parsed.busy_timeout_secs {
            config = config.with_busy_timeout_secs(secs);
        }

        for (table, overrides) in parsed.tables {
            if let Some(ref column) = overrides.json_column {
                non_empty(column, &format!("tables.{}.json_column", table))?;
            }
            if let Some(ref column) = overrides.key_column {
                non_empty(column, &format!("tables.{}.key_column", table))?;
            }
            config.tables.insert(table, overrides);
        }

        tracing::debug!(
            "Loaded config from {} ({} table overrides)",
            path,
            config.tables.len()
        );

        Ok(config)
    }

    pub fn with_json_column(mut self, column: impl Into<String>) -> Result<Self> {
        self.defaults.json_column = non_empty(&column.into(), "json column")?;
        Ok(self)
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Result<Self> {
        self.defaults.key_column = non_empty(&column.into(), "key column")?;
        Ok(self)
    }

    pub fn with_busy_timeout_secs(mut self, secs: u64) -> Self {
        self.busy_timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_check_integrity(mut self, enabled: bool) -> Self {
        self.check_integrity = enabled;
        self
    }

    pub fn with_keep_going(mut self, enabled: bool) -> Self {
        self.keep_going = enabled;
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Column names for `table`, with its per-table overrides applied
    pub fn columns_for(&self, table: &str) -> ColumnNames {
        let overrides = self.tables.get(table).cloned().unwrap_or_default();
        ColumnNames {
            json_column: overrides
                .json_column
                .unwrap_or_else(|| self.defaults.json_column.clone()),
            key_column: overrides
                .key_column
                .unwrap_or_else(|| self.defaults.key_column.clone()),
        }
    }
}

fn non_empty(value: &str, label: &str) -> Result<String> {
    if value.trim().is_empty() {
        bail!("{} cannot be empty", label);
    }
    Ok(value.to_string())
}
