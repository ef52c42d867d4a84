// ABOUTME: Table-level repair steps
// ABOUTME: Row migration into the output database and the optional integrity pass

pub mod migrate;
pub mod verify;

pub use migrate::{migrate_table, TableMigrationStats};
pub use verify::{
    compute_content_checksum, verify_table, IntegrityIssue, IntegrityReport, TableVerification,
};
