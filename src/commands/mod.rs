// ABOUTME: Command implementations invoked by the CLI
// ABOUTME: Exports the repair command

pub mod repair;

pub use repair::{repair, RepairSummary};
