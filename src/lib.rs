// ABOUTME: Library module for sqlite-json-repair
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod migration;
pub mod progress;
pub mod sqlite;
pub mod unwrap;
pub mod utils;
