//! CLI support for termql
//!
//! Exposes the `parse` and `run` commands programmatically so other tools can
//! drive them without spawning the binary.

mod parse;
mod run;

pub use parse::{ParseOptions, execute_parse};
pub use run::{RunOptions, RunResult, execute_run};

use std::io;

use crate::database::DatabaseError;
use crate::store::StoreError;

/// Errors that can occur during CLI operations
#[derive(Debug)]
pub enum CliError {
    /// Malformed term
    Parse(crate::ParseError),
    /// Resolving or executing the term failed
    Query(crate::QueryError),
    /// Opening the database failed
    Database(DatabaseError),
    /// Reading the config file failed
    Store(StoreError),
    /// Invalid JSON parameters
    Json(serde_json::Error),
    /// Parameters were not a JSON object
    NotAnObject,
    /// IO error
    Io(io::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Parse(e) => write!(f, "Parse error: {}", e),
            CliError::Query(e) => write!(f, "Query error: {}", e),
            CliError::Database(e) => write!(f, "Database error: {}", e),
            CliError::Store(e) => write!(f, "Config error: {}", e),
            CliError::Json(e) => write!(f, "Invalid JSON: {}", e),
            CliError::NotAnObject => write!(f, "Parameters must be a JSON object, e.g. '{{\"user\": 1}}'"),
            CliError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Parse(e) => Some(e),
            CliError::Query(e) => Some(e),
            CliError::Database(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Json(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::NotAnObject => None,
        }
    }
}

impl From<crate::ParseError> for CliError {
    fn from(e: crate::ParseError) -> Self {
        CliError::Parse(e)
    }
}

impl From<crate::QueryError> for CliError {
    fn from(e: crate::QueryError) -> Self {
        CliError::Query(e)
    }
}

impl From<DatabaseError> for CliError {
    fn from(e: DatabaseError) -> Self {
        CliError::Database(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}
