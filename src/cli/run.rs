//! Resolve a term against an artifact directory and execute it on a SQLite
//! database

use std::path::PathBuf;

use super::CliError;
use crate::config::Config;
use crate::query::Outcome;
use crate::sqlite::SqliteDatabase;
use crate::store::FileStore;
use crate::value::{Params, Value};
use crate::Resolver;

/// Options for the run command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// The term to execute
    pub term: String,
    /// Artifact directory
    pub store: PathBuf,
    /// SQLite database file
    pub db: PathBuf,
    /// JSON object of parameter values
    pub params: Option<String>,
    /// JSON config file
    pub config: Option<PathBuf>,
    /// Return only the first row
    pub first: bool,
}

/// Result of a run operation
#[derive(Debug)]
pub enum RunResult {
    /// Rows or values read
    Selected(serde_json::Value),
    /// Rows touched by a write
    Affected(u64),
}

/// Execute a termql run operation
pub fn execute_run(options: &RunOptions) -> Result<RunResult, CliError> {
    let config = match &options.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let params = parse_params(options.params.as_deref())?;

    let db = SqliteDatabase::open(&options.db)?;
    let resolver = Resolver::new(FileStore::new(&options.store), db).with_config(config);
    let query = resolver.resolve(&options.term)?;

    if options.first {
        let row = query.select1(&params)?;
        let value = row.map(Value::Object).unwrap_or(Value::Null);
        return Ok(RunResult::Selected(value.into()));
    }
    match query.run(&params)? {
        Outcome::Selected(shaped) => Ok(RunResult::Selected(shaped.into_value().into())),
        Outcome::Affected(count) => Ok(RunResult::Affected(count)),
    }
}

fn parse_params(input: Option<&str>) -> Result<Params, CliError> {
    let Some(text) = input.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<Value>(text)? {
        Value::Object(params) => Ok(params),
        _ => Err(CliError::NotAnObject),
    }
}
