use thiserror::Error;

use crate::database::DatabaseError;
use crate::parser::ParseError;
use crate::store::StoreError;

/// Error taxonomy of the query engine.
///
/// - [`QueryError::Parse`]: the term itself is malformed
/// - [`QueryError::KeyMatch`]: joined nodes share zero or several keys
/// - [`QueryError::Schema`]: unknown leaf, missing bound field or fragment
/// - [`QueryError::Execution`]: the database rejected a leaf's statement
/// - [`QueryError::LimitExceeded`]: a Filter chain's key set outgrew its ceiling
///
/// None of these are retried here.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("no unique common key between '{left}' and '{right}' (candidates: {candidates:?})")]
    KeyMatch {
        left: String,
        right: String,
        candidates: Vec<String>,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("artifact error: {0}")]
    Store(#[from] StoreError),

    #[error("execution error in leaf '{leaf}': {source}")]
    Execution {
        leaf: String,
        #[source]
        source: DatabaseError,
    },

    /// Filter chains inject the base key set as an IN-list; past the ceiling
    /// the narrowing query has to be batched instead.
    #[error("filter key set of {count} values exceeds the limit of {limit}")]
    LimitExceeded { count: usize, limit: usize },

    #[error("cannot merge field '{field}': mapping and scalar values conflict")]
    FieldConflict { field: String },
}

pub type Result<T> = std::result::Result<T, QueryError>;
