//! The relational-database collaborator.

use std::rc::Rc;

use thiserror::Error;

use crate::interface::Cardinality;
use crate::value::{Row, Shaped, Value};

/// A prepared-statement parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DatabaseError {
    pub message: String,
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        DatabaseError {
            message: message.into(),
        }
    }
}

/// Fully fetched statement result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows changed by a create/update/delete statement.
    pub affected: u64,
}

impl Cursor {
    /// First column of the first row, or null.
    pub fn fetch_scalar(self) -> Value {
        self.rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, v)| v)
            .unwrap_or(Value::Null)
    }

    pub fn fetch_row(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    /// First column of every row.
    pub fn fetch_column(self) -> Vec<Value> {
        self.rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
            .collect()
    }

    pub fn fetch_all(self) -> Vec<Row> {
        self.rows
    }

    /// Fetch with the strategy selected by (row cardinality x column cardinality).
    pub fn fetch(self, rows: Cardinality, columns: Cardinality) -> Shaped {
        match (rows, columns) {
            (Cardinality::One, Cardinality::One) => Shaped::Scalar(self.fetch_scalar()),
            (Cardinality::One, Cardinality::Many) => Shaped::Row(self.fetch_row()),
            (Cardinality::Many, Cardinality::One) => Shaped::Scalars(self.fetch_column()),
            (Cardinality::Many, Cardinality::Many) => Shaped::Rows(self.fetch_all()),
        }
    }
}

/// Statement execution and literal escaping.
///
/// Implementations own connection handling; the engine calls
/// `execute_statement` synchronously and assumes sole use of the handle for
/// the duration of one execution.
pub trait Database {
    /// Execute `sql`, binding each `:name` placeholder from `params`.
    fn execute_statement(&self, sql: &str, params: &[(String, Bound)]) -> Result<Cursor, DatabaseError>;

    /// Render a value as an SQL literal, for inlined IN-lists.
    fn escape_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::String(s) => quote(s),
            other => quote(&other.as_string()),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl<D: Database + ?Sized> Database for Rc<D> {
    fn execute_statement(&self, sql: &str, params: &[(String, Bound)]) -> Result<Cursor, DatabaseError> {
        (**self).execute_statement(sql, params)
    }

    fn escape_literal(&self, value: &Value) -> String {
        (**self).escape_literal(value)
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }
}

impl<D: Database + ?Sized> Database for &D {
    fn execute_statement(&self, sql: &str, params: &[(String, Bound)]) -> Result<Cursor, DatabaseError> {
        (**self).execute_statement(sql, params)
    }

    fn escape_literal(&self, value: &Value) -> String {
        (**self).escape_literal(value)
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }
}
