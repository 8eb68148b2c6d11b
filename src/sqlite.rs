//! SQLite implementation of [`Database`] on top of rusqlite.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::types::{ToSql, Value as SqlValue, ValueRef};

use crate::database::{Bound, Cursor, Database, DatabaseError};
use crate::value::{Row, Value};

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::new(e.to_string())
    }
}

pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        Ok(SqliteDatabase {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(SqliteDatabase {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run one or more `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        Ok(self.conn.execute_batch(sql)?)
    }
}

fn to_sql_value(bound: &Bound) -> SqlValue {
    match bound {
        Bound::Null => SqlValue::Null,
        Bound::Int(i) => SqlValue::Integer(*i),
        Bound::Float(f) => SqlValue::Real(*f),
        Bound::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

impl Database for SqliteDatabase {
    fn execute_statement(&self, sql: &str, params: &[(String, Bound)]) -> Result<Cursor, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let values: Vec<(String, SqlValue)> = params
            .iter()
            .map(|(name, bound)| (format!(":{}", name), to_sql_value(bound)))
            .collect();
        let named: Vec<(&str, &dyn ToSql)> = values
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        if columns.is_empty() {
            let affected = stmt.execute(named.as_slice())?;
            return Ok(Cursor {
                affected: affected as u64,
                ..Cursor::default()
            });
        }

        let mut rows = stmt.query(named.as_slice())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_value_ref(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(Cursor {
            columns,
            rows: out,
            affected: 0,
        })
    }
}
