//! Parameter rendering: turns `:name` placeholders plus a parameter set into
//! the final statement text and its bound values.
//!
//! - scalar values stay placeholders and are bound, typed per declaration
//! - sequences are inlined as literal lists (`IN (:ids)` -> `IN (1,2,3)`)
//! - tuple sequences become `(1,'a'),(2,'b')`, and `:name__0`, `:name__1`
//!   expand to the list of each position's components
//! - placeholders without a value render as `NULL`
//!
//! `::type` casts and quoted literals or identifiers are left alone.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::database::{Bound, Database};
use crate::error::{QueryError, Result};
use crate::interface::{ParamSpecs, ParamType};
use crate::value::{Params, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub bound: Vec<(String, Bound)>,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#).unwrap())
}

/// Whether `sql` contains a `:name` placeholder.
pub fn mentions(sql: &str, name: &str) -> bool {
    placeholder()
        .captures_iter(sql)
        .any(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))
}

/// Fails when a scalar cannot be converted to its declared type.
pub fn render(sql: &str, values: &Params, specs: &ParamSpecs, db: &dyn Database) -> Result<Rendered> {
    let mut bound: Vec<(String, Bound)> = Vec::new();
    let mut mistyped: Option<QueryError> = None;

    let text = placeholder().replace_all(sql, |caps: &Captures| {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            return caps[0].to_string();
        };
        match values.get(name) {
            Some(Value::Array(items)) => literal_list(items, db),
            Some(value) => {
                if !bound.iter().any(|(n, _)| n == name) {
                    let ty = specs.get(name).map(|s| s.ty).unwrap_or_default();
                    match bind_value(value, ty) {
                        Some(b) => bound.push((name.to_string(), b)),
                        None => {
                            mistyped.get_or_insert_with(|| {
                                QueryError::Schema(format!(
                                    "parameter '{}' value {} is not a valid {:?}",
                                    name,
                                    serde_json::Value::from(value.clone()),
                                    ty
                                ))
                            });
                        }
                    }
                }
                format!(":{}", name)
            }
            None => match tuple_position(name, values) {
                Some(components) => literal_list(&components, db),
                None => "NULL".to_string(),
            },
        }
    });

    if let Some(e) = mistyped {
        return Err(e);
    }
    Ok(Rendered {
        sql: text.into_owned(),
        bound,
    })
}

fn is_tuple_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|v| matches!(v, Value::Array(_)))
}

/// `1,2,3` or, for tuples, `(1,'a'),(2,'b')`. Empty lists render as `NULL`
/// so `IN (...)` stays valid and matches nothing.
pub fn literal_list(items: &[Value], db: &dyn Database) -> String {
    if items.is_empty() {
        return "NULL".to_string();
    }
    if is_tuple_list(items) {
        return items
            .iter()
            .map(|tuple| match tuple {
                Value::Array(parts) => format!(
                    "({})",
                    parts.iter().map(|p| db.escape_literal(p)).collect::<Vec<_>>().join(",")
                ),
                other => db.escape_literal(other),
            })
            .collect::<Vec<_>>()
            .join(",");
    }
    items
        .iter()
        .map(|v| db.escape_literal(v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Components at position `i` of tuple parameter `base`, for a placeholder
/// named `base__i`.
fn tuple_position(name: &str, values: &Params) -> Option<Vec<Value>> {
    let (base, index) = name.rsplit_once("__")?;
    let index: usize = index.parse().ok()?;
    match values.get(base)? {
        Value::Array(items) if is_tuple_list(items) => Some(
            items
                .iter()
                .map(|tuple| match tuple {
                    Value::Array(parts) => parts.get(index).cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Convert a scalar to a bound value per its declared type. `None` when the
/// value cannot be read as that type.
pub fn bind_value(value: &Value, ty: ParamType) -> Option<Bound> {
    if value.is_null() {
        return Some(Bound::Null);
    }
    match ty {
        ParamType::Int => value.as_int().map(Bound::Int),
        ParamType::Float => value.as_float().map(Bound::Float),
        ParamType::String => Some(Bound::Text(value.as_string())),
        ParamType::Bool => value.as_int().map(|n| Bound::Int((n != 0) as i64)),
        ParamType::Any => Some(match value {
            Value::Integer(n) => Bound::Int(*n),
            Value::Float(f) => Bound::Float(*f),
            Value::Boolean(b) => Bound::Int(*b as i64),
            other => Bound::Text(other.as_string()),
        }),
    }
}
