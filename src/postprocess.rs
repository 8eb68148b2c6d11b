//! Shaping of leaf results: dot-unnesting, declared-type casting, null-branch
//! collapsing and caller-registered per-leaf callbacks, in that order.
//!
//! Only sequence-of-row results are post-processed.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexSet;
use tracing::warn;

use crate::interface::{ScalarType, TypeDecl, TypeMap};
use crate::rows::{collapse_nulls, insert_path};
use crate::value::{Row, Value};

/// A per-leaf transform applied after the built-in steps.
pub type Callback = Box<dyn Fn(&mut Vec<Row>)>;

/// Read-only registry of per-leaf callbacks, fixed before first use.
#[derive(Default)]
pub struct Callbacks {
    by_leaf: HashMap<String, Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, leaf: &str, callback: impl Fn(&mut Vec<Row>) + 'static) -> Self {
        self.by_leaf.insert(leaf.to_string(), Box::new(callback));
        self
    }

    pub fn get(&self, leaf: &str) -> Option<&Callback> {
        self.by_leaf.get(leaf)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_leaf.keys()).finish()
    }
}

/// Which flat fields to relocate, derived once from the first row.
#[derive(Debug, Clone, Default)]
pub struct UnnestPlan {
    fields: IndexSet<String>,
    /// Top-level fields created by unnesting; candidates for collapsing.
    roots: IndexSet<String>,
}

impl UnnestPlan {
    pub fn from_row(row: &Row, separator: &str) -> Self {
        let mut plan = UnnestPlan::default();
        for field in row.keys() {
            if let Some((root, _)) = field.split_once(separator) {
                if root.is_empty() {
                    continue;
                }
                plan.fields.insert(field.clone());
                plan.roots.insert(root.to_string());
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    /// Relocate the planned flat fields of one row into nested rows.
    pub fn apply(&self, row: Row, separator: &str) -> Row {
        let mut out = Row::with_capacity(row.len());
        for (field, value) in row {
            if self.fields.contains(&field) {
                let path: Vec<&str> = field.split(separator).collect();
                if !insert_path(&mut out, &path, value.clone()) {
                    out.insert(field, value);
                }
            } else {
                out.insert(field, value);
            }
        }
        out
    }
}

/// Settings for one leaf's post-processing.
pub struct PostProcess<'a> {
    pub nested: bool,
    pub separator: &'a str,
    pub types: &'a TypeMap,
    pub callback: Option<&'a Callback>,
}

impl PostProcess<'_> {
    pub fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        let plan = match rows.first() {
            Some(first) if self.nested => UnnestPlan::from_row(first, self.separator),
            _ => UnnestPlan::default(),
        };

        let mut rows: Vec<Row> = rows
            .into_iter()
            .map(|row| {
                let row = if plan.is_empty() {
                    row
                } else {
                    plan.apply(row, self.separator)
                };
                let mut row = cast_row(row, self.types);
                for root in plan.roots() {
                    if let Some(value) = row.get_mut(root) {
                        *value = collapse_nulls(std::mem::take(value));
                    }
                }
                row
            })
            .collect();

        if let Some(callback) = self.callback {
            callback(&mut rows);
        }
        rows
    }
}

/// Cast every declared field of `row`.
pub fn cast_row(mut row: Row, types: &TypeMap) -> Row {
    for (field, decl) in types {
        if let Some(value) = row.get_mut(field) {
            *value = cast(std::mem::take(value), decl);
        }
    }
    row
}

/// Cast one value to its declared type. Null stays null.
pub fn cast(value: Value, decl: &TypeDecl) -> Value {
    if value.is_null() {
        return value;
    }
    match decl {
        TypeDecl::Scalar(ScalarType::Int) => value.as_int().map(Value::Integer).unwrap_or(Value::Null),
        TypeDecl::Scalar(ScalarType::Float) => value.as_float().map(Value::Float).unwrap_or(Value::Null),
        TypeDecl::Scalar(ScalarType::String) => Value::String(value.as_string()),
        TypeDecl::Scalar(ScalarType::Json) => decode_json(value),
        TypeDecl::Scalar(ScalarType::Child) => value,
        TypeDecl::Object(types) => match value {
            Value::Object(row) => Value::Object(cast_row(row, types)),
            other => other,
        },
    }
}

fn decode_json(value: Value) -> Value {
    let decoded = match value {
        Value::String(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Value::from(json),
            Err(e) => {
                warn!(error = %e, "json field does not decode, keeping text");
                return Value::String(text);
            }
        },
        other => other,
    };
    drop_outer_join_artifact(decoded)
}

/// `GROUP_CONCAT` over a left join with no match yields `[{"a":null,...}]`;
/// that is an empty list.
fn drop_outer_join_artifact(value: Value) -> Value {
    match value {
        Value::Array(items) if items.len() == 1 && items[0].is_null_branch() => Value::Array(Vec::new()),
        other => other,
    }
}
