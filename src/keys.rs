//! Key model: semantic key names mapped to the physical fields backing them.
//!
//! Two nodes can be joined when exactly one key name appears in both of their
//! key maps. The fields may differ per node (`user` may be `id` on the users
//! query and `user_id` on the orders query).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::value::{Row, Value};

/// The field(s) backing a key on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyFields {
    Single(String),
    Composite(Vec<String>),
}

impl KeyFields {
    pub fn fields(&self) -> &[String] {
        match self {
            KeyFields::Single(field) => std::slice::from_ref(field),
            KeyFields::Composite(fields) => fields,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, KeyFields::Composite(fields) if fields.len() > 1)
    }

    /// Read the key value out of a row.
    ///
    /// Composite keys yield an array of their components. `None` when any
    /// backing field is missing from the row.
    pub fn value_of(&self, row: &Row) -> Option<Value> {
        match self {
            KeyFields::Single(field) => row.get(field).cloned(),
            KeyFields::Composite(fields) => fields
                .iter()
                .map(|f| row.get(f).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Remove the backing fields from a row.
    pub fn strip(&self, row: &mut Row) {
        for field in self.fields() {
            row.shift_remove(field);
        }
    }
}

impl From<&str> for KeyFields {
    fn from(field: &str) -> Self {
        KeyFields::Single(field.to_string())
    }
}

/// Per-node map from key name to backing fields.
pub type KeyMap = IndexMap<String, KeyFields>;

/// A key value normalized for associative lookup.
///
/// SQL drivers disagree on whether an id comes back as `1` or `"1"`, so key
/// values compare by their text form. Composite keys join their components
/// with a unit separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyValue(String);

impl KeyValue {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Array(parts) => KeyValue(
                parts
                    .iter()
                    .map(Value::as_string)
                    .collect::<Vec<_>>()
                    .join("\u{1f}"),
            ),
            Value::Boolean(b) => KeyValue(if *b { "1" } else { "0" }.to_string()),
            other => KeyValue(other.as_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Key names present in both maps, in `left`'s order.
pub fn shared_keys(left: &KeyMap, right: &KeyMap) -> Vec<String> {
    left.keys().filter(|k| right.contains_key(*k)).cloned().collect()
}

/// The unique key name shared by two nodes.
pub fn common_key(left_name: &str, left: &KeyMap, right_name: &str, right: &KeyMap) -> Result<String> {
    let candidates = shared_keys(left, right);
    match candidates.as_slice() {
        [key] => Ok(key.clone()),
        _ => Err(QueryError::KeyMatch {
            left: left_name.to_string(),
            right: right_name.to_string(),
            candidates,
        }),
    }
}

/// The unique key name shared by every map in `maps`.
pub fn common_key_all(name: &str, maps: &[&KeyMap]) -> Result<String> {
    let mut candidates: Vec<String> = match maps.first() {
        Some(first) => first.keys().cloned().collect(),
        None => Vec::new(),
    };
    for map in maps.iter().skip(1) {
        candidates.retain(|k| map.contains_key(k));
    }
    match candidates.as_slice() {
        [key] => Ok(key.clone()),
        _ => Err(QueryError::KeyMatch {
            left: name.to_string(),
            right: "all operands".to_string(),
            candidates,
        }),
    }
}

/// Union of key maps; the first declaration of a name wins.
pub fn union(maps: &[&KeyMap]) -> KeyMap {
    let mut out = KeyMap::new();
    for map in maps {
        for (name, fields) in map.iter() {
            out.entry(name.clone()).or_insert_with(|| fields.clone());
        }
    }
    out
}

/// Deduplicated key values of `rows`, in first-seen order.
///
/// Fails when a row lacks a backing field: the bound field is missing from
/// the returned rows.
pub fn collect_values(rows: &[Row], fields: &KeyFields, node: &str) -> Result<Vec<Value>> {
    let mut seen = std::collections::HashSet::new();
    let mut values = Vec::new();
    for row in rows {
        let value = fields.value_of(row).ok_or_else(|| {
            QueryError::Schema(format!(
                "key field(s) {:?} missing from rows of '{}'",
                fields.fields(),
                node
            ))
        })?;
        if value.is_null() {
            continue;
        }
        if seen.insert(KeyValue::of(&value)) {
            values.push(value);
        }
    }
    Ok(values)
}
