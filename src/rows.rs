//! Pure row utilities shared by the composition nodes.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::error::{QueryError, Result};
use crate::interface::{Direction, OrderBy};
use crate::keys::{KeyFields, KeyValue};
use crate::value::{Row, Value};

fn missing_key(fields: &KeyFields, node: &str) -> QueryError {
    QueryError::Schema(format!(
        "key field(s) {:?} missing from rows of '{}'",
        fields.fields(),
        node
    ))
}

/// Index rows by key. Rows repeating a key are field-merged into the first.
pub fn associate(rows: Vec<Row>, fields: &KeyFields, node: &str) -> Result<IndexMap<KeyValue, Row>> {
    let mut out: IndexMap<KeyValue, Row> = IndexMap::with_capacity(rows.len());
    for row in rows {
        let key = fields
            .value_of(&row)
            .map(|v| KeyValue::of(&v))
            .ok_or_else(|| missing_key(fields, node))?;
        match out.get_mut(&key) {
            Some(existing) => merge_fields(existing, row)?,
            None => {
                out.insert(key, row);
            }
        }
    }
    Ok(out)
}

/// Group rows by key, keeping row order inside each group.
pub fn group(rows: Vec<Row>, fields: &KeyFields, node: &str) -> Result<IndexMap<KeyValue, Vec<Row>>> {
    let mut out: IndexMap<KeyValue, Vec<Row>> = IndexMap::new();
    for row in rows {
        let key = fields
            .value_of(&row)
            .map(|v| KeyValue::of(&v))
            .ok_or_else(|| missing_key(fields, node))?;
        out.entry(key).or_default().push(row);
    }
    Ok(out)
}

/// Merge `source`'s fields into `target`.
///
/// Scalars overwrite scalars and nested rows merge field by field. A nested
/// row meeting a non-null scalar (either way round) is a conflict. Null never
/// erases a nested row.
pub fn merge_fields(target: &mut Row, source: Row) -> Result<()> {
    for (field, incoming) in source {
        match target.get_mut(&field) {
            Some(existing) => merge_value(&field, existing, incoming)?,
            None => {
                target.insert(field, incoming);
            }
        }
    }
    Ok(())
}

fn merge_value(field: &str, existing: &mut Value, incoming: Value) -> Result<()> {
    let conflict = || QueryError::FieldConflict {
        field: field.to_string(),
    };
    match incoming {
        Value::Object(source) => match existing {
            Value::Object(target) => merge_fields(target, source),
            Value::Null => {
                *existing = Value::Object(source);
                Ok(())
            }
            _ => Err(conflict()),
        },
        Value::Null if existing.is_object() => Ok(()),
        _ if existing.is_object() => Err(conflict()),
        incoming => {
            *existing = incoming;
            Ok(())
        }
    }
}

/// Total order used for ordered insertion: null < bool < number < string < rest.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) if rank(x) == 2 && rank(y) == 2 => match (x.as_float(), y.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (x, y) => rank(x).cmp(&rank(y)),
    }
}

fn order_value<'r>(row: &'r Row, field: &str) -> &'r Value {
    static NULL: Value = Value::Null;
    row.get(field).unwrap_or(&NULL)
}

/// Whether `row` sorts strictly before `other` under `order`.
fn sorts_before(row: &Row, other: &Row, order: &OrderBy) -> bool {
    let ord = compare_values(order_value(row, &order.field), order_value(other, &order.field));
    match order.direction {
        Direction::Asc => ord == Ordering::Less,
        Direction::Desc => ord == Ordering::Greater,
    }
}

/// Position at which `row` is inserted: before the first row it strictly
/// precedes, so equal rows keep their arrival order. Linear scan.
pub fn insert_position<'a>(rows: impl IntoIterator<Item = &'a Row>, row: &Row, order: &OrderBy) -> Option<usize> {
    rows.into_iter().position(|existing| sorts_before(row, existing, order))
}

/// Insert `row` keeping `rows` ordered by `order`.
pub fn insert_ordered(rows: &mut Vec<Row>, row: Row, order: &OrderBy) {
    match insert_position(rows.iter(), &row, order) {
        Some(i) => rows.insert(i, row),
        None => rows.push(row),
    }
}

/// Stable sort by `order`.
pub fn sort_rows(rows: &mut [Row], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let ord = compare_values(order_value(a, &order.field), order_value(b, &order.field));
        match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
}

/// Order-preserving multiway merge of row lists by key.
///
/// The first list fixes the initial order. Rows of later lists whose key is
/// already present merge into that row; new keys are inserted at their
/// `order` position, or appended when no order is given.
pub fn merge_by_key(
    sources: Vec<(String, Vec<Row>, KeyFields)>,
    order: Option<&OrderBy>,
) -> Result<IndexMap<KeyValue, Row>> {
    let mut merged: IndexMap<KeyValue, Row> = IndexMap::new();
    for (node, rows, fields) in sources {
        for (key, row) in associate(rows, &fields, &node)? {
            if let Some(existing) = merged.get_mut(&key) {
                merge_fields(existing, row)?;
                continue;
            }
            let position = order.and_then(|o| insert_position(merged.values(), &row, o));
            match position {
                Some(i) => {
                    merged.shift_insert(i, key, row);
                }
                None => {
                    merged.insert(key, row);
                }
            }
        }
    }
    Ok(merged)
}

/// Remove and return the first row whose key equals `key`.
pub fn splice_key(rows: &mut Vec<Row>, fields: &KeyFields, key: &KeyValue) -> Option<Row> {
    let index = rows.iter().position(|row| {
        fields
            .value_of(row)
            .is_some_and(|v| KeyValue::of(&v) == *key)
    })?;
    Some(rows.remove(index))
}

/// Collapse nested rows whose every leaf is null into null, bottom-up.
pub fn collapse_nulls(value: Value) -> Value {
    match value {
        Value::Object(row) => {
            let row: Row = row.into_iter().map(|(k, v)| (k, collapse_nulls(v))).collect();
            if !row.is_empty() && row.values().all(Value::is_null) {
                Value::Null
            } else {
                Value::Object(row)
            }
        }
        other => other,
    }
}

/// Place `value` at `path` inside `row`, creating nested rows as needed.
///
/// A non-null scalar already occupying a prefix of the path is kept and the
/// value is dropped; null placeholders are replaced.
pub fn insert_path(row: &mut Row, path: &[&str], value: Value) -> bool {
    let Some((head, rest)) = path.split_first() else {
        return false;
    };
    if rest.is_empty() {
        row.insert(head.to_string(), value);
        return true;
    }
    let slot = row
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Row::new()));
    if slot.is_null() {
        *slot = Value::Object(Row::new());
    }
    match slot {
        Value::Object(inner) => insert_path(inner, rest, value),
        _ => false,
    }
}

/// Expand `a.b.c` field names into nested rows.
pub fn unflatten(row: Row, separator: &str) -> Row {
    let mut out = Row::with_capacity(row.len());
    for (field, value) in row {
        if field.contains(separator) {
            let path: Vec<&str> = field.split(separator).collect();
            insert_path(&mut out, &path, value);
        } else {
            out.insert(field, value);
        }
    }
    out
}

/// Collapse nested rows back into `a.b.c` field names.
pub fn flatten(row: Row, separator: &str) -> Row {
    let mut out = Row::with_capacity(row.len());
    flatten_into(&mut out, None, row, separator);
    out
}

fn flatten_into(out: &mut Row, prefix: Option<&str>, row: Row, separator: &str) {
    for (field, value) in row {
        let name = match prefix {
            Some(p) => format!("{}{}{}", p, separator, field),
            None => field,
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&name), inner, separator),
            other => {
                out.insert(name, other);
            }
        }
    }
}
