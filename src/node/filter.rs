//! `a:b:base`: intersection chain. The last operand is the base; walking
//! right to left, every other operand narrows and enriches it.

use std::collections::HashSet;

use tracing::debug;

use super::{ExecContext, NodeId, QueryTree, scoped};
use crate::error::{QueryError, Result};
use crate::keys::{self, KeyFields, KeyValue};
use crate::rows;
use crate::value::{Params, Row, Shaped};

pub(super) fn execute(
    tree: &QueryTree,
    children: &[NodeId],
    key: &str,
    ctx: &ExecContext<'_>,
    params: &Params,
) -> Result<Shaped> {
    let Some((base, narrowing)) = children.split_last() else {
        return Err(QueryError::Schema("filter without operands".to_string()));
    };
    let base_node = tree.node(*base);
    let base_fields = base_node.key_fields(key);
    let mut rows = tree.execute_rows(*base, ctx, params)?;

    for child in narrowing.iter().rev() {
        if rows.is_empty() {
            break;
        }
        let values = keys::collect_values(&rows, &base_fields, &base_node.name)?;
        let limit = ctx.config.filter_key_limit;
        if values.len() > limit {
            return Err(QueryError::LimitExceeded {
                count: values.len(),
                limit,
            });
        }

        let child_node = tree.node(*child);
        let child_fields = child_node.key_fields(key);
        let fetched = tree.execute_rows(*child, ctx, &scoped(params, key, values))?;
        let mut lookup = rows::associate(fetched, &child_fields, &child_node.name)?;

        let mut consumed = HashSet::new();
        let before = rows.len();
        rows = rows
            .into_iter()
            .filter_map(|mut row| {
                let key = base_fields.value_of(&row).map(|v| KeyValue::of(&v))?;
                let found = lookup.get(&key)?.clone();
                consumed.insert(key);
                Some(rows::merge_fields(&mut row, found).map(|()| row))
            })
            .collect::<Result<Vec<_>>>()?;

        // Narrowing queries may report keys the base never had (aggregates);
        // those rows are kept too.
        lookup.retain(|k, _| !consumed.contains(k));
        for (_, row) in lookup {
            rows.push(rekey(row, &child_fields, &base_fields));
        }
        debug!(node = %child_node.name, before, after = rows.len(), "filter step");
    }

    Ok(Shaped::Rows(rows))
}

/// Copy the key value of a narrowing row into the base's key fields, so the
/// next step can read it.
fn rekey(mut row: Row, from: &KeyFields, to: &KeyFields) -> Row {
    if from == to {
        return row;
    }
    let values: Vec<_> = from.fields().iter().map(|f| row.get(f).cloned()).collect();
    for (field, value) in to.fields().iter().zip(values) {
        if let Some(value) = value {
            row.entry(field.clone()).or_insert(value);
        }
    }
    row
}
