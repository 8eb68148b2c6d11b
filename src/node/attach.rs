//! `base+a+b`: left-join of `a` and `b` onto the rows of `base`.

use super::{ExecContext, NodeId, QueryTree, reshape, scoped};
use crate::error::{QueryError, Result};
use crate::keys::{self, KeyValue};
use crate::rows;
use crate::value::{Params, Shaped};

pub(super) fn execute(
    tree: &QueryTree,
    children: &[NodeId],
    key: &str,
    ctx: &ExecContext<'_>,
    params: &Params,
) -> Result<Shaped> {
    let Some((base, rest)) = children.split_first() else {
        return Err(QueryError::Schema("attach without operands".to_string()));
    };
    let base_node = tree.node(*base);
    let cardinality = base_node.meta.output.rows;

    let mut rows = tree.execute_rows(*base, ctx, params)?;
    if rows.is_empty() {
        return Ok(reshape(rows, cardinality));
    }

    let base_fields = base_node.key_fields(key);
    let values = keys::collect_values(&rows, &base_fields, &base_node.name)?;
    let restricted = scoped(params, key, values);

    for child in rest {
        let child_node = tree.node(*child);
        let fetched = tree.execute_rows(*child, ctx, &restricted)?;
        let lookup = rows::associate(fetched, &child_node.key_fields(key), &child_node.name)?;
        for row in rows.iter_mut() {
            let Some(value) = base_fields.value_of(row) else {
                continue;
            };
            if let Some(found) = lookup.get(&KeyValue::of(&value)) {
                rows::merge_fields(row, found.clone())?;
            }
        }
    }

    Ok(reshape(rows, cardinality))
}
