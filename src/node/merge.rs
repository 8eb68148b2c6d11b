//! `a|b|c`: union of several queries over the same entity.

use tracing::debug;

use super::{ExecContext, NodeId, QueryTree};
use crate::error::Result;
use crate::keys::{self, KeyMap};
use crate::rows;
use crate::value::{Params, Row, Shaped};

/// The merge key: the declared output key, else the one key every child
/// shares. `None` when no child declares any key.
pub(super) fn merge_key(tree: &QueryTree, id: NodeId, children: &[NodeId]) -> Result<Option<String>> {
    let node = tree.node(id);
    if let Some(key) = &node.meta.output.key {
        return Ok(Some(key.clone()));
    }
    let maps: Vec<&KeyMap> = children.iter().map(|c| &tree.node(*c).meta.keys).collect();
    if maps.iter().all(|m| m.is_empty()) {
        return Ok(None);
    }
    keys::common_key_all(&node.name, &maps).map(Some)
}

pub(super) fn execute(
    tree: &QueryTree,
    id: NodeId,
    children: &[NodeId],
    ctx: &ExecContext<'_>,
    params: &Params,
) -> Result<Shaped> {
    let node = tree.node(id);
    let key = merge_key(tree, id, children)?;
    let order = node.meta.output.order.as_ref();

    let mut results = Vec::with_capacity(children.len());
    for child in children {
        results.push((*child, tree.execute_rows(*child, ctx, params)?));
    }

    let rows: Vec<Row> = match key {
        None => {
            let mut merged = Vec::new();
            for (_, rows) in results {
                match order {
                    // O(n^2): each row scans for its place.
                    Some(order) => rows
                        .into_iter()
                        .for_each(|row| rows::insert_ordered(&mut merged, row, order)),
                    None => merged.extend(rows),
                }
            }
            merged
        }
        Some(key) => {
            debug!(node = %node.name, key = %key, "merging by key");
            let sources = results
                .into_iter()
                .map(|(child, rows)| {
                    let child = tree.node(child);
                    (child.name.clone(), rows, child.key_fields(&key))
                })
                .collect();
            rows::merge_by_key(sources, order)?.into_values().collect()
        }
    };

    Ok(Shaped::Rows(rows))
}
