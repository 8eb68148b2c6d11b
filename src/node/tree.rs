//! `parent(a,b)`: nest the rows of each child under the parent rows they
//! join with.

use super::{ExecContext, NodeId, QueryTree, reshape, scoped};
use crate::error::Result;
use crate::keys::{self, KeyFields, KeyValue};
use crate::rows;
use crate::value::{Params, Shaped, Value};

/// How a Tree child joins its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeJoin {
    /// Parameter restricting the child to the parent's key values.
    pub param: String,
    /// Parent output field(s) holding the join value.
    pub parent: KeyFields,
    /// Child field(s) matched against it.
    pub child: KeyFields,
    /// Whether the parent fields are join-only and dropped from the output.
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub struct TreeChild {
    pub node: NodeId,
    /// Output field the nested rows are assigned to.
    pub field: String,
    pub join: TreeJoin,
}

pub(super) fn execute(
    tree: &QueryTree,
    base: NodeId,
    children: &[TreeChild],
    ctx: &ExecContext<'_>,
    params: &Params,
) -> Result<Shaped> {
    let base_node = tree.node(base);
    let cardinality = base_node.meta.output.rows;

    let mut rows = tree.execute_rows(base, ctx, params)?;
    if rows.is_empty() {
        return Ok(reshape(rows, cardinality));
    }

    for child in children {
        let join = &child.join;
        let values = keys::collect_values(&rows, &join.parent, &base_node.name)?;
        let child_node = tree.node(child.node);
        let fetched = tree.execute_rows(child.node, ctx, &scoped(params, &join.param, values))?;

        let mut groups = rows::group(fetched, &join.child, &child_node.name)?;
        for group in groups.values_mut() {
            group.iter_mut().for_each(|row| join.child.strip(row));
        }

        for row in rows.iter_mut() {
            let nested = join
                .parent
                .value_of(row)
                .and_then(|v| groups.get(&KeyValue::of(&v)))
                .map(|group| group.iter().cloned().map(Value::Object).collect())
                .unwrap_or_default();
            row.insert(child.field.clone(), Value::Array(nested));
        }
    }

    for child in children.iter().filter(|c| c.join.hidden) {
        rows.iter_mut().for_each(|row| child.join.parent.strip(row));
    }

    Ok(reshape(rows, cardinality))
}
