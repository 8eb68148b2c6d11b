//! Query node trees.
//!
//! A resolved term becomes an arena of [`Node`]s addressed by [`NodeId`].
//! Each node carries its metadata (keys, params, output shape), fixed by the
//! build pass, and one [`NodeKind`] selecting its composition algorithm.
//! Execution only reads the tree; no row state survives between executions.

mod attach;
mod filter;
mod leaf;
mod merge;
mod tree;

use std::borrow::Cow;

pub use leaf::{Binding, JsonLeaf, SqlLeaf};
pub use tree::{TreeChild, TreeJoin};

use crate::config::Config;
use crate::database::Database;
use crate::error::{QueryError, Result};
use crate::interface::{Cardinality, OutputShape, ParamSpec, ParamSpecs, Paging, StatementKind};
use crate::keys::{KeyFields, KeyMap};
use crate::postprocess::Callbacks;
use crate::rows;
use crate::store::ArtifactStore;
use crate::value::{Params, Row, Shaped, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Build-time metadata of a node.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub keys: KeyMap,
    pub params: ParamSpecs,
    pub output: OutputShape,
    /// Resolves unqualified child ids of a Tree rooted here.
    pub prefix: Option<String>,
    /// Parameter values set with `Query::params`, below caller values.
    pub defaults: Params,
    pub kind: StatementKind,
    pub paging: Option<Paging>,
}

#[derive(Debug)]
pub enum NodeKind {
    Sql(SqlLeaf),
    Json(JsonLeaf),
    Merge(Vec<NodeId>),
    Attach { children: Vec<NodeId>, key: String },
    Filter { children: Vec<NodeId>, key: String },
    Tree { base: NodeId, children: Vec<TreeChild> },
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub meta: Metadata,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Sql(_) | NodeKind::Json(_))
    }

    /// Fields backing `key` on this node; an undeclared key is taken as a
    /// field name.
    pub fn key_fields(&self, key: &str) -> KeyFields {
        self.meta
            .keys
            .get(key)
            .cloned()
            .unwrap_or_else(|| KeyFields::Single(key.to_string()))
    }
}

/// Collaborators an execution reads from.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub db: &'a dyn Database,
    pub store: &'a dyn ArtifactStore,
    pub callbacks: &'a Callbacks,
    pub config: &'a Config,
}

#[derive(Debug, Default)]
pub struct QueryTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl QueryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Child node ids of `id`, in declaration order (a Tree's base first).
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            NodeKind::Sql(_) | NodeKind::Json(_) => Vec::new(),
            NodeKind::Merge(children)
            | NodeKind::Attach { children, .. }
            | NodeKind::Filter { children, .. } => children.clone(),
            NodeKind::Tree { base, children } => std::iter::once(*base)
                .chain(children.iter().map(|c| c.node))
                .collect(),
        }
    }

    /// Execute the node with the given parameter values.
    ///
    /// A declared order sorts the rows (Merge orders while merging), then
    /// `max` truncates them.
    pub fn execute(&self, id: NodeId, ctx: &ExecContext<'_>, params: &Params) -> Result<Shaped> {
        let node = self.node(id);
        let params = with_defaults(params, &node.meta.defaults);

        let shaped = match &node.kind {
            NodeKind::Sql(leaf) => leaf.execute(node, ctx, &params)?,
            NodeKind::Json(leaf) => leaf.execute(node, ctx, &params)?,
            NodeKind::Merge(children) => merge::execute(self, id, children, ctx, &params)?,
            NodeKind::Attach { children, key } => attach::execute(self, children, key, ctx, &params)?,
            NodeKind::Filter { children, key } => filter::execute(self, children, key, ctx, &params)?,
            NodeKind::Tree { base, children } => tree::execute(self, *base, children, ctx, &params)?,
        };
        let shaped = match (shaped, &node.meta.output.order) {
            (Shaped::Rows(mut rows), Some(order)) if !matches!(node.kind, NodeKind::Merge(_)) => {
                rows::sort_rows(&mut rows, order);
                Shaped::Rows(rows)
            }
            (shaped, _) => shaped,
        };
        Ok(truncate(shaped, node.meta.output.max))
    }

    /// Execute a node that must produce rows.
    pub(crate) fn execute_rows(&self, id: NodeId, ctx: &ExecContext<'_>, params: &Params) -> Result<Vec<Row>> {
        self.execute(id, ctx, params)?.into_rows().ok_or_else(|| {
            QueryError::Schema(format!(
                "'{}' returns scalar output and cannot be composed",
                self.node(id).name
            ))
        })
    }

    /// Execute a create/update/delete leaf, returning the affected row count.
    pub fn execute_write(&self, id: NodeId, ctx: &ExecContext<'_>, params: &Params) -> Result<u64> {
        let node = self.node(id);
        let params = with_defaults(params, &node.meta.defaults);
        match &node.kind {
            NodeKind::Sql(leaf) => leaf.execute_write(node, ctx, &params),
            NodeKind::Json(leaf) => leaf.execute_write(node, ctx, &params),
            _ => Err(QueryError::Schema(format!(
                "'{}' is a composite query and cannot be written through",
                node.name
            ))),
        }
    }

    /// Restrict `id` to rows whose `fields` take one of `param`'s values.
    ///
    /// `fields` defaults to the node's key named `param`, else a field named
    /// `param`. Composite nodes bind their base (Attach, Tree) or every child
    /// (Merge, Filter).
    pub fn bind(&mut self, id: NodeId, param: &str, fields: Option<KeyFields>) {
        let declared = self.node(id).meta.params.contains_key(param);
        let fields = fields.unwrap_or_else(|| self.node(id).key_fields(param));

        let targets = match &mut self.node_mut(id).kind {
            NodeKind::Sql(leaf) => {
                leaf.add_binding(Binding::new(param, fields.clone()));
                Vec::new()
            }
            NodeKind::Json(leaf) => {
                if !declared {
                    leaf.bind(param, &fields);
                }
                Vec::new()
            }
            NodeKind::Merge(children) | NodeKind::Filter { children, .. } => children.clone(),
            NodeKind::Attach { children, .. } => children.iter().take(1).copied().collect(),
            NodeKind::Tree { base, .. } => vec![*base],
        };

        for child in targets {
            let child_fields = if self.node(child).meta.keys.contains_key(param) {
                None
            } else {
                Some(fields.clone())
            };
            self.bind(child, param, child_fields);
        }

        self.node_mut(id)
            .meta
            .params
            .entry(param.to_string())
            .or_insert_with(ParamSpec::default);
    }
}

fn with_defaults<'p>(params: &'p Params, defaults: &Params) -> Cow<'p, Params> {
    if defaults.is_empty() {
        return Cow::Borrowed(params);
    }
    let mut merged = params.clone();
    for (name, value) in defaults {
        merged.entry(name.clone()).or_insert_with(|| value.clone());
    }
    Cow::Owned(merged)
}

/// Parameters with `name` set to the key values of a joined base.
pub(crate) fn scoped(params: &Params, name: &str, values: Vec<Value>) -> Params {
    let mut scoped = params.clone();
    scoped.insert(name.to_string(), Value::Array(values));
    scoped
}

/// Shape rows back to the base's cardinality.
pub(crate) fn reshape(rows: Vec<Row>, cardinality: Cardinality) -> Shaped {
    match cardinality {
        Cardinality::One => Shaped::Row(rows.into_iter().next()),
        Cardinality::Many => Shaped::Rows(rows),
    }
}

fn truncate(shaped: Shaped, max: Option<usize>) -> Shaped {
    match (shaped, max) {
        (Shaped::Rows(mut rows), Some(max)) => {
            rows.truncate(max);
            Shaped::Rows(rows)
        }
        (Shaped::Scalars(mut values), Some(max)) => {
            values.truncate(max);
            Shaped::Scalars(values)
        }
        (shaped, _) => shaped,
    }
}
