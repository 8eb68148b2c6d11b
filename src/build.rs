//! Term -> node tree.
//!
//! Building happens in one pass, children before parents:
//!
//! 1. each leaf id is resolved against the artifact store, compiled first and
//!    JSON definition second; inside a Tree, unqualified ids are tried with
//!    the Tree's id as prefix first
//! 2. operands are linked: Attach and Filter auto-bind their non-base
//!    operands to the shared key, Tree children are bound to their join key
//! 3. each composite node receives its metadata, the union of its operands'
//!    (Merge, Filter) or a copy of its base's (Attach, Tree)
//!
//! The result is never patched again except through the [`crate::Query`]
//! handle's builder methods.

use tracing::debug;

use crate::error::{QueryError, Result};
use crate::interface::{Interface, ParamSpecs};
use crate::keys::{self, KeyFields, KeyMap};
use crate::node::{JsonLeaf, Metadata, Node, NodeId, NodeKind, QueryTree, SqlLeaf, TreeChild, TreeJoin};
use crate::parser::AliasLookup;
use crate::store::{ArtifactStore, StoreError};
use crate::term::Term;
use crate::value::Params;

/// Prefix of select aliases added to JSON parents to carry a Tree join key.
pub const KEY_ALIAS_PREFIX: &str = "__key_";

/// Build the node tree of `term`.
pub fn build(term: &Term, store: &dyn ArtifactStore) -> Result<QueryTree> {
    let mut builder = Builder {
        store,
        tree: QueryTree::new(),
    };
    let root = builder.add(term, None)?;
    builder.tree.set_root(root);
    Ok(builder.tree)
}

struct Builder<'s> {
    store: &'s dyn ArtifactStore,
    tree: QueryTree,
}

impl Builder<'_> {
    fn add(&mut self, term: &Term, prefix: Option<&str>) -> Result<NodeId> {
        match term {
            Term::Leaf(id) => self.leaf(id, prefix),
            Term::Merge(terms) => {
                let children = self.add_all(terms, prefix)?;
                let meta = self.union_meta(&children);
                Ok(self.push(term.to_string(), NodeKind::Merge(children), meta))
            }
            Term::Filter(terms) => {
                let children = self.add_all(terms, prefix)?;
                let key = self.shared_key(&term.to_string(), &children)?;
                if let Some((_, narrowing)) = children.split_last() {
                    for child in narrowing {
                        self.tree.bind(*child, &key, None);
                    }
                }
                let meta = self.union_meta(&children);
                Ok(self.push(term.to_string(), NodeKind::Filter { children, key }, meta))
            }
            Term::Attach(terms) => {
                let children = self.add_all(terms, prefix)?;
                let key = self.shared_key(&term.to_string(), &children)?;
                for child in children.iter().skip(1) {
                    self.tree.bind(*child, &key, None);
                }
                let meta = self.base_meta(children[0]);
                Ok(self.push(term.to_string(), NodeKind::Attach { children, key }, meta))
            }
            Term::Tree(id, terms) => self.tree_node(id, terms, prefix),
        }
    }

    fn add_all(&mut self, terms: &[Term], prefix: Option<&str>) -> Result<Vec<NodeId>> {
        if terms.is_empty() {
            return Err(QueryError::Schema("composite term without operands".to_string()));
        }
        terms.iter().map(|t| self.add(t, prefix)).collect()
    }

    fn push(&mut self, name: String, kind: NodeKind, meta: Metadata) -> NodeId {
        let id = self.tree.push(Node {
            name,
            kind,
            parent: None,
            meta,
        });
        for child in self.tree.children(id) {
            self.tree.node_mut(child).parent = Some(id);
        }
        id
    }

    fn leaf(&mut self, id: &str, prefix: Option<&str>) -> Result<NodeId> {
        let candidates: Vec<String> = match prefix {
            Some(prefix) => vec![format!("{}.{}", prefix, id), id.to_string()],
            None => vec![id.to_string()],
        };

        for candidate in &candidates {
            if let Some((kind, interface)) = self.resolve_leaf(candidate)? {
                let meta = leaf_meta(interface);
                return Ok(self.push(candidate.clone(), kind, meta));
            }
        }
        Err(QueryError::Schema(format!("unknown leaf '{}'", id)))
    }

    /// Compiled artifacts first, then the JSON definition. `None` when the
    /// store has neither.
    fn resolve_leaf(&self, id: &str) -> Result<Option<(NodeKind, Interface)>> {
        match self.store.load_interface(id) {
            Ok(interface) => {
                let leaf = SqlLeaf::new(id, interface.children.clone());
                return Ok(Some((NodeKind::Sql(leaf), interface)));
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        debug!(leaf = id, "no compiled artifacts, trying json definition");
        match self.store.load_json_definition(id) {
            Ok(definition) => {
                let leaf = JsonLeaf::new(id, definition.fragments);
                Ok(Some((NodeKind::Json(leaf), definition.interface)))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn tree_node(&mut self, id: &str, terms: &[Term], prefix: Option<&str>) -> Result<NodeId> {
        let base = self.leaf(id, prefix)?;
        let base_name = self.tree.node(base).name.clone();

        let mut children = Vec::with_capacity(terms.len());
        for term in terms {
            let node = self.add(term, Some(&base_name))?;
            let join = self.link(base, node, term.label())?;
            self.tree.bind(node, &join.param, Some(join.child.clone()));
            children.push(TreeChild {
                node,
                field: term.label().to_string(),
                join,
            });
        }

        let mut meta = self.base_meta(base);
        meta.prefix = Some(base_name.clone());
        Ok(self.push(base_name, NodeKind::Tree { base, children }, meta))
    }

    /// Decide how `child` joins `parent`.
    ///
    /// Compiled parents carry the join in their child bindings. Otherwise the
    /// single shared key is used; a JSON parent additionally selects the key
    /// under a synthetic alias so the join value is always present.
    fn link(&mut self, parent: NodeId, child: NodeId, label: &str) -> Result<TreeJoin> {
        let child_name = self.tree.node(child).name.clone();

        if let NodeKind::Sql(leaf) = &self.tree.node(parent).kind {
            let binding = leaf
                .children
                .get(label)
                .or_else(|| leaf.children.get(&child_name));
            if let Some(binding) = binding {
                return Ok(TreeJoin {
                    param: binding.child_key.clone(),
                    parent: KeyFields::Single(binding.parent_field.clone()),
                    child: self.tree.node(child).key_fields(&binding.child_key),
                    hidden: binding.parent_field.starts_with("__"),
                });
            }
        }

        let (parent_node, child_node) = (self.tree.node(parent), self.tree.node(child));
        let key = keys::common_key(
            &parent_node.name,
            &parent_node.meta.keys,
            &child_node.name,
            &child_node.meta.keys,
        )?;
        let fields = parent_node.key_fields(&key);
        let child_fields = child_node.key_fields(&key);

        let (parent_fields, hidden) = match &mut self.tree.node_mut(parent).kind {
            NodeKind::Json(leaf) => {
                let aliases: Vec<String> = match &fields {
                    KeyFields::Single(_) => vec![format!("{}{}", KEY_ALIAS_PREFIX, key)],
                    KeyFields::Composite(parts) => (0..parts.len())
                        .map(|i| format!("{}{}_{}", KEY_ALIAS_PREFIX, key, i))
                        .collect(),
                };
                for (expr, alias) in fields.fields().iter().zip(&aliases) {
                    if !leaf.fragments().selects(alias) {
                        leaf.add_alias(expr, alias);
                    }
                }
                let parent_fields = match aliases.as_slice() {
                    [alias] => KeyFields::Single(alias.clone()),
                    _ => KeyFields::Composite(aliases),
                };
                (parent_fields, true)
            }
            _ => (fields, false),
        };

        Ok(TreeJoin {
            param: key,
            parent: parent_fields,
            child: child_fields,
            hidden,
        })
    }

    fn shared_key(&self, name: &str, children: &[NodeId]) -> Result<String> {
        let maps: Vec<&KeyMap> = children.iter().map(|c| &self.tree.node(*c).meta.keys).collect();
        keys::common_key_all(name, &maps)
    }

    fn union_meta(&self, children: &[NodeId]) -> Metadata {
        let nodes: Vec<&Node> = children.iter().map(|c| self.tree.node(*c)).collect();
        let maps: Vec<&KeyMap> = nodes.iter().map(|n| &n.meta.keys).collect();
        let mut params = ParamSpecs::new();
        for node in &nodes {
            for (name, spec) in &node.meta.params {
                params.entry(name.clone()).or_insert_with(|| spec.clone());
            }
        }
        Metadata {
            keys: keys::union(&maps),
            params,
            ..Metadata::default()
        }
    }

    fn base_meta(&self, base: NodeId) -> Metadata {
        let base = &self.tree.node(base).meta;
        let mut meta = Metadata {
            keys: base.keys.clone(),
            params: base.params.clone(),
            ..Metadata::default()
        };
        meta.output.rows = base.output.rows;
        meta
    }
}

fn leaf_meta(interface: Interface) -> Metadata {
    Metadata {
        keys: interface.keys,
        params: interface.params,
        output: interface.output,
        prefix: None,
        defaults: Params::new(),
        kind: interface.kind,
        paging: interface.paging,
    }
}

/// Alias lookup backed by the `aliases` each leaf declares.
pub struct StoreAliases<'s> {
    pub store: &'s dyn ArtifactStore,
}

impl AliasLookup for StoreAliases<'_> {
    fn alias(&self, parent: &str, child: &str) -> Option<String> {
        let aliases = match self.store.load_interface(parent) {
            Ok(interface) => interface.aliases,
            Err(_) => self.store.load_json_definition(parent).ok()?.interface.aliases,
        };
        aliases.get(child).cloned()
    }
}
