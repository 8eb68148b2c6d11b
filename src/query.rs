//! The handle returned by [`crate::Resolver::resolve`].

use crate::error::{QueryError, Result};
use crate::interface::{Direction, OrderBy, OutputShape, StatementKind};
use crate::keys::{KeyFields, KeyValue};
use crate::node::QueryTree;
use crate::resolver::Resolver;
use crate::rows;
use crate::term::Term;
use crate::value::{Params, Row, Shaped, Value};

/// Result of [`Query::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Selected(Shaped),
    /// Rows touched by a create/update/delete leaf.
    Affected(u64),
}

/// A resolved term, ready to execute any number of times.
///
/// The builder methods adjust the root node before execution:
///
/// ```no_run
/// # use termql::{Resolver, Direction, Params};
/// # fn demo(resolver: &Resolver) -> termql::Result<()> {
/// let mut query = resolver.resolve("user(orders)")?;
/// query.order("name", Direction::Asc).max(10);
/// let users = query.select(&Params::new())?;
/// # Ok(())
/// # }
/// ```
pub struct Query<'r> {
    resolver: &'r Resolver,
    term: Term,
    tree: QueryTree,
}

impl<'r> Query<'r> {
    pub(crate) fn new(resolver: &'r Resolver, term: Term, tree: QueryTree) -> Self {
        Query { resolver, term, tree }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn tree(&self) -> &QueryTree {
        &self.tree
    }

    /// Restrict the rows to those whose `field` takes one of `param`'s
    /// values. Without a field, the key named `param` (or a field of that
    /// name) is used.
    pub fn bind(&mut self, param: &str, field: Option<&str>) -> &mut Self {
        let root = self.tree.root();
        self.tree.bind(root, param, field.map(KeyFields::from));
        self
    }

    /// Key results are merged and grouped on.
    pub fn key(&mut self, field: &str) -> &mut Self {
        self.root_output().key = Some(field.to_string());
        self
    }

    pub fn order(&mut self, field: &str, direction: Direction) -> &mut Self {
        self.root_output().order = Some(OrderBy::new(field, direction));
        self
    }

    /// Return rows grouped by key instead of as a sequence.
    pub fn group(&mut self, grouped: bool) -> &mut Self {
        self.root_output().grouped = grouped;
        self
    }

    pub fn max(&mut self, n: usize) -> &mut Self {
        self.root_output().max = Some(n);
        self
    }

    /// Parameter values used whenever the caller does not supply them.
    pub fn params(&mut self, values: Params) -> &mut Self {
        let root = self.tree.root();
        self.tree.node_mut(root).meta.defaults.extend(values);
        self
    }

    fn root_output(&mut self) -> &mut OutputShape {
        let root = self.tree.root();
        &mut self.tree.node_mut(root).meta.output
    }

    pub fn select(&self, params: &Params) -> Result<Shaped> {
        let ctx = self.resolver.context();
        let root = self.tree.root();
        let shaped = self.tree.execute(root, &ctx, params)?;

        let node = self.tree.node(root);
        if !node.meta.output.grouped {
            return Ok(shaped);
        }
        let key = node
            .meta
            .output
            .key
            .clone()
            .or_else(|| node.meta.keys.keys().next().cloned())
            .ok_or_else(|| QueryError::Schema(format!("cannot group '{}': it declares no key", node.name)))?;
        let rows = shaped
            .into_rows()
            .ok_or_else(|| QueryError::Schema(format!("cannot group scalar output of '{}'", node.name)))?;

        let groups = rows::group(rows, &node.key_fields(&key), &node.name)?;
        let grouped: Row = groups
            .into_iter()
            .map(|(value, rows): (KeyValue, Vec<Row>)| {
                let rows = rows.into_iter().map(Value::Object).collect();
                (value.as_str().to_string(), Value::Array(rows))
            })
            .collect();
        Ok(Shaped::Row(Some(grouped)))
    }

    /// The first row of [`Query::select`].
    pub fn select1(&self, params: &Params) -> Result<Option<Row>> {
        match self.select(params)? {
            Shaped::Row(row) => Ok(row),
            Shaped::Rows(rows) => Ok(rows.into_iter().next()),
            Shaped::Scalar(_) | Shaped::Scalars(_) => Err(QueryError::Schema(format!(
                "'{}' returns scalar output, not rows",
                self.term
            ))),
        }
    }

    /// Select for read queries; execute the statement of a create, update or
    /// delete leaf.
    pub fn run(&self, params: &Params) -> Result<Outcome> {
        let root = self.tree.root();
        match self.tree.node(root).meta.kind {
            StatementKind::Read => self.select(params).map(Outcome::Selected),
            StatementKind::Create | StatementKind::Update | StatementKind::Delete => {
                let ctx = self.resolver.context();
                self.tree.execute_write(root, &ctx, params).map(Outcome::Affected)
            }
        }
    }
}
