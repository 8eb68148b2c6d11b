use std::cell::OnceCell;

use indexmap::IndexMap;
use tracing::debug;

use super::{ExecContext, Node};
use crate::database::Database;
use crate::error::{QueryError, Result};
use crate::fragments::Fragments;
use crate::interface::ChildBinding;
use crate::keys::KeyFields;
use crate::postprocess::PostProcess;
use crate::render;
use crate::value::{Params, Shaped, Value};

/// A restriction of a leaf's rows to the values of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub param: String,
    pub fields: KeyFields,
}

impl Binding {
    pub fn new(param: &str, fields: KeyFields) -> Self {
        Binding {
            param: param.to_string(),
            fields,
        }
    }
}

/// A leaf backed by compiled SQL from the artifact store.
#[derive(Debug)]
pub struct SqlLeaf {
    pub id: String,
    /// Compile-time join metadata for Tree children.
    pub children: IndexMap<String, ChildBinding>,
    bindings: Vec<Binding>,
    sql: OnceCell<String>,
}

impl SqlLeaf {
    pub fn new(id: &str, children: IndexMap<String, ChildBinding>) -> Self {
        SqlLeaf {
            id: id.to_string(),
            children,
            bindings: Vec::new(),
            sql: OnceCell::new(),
        }
    }

    pub(crate) fn add_binding(&mut self, binding: Binding) {
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
            self.sql = OnceCell::new();
        }
    }

    /// Compiled SQL, loaded on first use and cached on this instance.
    ///
    /// Bindings whose parameter the compiled text does not mention wrap it in
    /// an outer restriction.
    pub fn statement(&self, ctx: &ExecContext<'_>) -> Result<&str> {
        if let Some(sql) = self.sql.get() {
            return Ok(sql);
        }
        let compiled = ctx.store.load_compiled_sql(&self.id)?;
        let sql = wrap_bindings(compiled, &self.bindings, ctx.db);
        Ok(self.sql.get_or_init(|| sql))
    }

    pub(crate) fn execute(&self, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<Shaped> {
        let sql = self.statement(ctx)?;
        run_leaf(&self.id, sql, node, ctx, params)
    }

    pub(crate) fn execute_write(&self, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<u64> {
        let sql = self.statement(ctx)?;
        run_write(&self.id, sql, node, ctx, params)
    }
}

fn wrap_bindings(sql: String, bindings: &[Binding], db: &dyn Database) -> String {
    let conditions: Vec<String> = bindings
        .iter()
        .filter(|b| !render::mentions(&sql, &b.param))
        .map(|b| format!("{} IN (:{})", column_list(&b.fields, db, "bound"), b.param))
        .collect();
    if conditions.is_empty() {
        return sql;
    }
    format!(
        "SELECT * FROM ({}) AS bound WHERE {}",
        sql.trim().trim_end_matches(';'),
        conditions.join(" AND ")
    )
}

fn column_list(fields: &KeyFields, db: &dyn Database, table: &str) -> String {
    let column = |field: &String| format!("{}.{}", table, db.quote_identifier(field));
    match fields {
        KeyFields::Single(field) => column(field),
        KeyFields::Composite(fields) => format!(
            "({})",
            fields.iter().map(column).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// A leaf assembled from JSON fragments at run time.
#[derive(Debug)]
pub struct JsonLeaf {
    pub id: String,
    fragments: Fragments,
    sql: OnceCell<String>,
}

impl JsonLeaf {
    pub fn new(id: &str, fragments: Fragments) -> Self {
        JsonLeaf {
            id: id.to_string(),
            fragments,
            sql: OnceCell::new(),
        }
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    /// Append the restriction to `where`, selecting the fields if missing.
    pub(crate) fn bind(&mut self, param: &str, fields: &KeyFields) {
        for field in fields.fields() {
            if !self.fragments.selects(field) {
                self.fragments.select.push(field.clone());
            }
        }
        let columns = match fields {
            KeyFields::Single(field) => field.clone(),
            KeyFields::Composite(fields) => format!("({})", fields.join(", ")),
        };
        self.fragments
            .conditions
            .push(format!("{} IN (:{})", columns, param));
        self.sql = OnceCell::new();
    }

    /// Select `expr` under a synthetic alias, used as a Tree join field.
    pub(crate) fn add_alias(&mut self, expr: &str, alias: &str) {
        self.fragments.select.push(format!("{} AS {}", expr, alias));
        self.sql = OnceCell::new();
    }

    pub fn statement(&self) -> Result<&str> {
        if let Some(sql) = self.sql.get() {
            return Ok(sql);
        }
        let sql = self.fragments.to_sql(&self.id)?;
        Ok(self.sql.get_or_init(|| sql))
    }

    pub(crate) fn execute(&self, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<Shaped> {
        run_leaf(&self.id, self.statement()?, node, ctx, params)
    }

    pub(crate) fn execute_write(&self, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<u64> {
        run_write(&self.id, self.statement()?, node, ctx, params)
    }
}

/// Caller values, then the paging limit, declared defaults and global
/// defaults.
fn effective_params(node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Params {
    let mut values = params.clone();
    if let (Some(paging), Some(max)) = (&node.meta.paging, node.meta.output.max) {
        values
            .entry(paging.limit.clone())
            .or_insert(Value::Integer(max as i64));
    }
    for (name, spec) in &node.meta.params {
        if let Some(default) = &spec.default {
            values
                .entry(name.clone())
                .or_insert_with(|| default.clone());
        }
    }
    for (name, value) in &ctx.config.global_params {
        values
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }
    values
}

/// The one parameter to split into batches, with its batch size.
fn batched_param<'v>(id: &str, node: &Node, values: &'v Params) -> Result<Option<(&'v str, usize, &'v [Value])>> {
    let mut batched = Vec::new();
    for (name, spec) in &node.meta.params {
        let Some(size) = spec.batch else { continue };
        if let Some((name, Value::Array(items))) = values.get_key_value(name) {
            if items.len() > size.max(1) {
                batched.push((name.as_str(), size.max(1), items.as_slice()));
            }
        }
    }
    match batched.len() {
        0 => Ok(None),
        1 => Ok(batched.pop()),
        _ => Err(QueryError::Schema(format!(
            "leaf '{}' requests batching on several parameters at once: {:?}",
            id,
            batched.iter().map(|(name, ..)| *name).collect::<Vec<_>>()
        ))),
    }
}

fn run_leaf(id: &str, sql: &str, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<Shaped> {
    let values = effective_params(node, ctx, params);

    let shaped = match batched_param(id, node, &values)? {
        None => run_once(id, sql, node, ctx, &values)?,
        Some((name, size, items)) => {
            debug!(leaf = id, param = name, values = items.len(), size, "batching leaf");
            let mut acc: Option<Shaped> = None;
            for chunk in items.chunks(size) {
                let mut batch = values.clone();
                batch.insert(name.to_string(), Value::Array(chunk.to_vec()));
                let next = run_once(id, sql, node, ctx, &batch)?;
                acc = Some(match acc {
                    None => next,
                    Some(prev) => concat(prev, next),
                });
            }
            match acc {
                Some(shaped) => shaped,
                None => run_once(id, sql, node, ctx, &values)?,
            }
        }
    };

    Ok(match shaped {
        Shaped::Rows(rows) => {
            let post = PostProcess {
                nested: node.meta.output.nested,
                separator: &ctx.config.nested_separator,
                types: &node.meta.output.types,
                callback: ctx.callbacks.get(id),
            };
            Shaped::Rows(post.apply(rows))
        }
        other => other,
    })
}

fn run_once(id: &str, sql: &str, node: &Node, ctx: &ExecContext<'_>, values: &Params) -> Result<Shaped> {
    let rendered = render::render(sql, values, &node.meta.params, ctx.db)?;
    debug!(leaf = id, sql = %rendered.sql, bound = rendered.bound.len(), "executing leaf");
    let cursor = ctx
        .db
        .execute_statement(&rendered.sql, &rendered.bound)
        .map_err(|source| QueryError::Execution {
            leaf: id.to_string(),
            source,
        })?;
    let output = &node.meta.output;
    let shaped = cursor.fetch(output.rows, output.columns);
    debug!(leaf = id, empty = shaped.is_empty(), "leaf returned");
    Ok(shaped)
}

fn run_write(id: &str, sql: &str, node: &Node, ctx: &ExecContext<'_>, params: &Params) -> Result<u64> {
    let values = effective_params(node, ctx, params);
    let rendered = render::render(sql, &values, &node.meta.params, ctx.db)?;
    debug!(leaf = id, kind = ?node.meta.kind, sql = %rendered.sql, "executing write");
    ctx.db
        .execute_statement(&rendered.sql, &rendered.bound)
        .map(|cursor| cursor.affected)
        .map_err(|source| QueryError::Execution {
            leaf: id.to_string(),
            source,
        })
}

/// Concatenate batch results in order.
fn concat(prev: Shaped, next: Shaped) -> Shaped {
    match (prev, next) {
        (Shaped::Rows(mut a), Shaped::Rows(b)) => {
            a.extend(b);
            Shaped::Rows(a)
        }
        (Shaped::Scalars(mut a), Shaped::Scalars(b)) => {
            a.extend(b);
            Shaped::Scalars(a)
        }
        (Shaped::Row(None), next) => next,
        (Shaped::Scalar(Value::Null), next) => next,
        (prev, _) => prev,
    }
}
