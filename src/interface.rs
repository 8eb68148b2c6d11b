//! Leaf interface artifacts: the declared parameter and output schema of a
//! leaf query, as produced by the compiler alongside its SQL.
//!
//! ```json
//! {
//!   "params": { "user": { "type": "int", "batch": 500 } },
//!   "output": { "rows": "many", "types": { "id": "int", "meta": "json" } },
//!   "keys": { "user": "id" },
//!   "children": { "orders": { "parent_field": "__key_user", "child_key": "user" } }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::keys::KeyMap;
use crate::value::Value;

/// Whether a leaf reads rows or modifies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    #[default]
    Read,
    Create,
    Update,
    Delete,
}

/// Declared type of a scalar parameter, used when binding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    String,
    Bool,
    #[default]
    Any,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type", default)]
    pub ty: ParamType,

    #[serde(default)]
    pub default: Option<Value>,

    /// Split sequence values longer than this into successive executions.
    #[serde(default)]
    pub batch: Option<usize>,
}

pub type ParamSpecs = IndexMap<String, ParamSpec>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    #[default]
    Many,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        OrderBy {
            field: field.into(),
            direction,
        }
    }
}

/// Declared type of an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int,
    Float,
    String,
    Json,
    Child,
}

/// A field type: a scalar cast, or a nested object with its own field types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDecl {
    Scalar(ScalarType),
    Object(TypeMap),
}

pub type TypeMap = IndexMap<String, TypeDecl>;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputShape {
    #[serde(default)]
    pub rows: Cardinality,

    #[serde(default)]
    pub columns: Cardinality,

    /// Key name (or field) results are merged on.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub order: Option<OrderBy>,

    #[serde(default)]
    pub grouped: bool,

    /// Dot-unnest `a.b` field names.
    #[serde(default = "default_true")]
    pub nested: bool,

    #[serde(default)]
    pub max: Option<usize>,

    #[serde(default)]
    pub types: TypeMap,
}

impl Default for OutputShape {
    fn default() -> Self {
        OutputShape {
            rows: Cardinality::Many,
            columns: Cardinality::Many,
            key: None,
            order: None,
            grouped: false,
            nested: true,
            max: None,
            types: TypeMap::new(),
        }
    }
}

/// Parameters a leaf uses for paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Parameter receiving `max` as the row limit.
    pub limit: String,
}

/// Compile-time join metadata for a Tree child of a compiled leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildBinding {
    /// Output field of the parent holding the join value.
    pub parent_field: String,
    /// Key name on the child the value is matched against.
    pub child_key: String,
}

/// Declared schema of one leaf.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub kind: StatementKind,

    #[serde(default)]
    pub params: ParamSpecs,

    #[serde(default)]
    pub output: OutputShape,

    #[serde(default)]
    pub keys: KeyMap,

    #[serde(default)]
    pub paging: Option<Paging>,

    #[serde(default)]
    pub children: IndexMap<String, ChildBinding>,

    #[serde(default)]
    pub aliases: IndexMap<String, String>,
}
