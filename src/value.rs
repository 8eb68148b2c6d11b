use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An ordered mapping of field name to value, as returned by one SQL row.
///
/// Field order is the column order of the statement that produced the row and
/// is preserved through every composition step.
pub type Row = IndexMap<String, Value>;

/// Named parameter values handed to a query execution.
///
/// Sequence values (`Value::Array`) drive IN-list rendering and key
/// propagation between joined nodes.
pub type Params = IndexMap<String, Value>;

/// A value flowing through the query engine.
///
/// This type represents all JSON types with a distinction between integers and
/// floats, which the declared output types (`int` / `float`) rely on.
///
/// # Examples
///
/// ```
/// use termql::{Row, Value};
///
/// let mut row = Row::new();
/// row.insert("id".to_string(), Value::Integer(1));
/// row.insert("name".to_string(), Value::String("Bob".to_string()));
///
/// let value = Value::Object(row);
/// assert!(value.is_object());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// SQL NULL / JSON null
    #[default]
    Null,

    /// Boolean
    Boolean(bool),

    /// Floating-point number
    Float(f64),

    /// Integer number (preserved separately from floats)
    Integer(i64),

    /// UTF-8 string
    String(String),

    /// Ordered sequence of values
    Array(Vec<Value>),

    /// Nested row
    Object(Row),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Float(n) => Some(n.round() as i64),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
            }
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Get as string (concatenation)
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Float(n) => n.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => String::new(),
            other => serde_json::Value::from(other.clone()).to_string(),
        }
    }

    /// True when this value is null, or a nested row whose every leaf is null.
    pub fn is_null_branch(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Object(row) => row.values().all(Value::is_null_branch),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Integer(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(obj) => serde_json::Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(arr) => arr.serialize(serializer),
            Value::Object(row) => row.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// The result of executing a node, with its shape fixed at the leaf boundary.
///
/// A leaf's declared (row cardinality x column cardinality) selects one of
/// these four shapes; composite nodes always work on `Rows` internally and
/// unwrap back to `Row` when their base was single-row.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    /// One row, one column
    Scalar(Value),
    /// Many rows, one column
    Scalars(Vec<Value>),
    /// One row, many columns (`None` when the statement produced no row)
    Row(Option<Row>),
    /// Many rows, many columns
    Rows(Vec<Row>),
}

impl Shaped {
    /// Normalize to a row sequence. Scalar shapes cannot take part in joins.
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Shaped::Rows(rows) => Some(rows),
            Shaped::Row(row) => Some(row.into_iter().collect()),
            Shaped::Scalar(_) | Shaped::Scalars(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Shaped::Scalar(v) => v.is_null(),
            Shaped::Scalars(values) => values.is_empty(),
            Shaped::Row(row) => row.is_none(),
            Shaped::Rows(rows) => rows.is_empty(),
        }
    }

    /// Convert to a plain value tree, e.g. for JSON output.
    pub fn into_value(self) -> Value {
        match self {
            Shaped::Scalar(v) => v,
            Shaped::Scalars(values) => Value::Array(values),
            Shaped::Row(row) => row.map(Value::Object).unwrap_or(Value::Null),
            Shaped::Rows(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        }
    }
}
