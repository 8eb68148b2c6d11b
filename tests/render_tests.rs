// tests/render_tests.rs

use termql::database::{Bound, Cursor, Database, DatabaseError};
use termql::interface::{ParamSpec, ParamSpecs, ParamType};
use termql::render::{bind_value, literal_list, mentions, render};
use termql::{Params, QueryError, Value};

/// Renders with the default literal escaping; never executes anything.
struct NoDb;

impl Database for NoDb {
    fn execute_statement(&self, _sql: &str, _params: &[(String, Bound)]) -> Result<Cursor, DatabaseError> {
        Ok(Cursor::default())
    }
}

fn params(pairs: Vec<(&str, Value)>) -> Params {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn specs(pairs: Vec<(&str, ParamType)>) -> ParamSpecs {
    pairs
        .into_iter()
        .map(|(k, ty)| {
            (
                k.to_string(),
                ParamSpec {
                    ty,
                    ..ParamSpec::default()
                },
            )
        })
        .collect()
}

#[test]
fn test_scalar_is_bound() {
    let rendered = render(
        "SELECT * FROM users WHERE id = :id AND name = :name",
        &params(vec![("id", Value::String("7".into())), ("name", Value::from("Ann"))]),
        &specs(vec![("id", ParamType::Int)]),
        &NoDb,
    )
    .unwrap();
    assert_eq!(rendered.sql, "SELECT * FROM users WHERE id = :id AND name = :name");
    assert_eq!(
        rendered.bound,
        vec![
            ("id".to_string(), Bound::Int(7)),
            ("name".to_string(), Bound::Text("Ann".to_string())),
        ]
    );
}

#[test]
fn test_repeated_placeholder_is_bound_once() {
    let rendered = render(
        "SELECT :x AS a, :x AS b",
        &params(vec![("x", Value::Integer(1))]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(rendered.bound, vec![("x".to_string(), Bound::Int(1))]);
}

#[test]
fn test_sequence_is_inlined() {
    let rendered = render(
        "SELECT * FROM users WHERE id IN (:ids) AND city IN (:cities)",
        &params(vec![
            ("ids", Value::from(vec![1i64, 2, 3])),
            ("cities", Value::from(vec!["Oslo", "O'Hare"])),
        ]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM users WHERE id IN (1,2,3) AND city IN ('Oslo','O''Hare')"
    );
    assert!(rendered.bound.is_empty());
}

#[test]
fn test_empty_sequence_matches_nothing() {
    let rendered = render(
        "SELECT * FROM users WHERE id IN (:ids)",
        &params(vec![("ids", Value::Array(Vec::new()))]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(rendered.sql, "SELECT * FROM users WHERE id IN (NULL)");
}

#[test]
fn test_tuple_sequence_and_positions() {
    let pairs = Value::Array(vec![
        Value::Array(vec![Value::Integer(1), Value::from("a")]),
        Value::Array(vec![Value::Integer(2), Value::from("b")]),
    ]);
    let rendered = render(
        "SELECT * FROM stock WHERE (shop, sku) IN (:pairs) OR shop IN (:pairs__0) OR sku IN (:pairs__1)",
        &params(vec![("pairs", pairs)]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM stock WHERE (shop, sku) IN ((1,'a'),(2,'b')) OR shop IN (1,2) OR sku IN ('a','b')"
    );
}

#[test]
fn test_unregistered_placeholder_is_null() {
    let rendered = render(
        "SELECT * FROM users WHERE deleted_at IS :deleted",
        &Params::new(),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(rendered.sql, "SELECT * FROM users WHERE deleted_at IS NULL");
    assert!(rendered.bound.is_empty());
}

#[test]
fn test_type_casts_are_left_alone() {
    let rendered = render(
        "SELECT created::date FROM users WHERE id = :id",
        &params(vec![("id", Value::Integer(1))]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(rendered.sql, "SELECT created::date FROM users WHERE id = :id");
    assert_eq!(rendered.bound.len(), 1);
}

#[test]
fn test_mentions() {
    assert!(mentions("SELECT * FROM t WHERE a = :user", "user"));
    assert!(!mentions("SELECT * FROM t WHERE a = :user_id", "user"));
    assert!(!mentions("SELECT x::user FROM t", "user"));
}

#[test]
fn test_literal_list() {
    let items = vec![Value::Null, Value::Boolean(true), Value::Float(1.5), Value::from("x")];
    assert_eq!(literal_list(&items, &NoDb), "NULL,1,1.5,'x'");
}

#[test]
fn test_quoted_text_is_left_alone() {
    let rendered = render(
        "SELECT * FROM events WHERE at = '10:30:ab' AND note = 'it''s :note' AND \"a:b\" = :id",
        &params(vec![("id", Value::Integer(1)), ("note", Value::from("x"))]),
        &ParamSpecs::new(),
        &NoDb,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        "SELECT * FROM events WHERE at = '10:30:ab' AND note = 'it''s :note' AND \"a:b\" = :id"
    );
    assert_eq!(rendered.bound, vec![("id".to_string(), Bound::Int(1))]);
    assert!(!mentions("SELECT ':user' FROM t", "user"));
}

#[test]
fn test_mistyped_scalar_is_rejected() {
    let err = render(
        "SELECT * FROM users WHERE id = :n",
        &params(vec![("n", Value::from("abc"))]),
        &specs(vec![("n", ParamType::Int)]),
        &NoDb,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::Schema(msg) if msg.contains("'n'")));
}

#[test]
fn test_bind_value_per_type() {
    assert_eq!(bind_value(&Value::from("42"), ParamType::Int), Some(Bound::Int(42)));
    assert_eq!(bind_value(&Value::from("abc"), ParamType::Int), None);
    assert_eq!(bind_value(&Value::from("abc"), ParamType::Float), None);
    assert_eq!(bind_value(&Value::Integer(3), ParamType::String), Some(Bound::Text("3".to_string())));
    assert_eq!(bind_value(&Value::Integer(2), ParamType::Float), Some(Bound::Float(2.0)));
    assert_eq!(bind_value(&Value::Boolean(true), ParamType::Any), Some(Bound::Int(1)));
    assert_eq!(bind_value(&Value::Null, ParamType::Int), Some(Bound::Null));
}
