// tests/composition_tests.rs
//
// End-to-end composition against an in-memory SQLite database.

#![cfg(feature = "sqlite")]

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use termql::database::{Bound, Cursor, Database, DatabaseError};
use termql::fragments::JsonDefinition;
use termql::sqlite::SqliteDatabase;
use termql::{
    Callbacks, Config, Direction, Interface, MemoryStore, Outcome, Params, QueryError, Resolver, Row, Shaped, Value,
};

const SCHEMA: &str = r#"
    CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, active INTEGER, city TEXT);
    CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL);
    CREATE TABLE addresses (id INTEGER PRIMARY KEY, user_id INTEGER, street TEXT);
    CREATE TABLE profiles (user_id INTEGER, bio TEXT);
    CREATE TABLE vip (user_id INTEGER, level TEXT);

    INSERT INTO users VALUES (1, 'Ann', 1, 'Oslo'), (2, 'Bob', 1, 'Rome'), (3, 'Cid', 0, 'Oslo');
    INSERT INTO orders VALUES (10, 1, 5.0), (11, 1, 7.5), (12, 2, 3.0);
    INSERT INTO addresses VALUES (20, 1, 'Main St');
    INSERT INTO profiles VALUES (1, 'hello'), (3, 'hi');
    INSERT INTO vip VALUES (2, 'gold'), (3, 'silver');
"#;

/// Records every statement before passing it on.
struct Recording {
    inner: SqliteDatabase,
    statements: RefCell<Vec<String>>,
}

impl Recording {
    fn calls(&self) -> usize {
        self.statements.borrow().len()
    }

    fn reset(&self) {
        self.statements.borrow_mut().clear();
    }
}

impl Database for Recording {
    fn execute_statement(&self, sql: &str, params: &[(String, Bound)]) -> Result<Cursor, DatabaseError> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.execute_statement(sql, params)
    }
}

fn interface(value: serde_json::Value) -> Interface {
    serde_json::from_value(value).unwrap()
}

fn definition(value: serde_json::Value) -> JsonDefinition {
    serde_json::from_value(value).unwrap()
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .compiled(
            "users",
            interface(json!({ "keys": { "user": "id" } })),
            "SELECT id, name, city FROM users ORDER BY id",
        )
        .compiled(
            "active",
            interface(json!({ "keys": { "user": "id" } })),
            "SELECT id, name FROM users WHERE active = 1 ORDER BY id",
        )
        .compiled(
            "inactive",
            interface(json!({ "keys": { "user": "id" } })),
            "SELECT id, name FROM users WHERE active = 0 ORDER BY id",
        )
        .compiled(
            "nobody",
            interface(json!({ "keys": { "user": "id" } })),
            "SELECT id, name FROM users WHERE 0",
        )
        .compiled(
            "profile",
            interface(json!({ "keys": { "user": "user_id" } })),
            "SELECT user_id, bio FROM profiles",
        )
        .compiled(
            "vip",
            interface(json!({ "keys": { "user": "user_id" } })),
            "SELECT user_id, level FROM vip",
        )
        .compiled(
            "no_vip",
            interface(json!({ "keys": { "user": "user_id" } })),
            "SELECT user_id, level FROM vip WHERE 0",
        )
        .compiled(
            "orders",
            interface(json!({ "keys": { "user": "user_id", "order": "order_id" } })),
            "SELECT id AS order_id, user_id, total FROM orders ORDER BY id",
        )
        .compiled(
            "users.addresses",
            interface(json!({ "keys": { "user": "user_id" } })),
            "SELECT user_id, street FROM addresses ORDER BY id",
        )
        .compiled(
            "accounts",
            interface(json!({
                "children": { "orders": { "parent_field": "__user", "child_key": "user" } }
            })),
            "SELECT id, name, id AS __user FROM users ORDER BY id",
        )
        .compiled(
            "orders_by_user",
            interface(json!({
                "params": { "user": { "type": "int" } },
                "keys": { "user": "user_id" }
            })),
            "SELECT id, user_id FROM orders WHERE user_id IN (:user) ORDER BY id",
        )
        .compiled(
            "orders_batched",
            interface(json!({
                "params": { "user": { "type": "int", "batch": 1 } },
                "keys": { "user": "user_id" }
            })),
            "SELECT id, user_id FROM orders WHERE user_id IN (:user) ORDER BY id",
        )
        .compiled(
            "user_count",
            interface(json!({ "output": { "rows": "one", "columns": "one" } })),
            "SELECT COUNT(*) FROM users",
        )
        .compiled(
            "recent",
            interface(json!({
                "params": { "limit": { "type": "int", "default": -1 } },
                "paging": { "limit": "limit" }
            })),
            "SELECT id FROM orders ORDER BY id DESC LIMIT :limit",
        )
        .compiled(
            "user_orders",
            interface(json!({ "output": { "types": { "orders": "json" } } })),
            "SELECT u.id, json_group_array(json_object('order_id', o.id)) AS orders \
             FROM users u LEFT JOIN orders o ON o.user_id = u.id GROUP BY u.id ORDER BY u.id",
        )
        .compiled(
            "user_address",
            interface(json!({})),
            "SELECT u.id, a.id AS \"address.id\", a.street AS \"address.street\" \
             FROM users u LEFT JOIN addresses a ON a.user_id = u.id ORDER BY u.id",
        )
        .compiled(
            "rename_user",
            interface(json!({
                "kind": "update",
                "params": { "id": { "type": "int" }, "name": { "type": "string" } }
            })),
            "UPDATE users SET name = :name WHERE id = :id",
        )
        .compiled(
            "levels",
            interface(json!({ "keys": { "level": "level" } })),
            "SELECT DISTINCT level FROM vip",
        )
        .compiled("broken", interface(json!({})), "SELECT nope FROM missing_table")
        .compiled(
            "first_user",
            interface(json!({ "output": { "rows": "one" }, "keys": { "user": "id" } })),
            "SELECT id, name FROM users WHERE id = 1",
        )
        .compiled(
            "vip_or_guest",
            interface(json!({
                "params": { "user": { "type": "int" } },
                "keys": { "user": "user_id" }
            })),
            "SELECT user_id, level FROM vip WHERE user_id IN (:user) \
             UNION ALL SELECT 4 AS user_id, 'guest' AS level",
        )
        .compiled(
            "double_batched",
            interface(json!({
                "params": {
                    "a": { "type": "int", "batch": 1 },
                    "b": { "type": "int", "batch": 1 }
                }
            })),
            "SELECT id FROM users WHERE id IN (:a) AND id IN (:b)",
        )
        .definition(
            "people",
            definition(json!({
                "select": ["id", "name"],
                "from": "users",
                "where": ["active = 1"],
                "order_by": ["id"],
                "keys": { "user": "id" }
            })),
        )
        .definition(
            "bios",
            definition(json!({
                "select": ["user_id", "bio"],
                "from": "profiles",
                "keys": { "user": "user_id" }
            })),
        )
}

fn setup_with(config: Config, callbacks: Callbacks) -> (Resolver, Rc<Recording>) {
    let inner = SqliteDatabase::open_in_memory().unwrap();
    inner.execute_batch(SCHEMA).unwrap();
    let db = Rc::new(Recording {
        inner,
        statements: RefCell::new(Vec::new()),
    });
    let resolver = Resolver::new(store(), Rc::clone(&db))
        .with_config(config)
        .with_callbacks(callbacks);
    (resolver, db)
}

fn setup() -> (Resolver, Rc<Recording>) {
    setup_with(Config::default(), Callbacks::new())
}

fn select_rows(resolver: &Resolver, term: &str) -> Vec<Row> {
    let query = resolver.resolve(term).unwrap();
    match query.select(&Params::new()).unwrap() {
        Shaped::Rows(rows) => rows,
        other => panic!("Expected rows, got {:?}", other),
    }
}

fn field<'r>(rows: &'r [Row], name: &str) -> Vec<&'r Value> {
    rows.iter().map(|r| &r[name]).collect()
}

fn int(n: i64) -> Value {
    Value::Integer(n)
}

fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

fn params(pairs: Vec<(&str, Value)>) -> Params {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ============================================================================
// Leaves
// ============================================================================

#[test]
fn test_compiled_leaf() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "users");
    assert_eq!(field(&rows, "name"), vec![&text("Ann"), &text("Bob"), &text("Cid")]);
}

#[test]
fn test_json_leaf() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "people");
    assert_eq!(field(&rows, "id"), vec![&int(1), &int(2)]);
}

#[test]
fn test_scalar_leaf() {
    let (resolver, _) = setup();
    let query = resolver.resolve("user_count").unwrap();
    assert_eq!(query.select(&Params::new()).unwrap(), Shaped::Scalar(int(3)));
}

#[test]
fn test_unknown_leaf() {
    let (resolver, _) = setup();
    assert!(matches!(resolver.resolve("ghosts"), Err(QueryError::Schema(_))));
}

#[test]
fn test_parse_error_surfaces() {
    let (resolver, _) = setup();
    assert!(matches!(resolver.resolve("users(orders"), Err(QueryError::Parse(_))));
}

#[test]
fn test_execution_error_names_leaf() {
    let (resolver, _) = setup();
    let query = resolver.resolve("broken").unwrap();
    match query.select(&Params::new()) {
        Err(QueryError::Execution { leaf, .. }) => assert_eq!(leaf, "broken"),
        other => panic!("Expected execution error, got {:?}", other),
    }
}

#[test]
fn test_leaf_post_processing() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "user_orders");
    assert_eq!(
        rows[0]["orders"],
        Value::Array(vec![
            Value::Object([("order_id".to_string(), int(10))].into_iter().collect()),
            Value::Object([("order_id".to_string(), int(11))].into_iter().collect()),
        ])
    );
    // Cid has no orders: the left join artifact becomes an empty list.
    assert_eq!(rows[2]["orders"], Value::Array(Vec::new()));

    let rows = select_rows(&resolver, "user_address");
    assert_eq!(
        rows[0]["address"],
        Value::Object([("id".to_string(), int(20)), ("street".to_string(), text("Main St"))].into_iter().collect())
    );
    assert_eq!(rows[1]["address"], Value::Null);
}

#[test]
fn test_callback() {
    let callbacks = Callbacks::new().register("users", |rows: &mut Vec<Row>| rows.retain(|r| r["city"] == text("Oslo")));
    let (resolver, _) = setup_with(Config::default(), callbacks);
    let rows = select_rows(&resolver, "users");
    assert_eq!(field(&rows, "id"), vec![&int(1), &int(3)]);
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_union_by_key() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "active|inactive");
    assert_eq!(field(&rows, "id"), vec![&int(1), &int(2), &int(3)]);
}

#[test]
fn test_merge_overlapping_rows_merge_fields() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "active|users");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["city"], text("Oslo"));
    assert_eq!(rows[0]["name"], text("Ann"));
}

#[test]
fn test_merge_ordered() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("active|inactive").unwrap();
    query.order("name", Direction::Desc);
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert_eq!(field(&rows, "name"), vec![&text("Cid"), &text("Bob"), &text("Ann")]);
}

#[test]
fn test_merge_max() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("active|inactive").unwrap();
    query.max(2);
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert_eq!(rows.len(), 2);
}

// ============================================================================
// Attach
// ============================================================================

#[test]
fn test_attach_left_join() {
    let (resolver, db) = setup();
    let rows = select_rows(&resolver, "users+profile");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["bio"], text("hello"));
    assert!(!rows[1].contains_key("bio"));
    assert_eq!(rows[2]["bio"], text("hi"));

    // The profile query was restricted to the users' ids.
    let statements = db.statements.borrow();
    assert!(statements[1].contains("IN (1,2,3)"), "{}", statements[1]);
}

#[test]
fn test_attach_json_child() {
    let (resolver, db) = setup();
    let rows = select_rows(&resolver, "users+bios");
    assert_eq!(rows[0]["bio"], text("hello"));
    assert!(db.statements.borrow()[1].contains("(user_id IN (1,2,3))"));
}

#[test]
fn test_attach_short_circuits_on_empty_base() {
    let (resolver, db) = setup();
    let rows = select_rows(&resolver, "nobody+profile");
    assert!(rows.is_empty());
    assert_eq!(db.calls(), 1);
}

#[test]
fn test_attach_without_common_key() {
    let (resolver, _) = setup();
    assert!(matches!(resolver.resolve("users+levels"), Err(QueryError::KeyMatch { .. })));
}

#[test]
fn test_attach_keeps_single_row_base() {
    let (resolver, _) = setup();
    let query = resolver.resolve("first_user+profile").unwrap();
    match query.select(&Params::new()).unwrap() {
        Shaped::Row(Some(row)) => {
            assert_eq!(row["name"], text("Ann"));
            assert_eq!(row["bio"], text("hello"));
        }
        other => panic!("Expected a single row, got {:?}", other),
    }
}

// ============================================================================
// Filter
// ============================================================================

#[test]
fn test_filter_intersection() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "vip:users");
    assert_eq!(field(&rows, "id"), vec![&int(2), &int(3)]);
    assert_eq!(field(&rows, "level"), vec![&text("gold"), &text("silver")]);
    assert_eq!(rows[0]["name"], text("Bob"));
}

#[test]
fn test_filter_chain_stops_when_empty() {
    let (resolver, db) = setup();
    let rows = select_rows(&resolver, "vip:no_vip:users");
    assert!(rows.is_empty());
    // users, then no_vip; vip is never asked.
    assert_eq!(db.calls(), 2);
}

#[test]
fn test_filter_key_limit() {
    let config = Config {
        filter_key_limit: 2,
        ..Config::default()
    };
    let (resolver, _) = setup_with(config, Callbacks::new());
    let query = resolver.resolve("vip:users").unwrap();
    assert!(matches!(
        query.select(&Params::new()),
        Err(QueryError::LimitExceeded { count: 3, limit: 2 })
    ));
}

#[test]
fn test_filter_keeps_unconsumed_narrowing_rows() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "vip_or_guest:active");
    // Bob matched; key 4 only exists on the narrowing side and is appended.
    assert_eq!(field(&rows, "id"), vec![&int(2), &int(4)]);
    assert_eq!(rows[0]["name"], text("Bob"));
    assert_eq!(rows[1]["level"], text("guest"));
    assert!(!rows[1].contains_key("name"));
}

// ============================================================================
// Tree
// ============================================================================

#[test]
fn test_tree_nesting() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "users(orders)");
    assert_eq!(rows.len(), 3);

    let order = |id: i64, total: f64| -> Value {
        Value::Object([("order_id".to_string(), int(id)), ("total".to_string(), Value::Float(total))].into_iter().collect())
    };
    assert_eq!(rows[0]["orders"], Value::Array(vec![order(10, 5.0), order(11, 7.5)]));
    assert_eq!(rows[1]["orders"], Value::Array(vec![order(12, 3.0)]));
    // Unmatched parents get an empty list, never null.
    assert_eq!(rows[2]["orders"], Value::Array(Vec::new()));
}

#[test]
fn test_tree_prefix_resolution() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "users(addresses, orders)");
    assert_eq!(
        rows[0]["addresses"],
        Value::Array(vec![Value::Object([("street".to_string(), text("Main St"))].into_iter().collect())])
    );
    assert_eq!(rows[1]["addresses"], Value::Array(Vec::new()));
    assert!(rows[0].contains_key("orders"));
}

#[test]
fn test_tree_compiled_child_binding() {
    let (resolver, _) = setup();
    let rows = select_rows(&resolver, "accounts(orders)");
    let expected = select_rows(&resolver, "users(orders)");
    assert_eq!(field(&rows, "orders"), field(&expected, "orders"));
    // The join alias does not leak into the output.
    assert!(!rows[0].contains_key("__user"));
}

#[test]
fn test_tree_json_parent() {
    let (resolver, db) = setup();
    let rows = select_rows(&resolver, "people(orders)");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["orders"], Value::Array(vec![Value::Object(
        [("order_id".to_string(), int(12)), ("total".to_string(), Value::Float(3.0))].into_iter().collect()
    )]));
    assert!(rows.iter().all(|r| !r.contains_key("__key_user")));
    assert!(db.statements.borrow()[0].contains("id AS __key_user"));
}

#[test]
fn test_bound_tree() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("users(orders)").unwrap();
    query.bind("user", None);
    let row = query
        .select1(&params(vec![("user", Value::from(vec![2i64]))]))
        .unwrap()
        .unwrap();
    assert_eq!(row["name"], text("Bob"));
    assert_eq!(row["orders"], Value::Array(vec![Value::Object(
        [("order_id".to_string(), int(12)), ("total".to_string(), Value::Float(3.0))].into_iter().collect()
    )]));
}

#[test]
fn test_tree_keeps_single_row_base() {
    let (resolver, _) = setup();
    let query = resolver.resolve("first_user(orders)").unwrap();
    match query.select(&Params::new()).unwrap() {
        Shaped::Row(Some(row)) => {
            assert!(matches!(&row["orders"], Value::Array(orders) if orders.len() == 2));
        }
        other => panic!("Expected a single row, got {:?}", other),
    }
}

#[test]
fn test_tree_parent_links() {
    let (resolver, _) = setup();
    let query = resolver.resolve("users(orders)+profile").unwrap();
    let tree = query.tree();
    let root = tree.root();
    let children = tree.children(root);
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| tree.node(*c).parent == Some(root)));
    assert_eq!(tree.node(root).parent, None);
    assert_eq!(tree.len(), 5);
}

// ============================================================================
// Query handle
// ============================================================================

#[test]
fn test_bind_restricts_rows() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("users").unwrap();
    query.bind("user", None);
    let rows = query
        .select(&params(vec![("user", Value::from(vec![1i64, 3]))]))
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(1), &int(3)]);

    // Without a value the restriction matches nothing.
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_bind_explicit_field_on_json_leaf() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("people").unwrap();
    query.bind("who", Some("name"));
    let rows = query
        .select(&params(vec![("who", Value::from(vec!["Bob"]))]))
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(2)]);
}

#[test]
fn test_params_defaults() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("orders_by_user").unwrap();
    query.params(params(vec![("user", Value::from(vec![1i64]))]));
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert_eq!(rows.len(), 2);

    // Caller values win over defaults.
    let rows = query
        .select(&params(vec![("user", Value::from(vec![2i64]))]))
        .unwrap()
        .into_rows()
        .unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(12)]);
}

#[test]
fn test_global_params() {
    let config = Config {
        global_params: params(vec![("user", Value::from(vec![2i64]))]),
        ..Config::default()
    };
    let (resolver, _) = setup_with(config, Callbacks::new());
    let rows = select_rows(&resolver, "orders_by_user");
    assert_eq!(field(&rows, "id"), vec![&int(12)]);
}

#[test]
fn test_order_sorts_non_merge_root() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("users+profile").unwrap();
    query.order("city", Direction::Desc);
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(2), &int(1), &int(3)]);
}

#[test]
fn test_max_feeds_paging_limit() {
    let (resolver, db) = setup();
    let mut query = resolver.resolve("recent").unwrap();
    query.max(2);
    let rows = query.select(&Params::new()).unwrap().into_rows().unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(12), &int(11)]);
    assert_eq!(db.calls(), 1);

    // Without max the declared default applies.
    let rows = select_rows(&resolver, "recent");
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_group() {
    let (resolver, _) = setup();
    let mut query = resolver.resolve("orders").unwrap();
    query.key("user").group(true);
    let grouped = match query.select(&Params::new()).unwrap() {
        Shaped::Row(Some(row)) => row,
        other => panic!("Expected grouped row, got {:?}", other),
    };
    let keys: Vec<&String> = grouped.keys().collect();
    assert_eq!(keys, vec!["1", "2"]);
    assert!(matches!(&grouped["1"], Value::Array(rows) if rows.len() == 2));
}

#[test]
fn test_select1() {
    let (resolver, _) = setup();
    let query = resolver.resolve("inactive").unwrap();
    let row = query.select1(&Params::new()).unwrap().unwrap();
    assert_eq!(row["name"], text("Cid"));

    let query = resolver.resolve("nobody").unwrap();
    assert_eq!(query.select1(&Params::new()).unwrap(), None);
}

#[test]
fn test_run_write() {
    let (resolver, _) = setup();
    let query = resolver.resolve("rename_user").unwrap();
    let outcome = query
        .run(&params(vec![("id", int(3)), ("name", text("Cyd"))]))
        .unwrap();
    assert_eq!(outcome, Outcome::Affected(1));

    let rows = select_rows(&resolver, "users");
    assert_eq!(rows[2]["name"], text("Cyd"));
}

#[test]
fn test_run_read() {
    let (resolver, _) = setup();
    let query = resolver.resolve("user_count").unwrap();
    assert_eq!(query.run(&Params::new()).unwrap(), Outcome::Selected(Shaped::Scalar(int(3))));
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_batching_equivalence() {
    let (resolver, db) = setup();
    let values = params(vec![("user", Value::from(vec![1i64, 2]))]);

    let plain = resolver.resolve("orders_by_user").unwrap().select(&values).unwrap();
    assert_eq!(db.calls(), 1);
    db.reset();

    let batched = resolver.resolve("orders_batched").unwrap().select(&values).unwrap();
    assert_eq!(db.calls(), 2);
    assert_eq!(batched, plain);
}

#[test]
fn test_batching_on_two_params_fails() {
    let (resolver, db) = setup();
    let query = resolver.resolve("double_batched").unwrap();
    let values = params(vec![("a", Value::from(vec![1i64, 2])), ("b", Value::from(vec![1i64, 2]))]);
    assert!(matches!(query.select(&values), Err(QueryError::Schema(_))));
    assert_eq!(db.calls(), 0);

    // A single oversized parameter still batches.
    let values = params(vec![("a", Value::from(vec![1i64, 2])), ("b", Value::from(vec![1i64]))]);
    let rows = query.select(&values).unwrap().into_rows().unwrap();
    assert_eq!(field(&rows, "id"), vec![&int(1)]);
}
