//! End-to-end tests of the SQL surface through the embedder API.

use vellum::{Database, Document, Error, Value};

fn names_of(db: &Database, sql: &str) -> Vec<String> {
    let mut query = db.query(sql, &[]).unwrap();
    let mut names = Vec::new();
    query
        .iterate(|doc| {
            let Some(Value::Text(name)) = doc.get("name") else {
                panic!("row without a name: {}", doc);
            };
            names.push(name.clone());
            Ok(())
        })
        .unwrap();
    query.close().unwrap();
    names
}

#[test]
fn test_drop_table_with_implicit_unique_index() {
    let db = Database::open(":memory:").unwrap();

    db.exec(
        "CREATE TABLE test1(a INT UNIQUE); CREATE TABLE test2; CREATE TABLE test3",
        &[],
    )
    .unwrap();

    db.exec("DROP TABLE test1", &[]).unwrap();
    db.exec("DROP TABLE IF EXISTS test1", &[]).unwrap();

    // Dropping a table that no longer exists without IF EXISTS fails.
    let res = db.exec("DROP TABLE test1", &[]);
    assert!(matches!(res, Err(Error::TableNotFound(_))));

    // No other table was dropped.
    assert_eq!(
        names_of(&db, "SELECT name FROM __vellum_schema WHERE type = 'table'"),
        ["test2", "test3"]
    );

    // The unique index created with the table is gone too.
    let res = db.query_document(
        "SELECT 1 FROM __vellum_schema WHERE name = 'test1_a_idx'",
        &[],
    );
    assert!(matches!(res, Err(Error::DocumentNotFound)));

    // The system table itself refuses DDL.
    let res = db.exec("DROP TABLE __vellum_schema", &[]);
    assert!(matches!(res, Err(Error::ReadOnlyTable(_))));
}

#[test]
fn test_drop_index_refuses_constraint_bound() {
    let db = Database::open(":memory:").unwrap();

    db.exec(
        "CREATE TABLE t1(foo text, bar int unique); CREATE INDEX idx_t1_foo ON t1(foo)",
        &[],
    )
    .unwrap();

    db.exec("DROP INDEX idx_t1_foo", &[]).unwrap();

    let res = db.exec("DROP INDEX t1_bar_idx", &[]);
    assert!(matches!(res, Err(Error::CannotDropConstraintIndex(_))));

    // The constraint index is still registered.
    db.query_document(
        "SELECT 1 FROM __vellum_schema WHERE name = 't1_bar_idx'",
        &[],
    )
    .unwrap();
}

#[test]
fn test_reindex_only_rebuilds_named_index() {
    let db = Database::open(":memory:").unwrap();

    db.exec(
        r#"CREATE TABLE t;
           INSERT INTO t VALUES {"a": 1, "b": 10}, {"a": 2, "b": 20};
           CREATE INDEX a ON t (a);
           CREATE INDEX b ON t (b);
           DROP INDEX b;
           REINDEX a"#,
        &[],
    )
    .unwrap();

    db.query_document("SELECT 1 FROM __vellum_schema WHERE name = 'a'", &[])
        .unwrap();
    let res = db.query_document("SELECT 1 FROM __vellum_schema WHERE name = 'b'", &[]);
    assert!(matches!(res, Err(Error::DocumentNotFound)));
}

#[test]
fn test_rollback_hides_created_table() {
    let db = Database::open(":memory:").unwrap();

    let mut tx = db.begin(true).unwrap();
    tx.exec("CREATE TABLE t", &[]).unwrap();
    tx.rollback().unwrap();

    let res = db.query_document("SELECT * FROM t", &[]);
    assert!(matches!(res, Err(Error::TableNotFound(_))));
}

#[test]
fn test_sql_transaction_control() {
    let db = Database::open(":memory:").unwrap();

    db.exec("BEGIN", &[]).unwrap();
    db.exec("CREATE TABLE t", &[]).unwrap();
    db.exec(r#"INSERT INTO t VALUES {"n": 1}"#, &[]).unwrap();

    // Reads inside the transaction see the writes.
    db.query_document("SELECT n FROM t", &[]).unwrap();

    db.exec("ROLLBACK", &[]).unwrap();
    let res = db.query_document("SELECT * FROM t", &[]);
    assert!(matches!(res, Err(Error::TableNotFound(_))));

    // Committed work is visible.
    db.exec("BEGIN; CREATE TABLE t; COMMIT", &[]).unwrap();
    db.exec(r#"INSERT INTO t VALUES {"n": 2}"#, &[]).unwrap();
    let doc = db.query_document("SELECT n FROM t", &[]).unwrap();
    assert_eq!(doc.get("n"), Some(&Value::Integer(2)));

    // COMMIT without a transaction fails.
    assert!(db.exec("COMMIT", &[]).is_err());
}

#[test]
fn test_insert_and_query_with_params() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE users", &[]).unwrap();
    for (name, age) in [("alice", 30), ("bob", 25)] {
        db.exec(
            "INSERT INTO users (name, age) VALUES (?, ?)",
            &[Value::text(name), Value::Integer(age)],
        )
        .unwrap();
    }

    let doc = db
        .query_document(
            "SELECT name FROM users WHERE age < ?",
            &[Value::Integer(28)],
        )
        .unwrap();
    assert_eq!(doc.get("name"), Some(&Value::text("bob")));
}

#[test]
fn test_query_stop_sentinel_and_close() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE t", &[]).unwrap();
    for i in 0..10 {
        db.exec("INSERT INTO t (n) VALUES (?)", &[Value::Integer(i)])
            .unwrap();
    }

    let mut query = db.query("SELECT n FROM t", &[]).unwrap();
    let mut count = 0;
    query
        .iterate(|_| {
            count += 1;
            if count == 3 {
                return Err(Error::Stop);
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 3);
    query.close().unwrap();
}

#[test]
fn test_query_rejects_non_select() {
    let db = Database::open(":memory:").unwrap();
    assert!(db.query("CREATE TABLE t", &[]).is_err());
}

#[test]
fn test_system_table_rejects_dml() {
    let db = Database::open(":memory:").unwrap();
    let res = db.exec(r#"INSERT INTO __vellum_schema VALUES {"key": "x"}"#, &[]);
    assert!(matches!(res, Err(Error::ReadOnlyTable(_))));

    let res = db.exec("DELETE FROM __vellum_schema", &[]);
    assert!(matches!(res, Err(Error::ReadOnlyTable(_))));
}

#[test]
fn test_unique_constraint_aborts_statement() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE t (email TEXT UNIQUE)", &[]).unwrap();
    db.exec(r#"INSERT INTO t VALUES {"email": "a@b"}"#, &[])
        .unwrap();

    let res = db.exec(r#"INSERT INTO t VALUES {"email": "a@b"}"#, &[]);
    assert!(matches!(res, Err(Error::DuplicateDocument)));

    // The failed statement left no partial row behind.
    let mut query = db.query("SELECT * FROM t", &[]).unwrap();
    let mut count = 0;
    query
        .iterate(|_| {
            count += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(count, 1);
    query.close().unwrap();
}

#[test]
fn test_primary_key_queries() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE t (id INT PRIMARY KEY)", &[]).unwrap();
    db.exec(
        r#"INSERT INTO t VALUES {"id": 2, "v": "b"}, {"id": 1, "v": "a"}"#,
        &[],
    )
    .unwrap();

    // Iteration follows primary key order, not insertion order.
    let mut query = db.query("SELECT * FROM t", &[]).unwrap();
    let mut ids = Vec::new();
    query
        .iterate(|doc| {
            ids.push(doc.get("id").cloned().unwrap());
            Ok(())
        })
        .unwrap();
    query.close().unwrap();
    assert_eq!(ids, [Value::Integer(1), Value::Integer(2)]);

    // pk() exposes the primary key value.
    let doc = db
        .query_document("SELECT pk() AS key FROM t WHERE v = 'b'", &[])
        .unwrap();
    assert_eq!(doc.get("key"), Some(&Value::Integer(2)));

    let res = db.exec(r#"INSERT INTO t VALUES {"id": 1}"#, &[]);
    assert!(matches!(res, Err(Error::DuplicateDocument)));
}

#[test]
fn test_update_through_view_of_explicit_tx() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE t", &[]).unwrap();
    db.exec(r#"INSERT INTO t VALUES {"n": 1}, {"n": 2}"#, &[])
        .unwrap();

    let mut tx = db.begin(true).unwrap();
    tx.exec("UPDATE t SET n = n * 10 WHERE n = 2", &[]).unwrap();
    let doc = tx
        .query_document("SELECT n FROM t WHERE n = 20", &[])
        .unwrap();
    assert_eq!(doc.get("n"), Some(&Value::Integer(20)));
    tx.commit().unwrap();

    db.query_document("SELECT n FROM t WHERE n = 20", &[])
        .unwrap();
}

#[test]
fn test_json_documents_round_trip() {
    let db = Database::open(":memory:").unwrap();
    db.exec("CREATE TABLE t", &[]).unwrap();
    db.exec(
        r#"INSERT INTO t VALUES {"a": 1, "nested": {"list": [1, 2, "x"], "flag": true}}"#,
        &[],
    )
    .unwrap();

    let doc = db
        .query_document("SELECT nested.list.2 AS item FROM t", &[])
        .unwrap();
    assert_eq!(doc.get("item"), Some(&Value::text("x")));

    let expected = Document::from_json(r#"{"list": [1, 2, "x"], "flag": true}"#).unwrap();
    let doc = db.query_document("SELECT nested FROM t", &[]).unwrap();
    assert_eq!(doc.get("nested"), Some(&Value::Object(expected)));
}
