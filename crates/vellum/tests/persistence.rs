//! On-disk database lifecycle tests.

use vellum::{Database, Error, Value};

#[test]
fn test_reopen_preserves_tables_and_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.log");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.exec("CREATE TABLE users (email TEXT UNIQUE)", &[]).unwrap();
        db.exec(
            r#"INSERT INTO users VALUES {"email": "a@b", "n": 1}"#,
            &[],
        )
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(path).unwrap();
    let doc = db
        .query_document("SELECT n FROM users WHERE email = 'a@b'", &[])
        .unwrap();
    assert_eq!(doc.get("n"), Some(&Value::Integer(1)));

    // The unique index survived the reopen.
    let res = db.exec(r#"INSERT INTO users VALUES {"email": "a@b"}"#, &[]);
    assert!(matches!(res, Err(Error::DuplicateDocument)));
}

#[test]
fn test_uncommitted_work_is_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.log");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.exec("CREATE TABLE t", &[]).unwrap();

        let mut tx = db.begin(true).unwrap();
        tx.exec(r#"INSERT INTO t VALUES {"n": 1}"#, &[]).unwrap();
        tx.rollback().unwrap();
    }

    let db = Database::open(path).unwrap();
    let res = db.query_document("SELECT * FROM t", &[]);
    assert!(matches!(res, Err(Error::DocumentNotFound)));
}

#[test]
fn test_auto_increment_continues_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.log");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path).unwrap();
        db.exec("CREATE TABLE t", &[]).unwrap();
        db.exec(r#"INSERT INTO t VALUES {"n": 1}, {"n": 2}"#, &[])
            .unwrap();
    }

    let db = Database::open(path).unwrap();
    db.exec(r#"INSERT INTO t VALUES {"n": 3}"#, &[]).unwrap();

    let mut keys = Vec::new();
    let mut query = db.query("SELECT pk() AS k FROM t", &[]).unwrap();
    query
        .iterate(|doc| {
            keys.push(doc.get("k").cloned().unwrap());
            Ok(())
        })
        .unwrap();
    query.close().unwrap();

    assert_eq!(
        keys,
        [Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}
