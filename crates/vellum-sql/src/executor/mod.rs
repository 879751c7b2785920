//! Statement executors.
//!
//! Each statement executes against a [`Transaction`] and produces its
//! results through an emit callback, so consumption drives iteration
//! and nothing is materialized unless a sort requires it. The shared
//! row source applies index acceleration when the matcher finds a
//! usable index, and always re-applies the full WHERE expression per
//! row, so acceleration can never change results.

mod ddl;
mod select;
mod write;

use std::cmp::Ordering;

use vellum_common::{Error, Result};
use vellum_core::{Document, Value};
use vellum_db::{Pivot, Table, Transaction};

use crate::ast::{Expr, Statement};
use crate::eval::{evaluate_truthy, loose_compare, Environment};
use crate::matcher::{match_index, IndexMatch};

/// Executes one statement, passing every result document to `emit`.
///
/// `emit` may return [`Error::Stop`] to terminate the stream early.
/// Transaction control statements are rejected here; the embedding
/// session owns the transaction lifecycle.
pub fn execute(
    stmt: &Statement,
    tx: &mut Transaction,
    params: &[Value],
    emit: &mut dyn FnMut(&Document) -> Result<()>,
) -> Result<()> {
    match stmt {
        Statement::Begin { .. } | Statement::Commit | Statement::Rollback => Err(Error::Internal(
            "transaction control statements are executed by the session".into(),
        )),
        Statement::CreateTable {
            name,
            if_not_exists,
            columns,
        } => ddl::create_table(tx, name, *if_not_exists, columns, params),
        Statement::DropTable { name, if_exists } => ddl::drop_table(tx, name, *if_exists),
        Statement::CreateIndex {
            name,
            table,
            path,
            unique,
            if_not_exists,
        } => ddl::create_index(tx, name, table, path, *unique, *if_not_exists),
        Statement::DropIndex { name, if_exists } => ddl::drop_index(tx, name, *if_exists),
        Statement::Reindex { target } => ddl::reindex(tx, target.as_deref()),
        Statement::Insert { table, rows } => write::insert(tx, table, rows, params),
        Statement::Update(update) => write::update(tx, update, params),
        Statement::Delete { table, filter } => write::delete(tx, table, filter.as_ref(), params),
        Statement::Select(select) => select::execute_select(select, tx, params, emit),
    }
}

/// Streams the documents of `table` matching `filter`, in storage order
/// for full scans and index order for accelerated scans.
pub(crate) fn scan_matches(
    tx: &Transaction,
    table: &Table<'_>,
    filter: Option<&Expr>,
    params: &[Value],
    f: &mut dyn FnMut(&[u8], &Document) -> Result<()>,
) -> Result<()> {
    let accelerated = filter.and_then(|expr| match_index(table.indexes(), expr, params));

    match accelerated {
        Some(m) => scan_index(tx, table, &m, filter, params, f),
        None => table.iterate(|pk, doc| {
            if passes(filter, doc, pk, params)? {
                f(pk, doc)
            } else {
                Ok(())
            }
        }),
    }
}

fn passes(filter: Option<&Expr>, doc: &Document, pk: &[u8], params: &[Value]) -> Result<bool> {
    match filter {
        None => Ok(true),
        Some(expr) => {
            let env = Environment {
                document: Some(doc),
                key: Some(pk),
                params,
            };
            evaluate_truthy(expr, &env)
        }
    }
}

fn scan_index(
    tx: &Transaction,
    table: &Table<'_>,
    m: &IndexMatch,
    filter: Option<&Expr>,
    params: &[Value],
    f: &mut dyn FnMut(&[u8], &Document) -> Result<()>,
) -> Result<()> {
    let index = tx.get_index(&m.index.name)?;

    let mut visit = |pk: &[u8]| -> Result<()> {
        let doc = table.get(pk)?;
        if passes(filter, &doc, pk, params)? {
            f(pk, &doc)
        } else {
            Ok(())
        }
    };

    if let Some(values) = &m.range.eq_set {
        let mut stopped = false;
        for value in values {
            index.ascend_greater_or_equal(Pivot::at(value.clone()), |stored, pk| {
                if loose_compare(stored, value) != Some(Ordering::Equal) {
                    return Err(Error::Stop);
                }
                visit(pk).inspect_err(|e| stopped = e.is_stop())
            })?;
            if stopped {
                break;
            }
        }
        return Ok(());
    }

    let pivot = match (&m.range.lower, &m.range.upper) {
        (Some((value, _)), _) => Pivot::at(value.clone()),
        (None, Some((value, _))) => Pivot::for_type(value.value_type()),
        (None, None) => Pivot::default(),
    };

    index.ascend_greater_or_equal(pivot, |stored, pk| {
        if let Some((low, inclusive)) = &m.range.lower {
            if !inclusive && loose_compare(stored, low) == Some(Ordering::Equal) {
                return Ok(());
            }
        }
        if let Some((high, inclusive)) = &m.range.upper {
            match loose_compare(stored, high) {
                Some(Ordering::Greater) => return Err(Error::Stop),
                Some(Ordering::Equal) if !inclusive => return Err(Error::Stop),
                // Past the type section the bound lives in.
                None => return Err(Error::Stop),
                _ => {}
            }
        }
        visit(pk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::sync::Arc;
    use vellum_db::Database;
    use vellum_kv::MemoryEngine;

    fn test_db() -> Database {
        Database::new(Arc::new(MemoryEngine::new()))
    }

    fn exec(tx: &mut Transaction, sql: &str) {
        exec_with(tx, sql, &[]);
    }

    fn exec_with(tx: &mut Transaction, sql: &str, params: &[Value]) {
        for stmt in Parser::parse(sql).unwrap() {
            execute(&stmt, tx, params, &mut |_| Ok(())).unwrap();
        }
    }

    fn query(tx: &mut Transaction, sql: &str) -> Vec<Document> {
        query_with(tx, sql, &[])
    }

    fn query_with(tx: &mut Transaction, sql: &str, params: &[Value]) -> Vec<Document> {
        let stmt = Parser::parse_one(sql).unwrap();
        let mut docs = Vec::new();
        execute(&stmt, tx, params, &mut |doc| {
            docs.push(doc.clone());
            Ok(())
        })
        .unwrap();
        docs
    }

    fn seed(tx: &mut Transaction) {
        exec(
            tx,
            r#"CREATE TABLE users;
               INSERT INTO users VALUES
                 {"name": "alice", "age": 30},
                 {"name": "bob", "age": 25},
                 {"name": "carol", "age": 35}"#,
        );
    }

    #[test]
    fn test_select_where_and_projection() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        seed(&mut tx);

        let docs = query(&mut tx, "SELECT name FROM users WHERE age > 28");
        let names: Vec<&Value> = docs.iter().filter_map(|d| d.get("name")).collect();
        assert_eq!(names, [&Value::text("alice"), &Value::text("carol")]);

        // Unaliased expressions project under their source text.
        let docs = query(&mut tx, "SELECT age + 1 FROM users WHERE name = 'bob'");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("age + 1"), Some(&Value::Integer(26)));
    }

    #[test]
    fn test_select_order_by_limit_offset() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        seed(&mut tx);

        let docs = query(&mut tx, "SELECT name FROM users ORDER BY age DESC");
        let names: Vec<&Value> = docs.iter().filter_map(|d| d.get("name")).collect();
        assert_eq!(
            names,
            [&Value::text("carol"), &Value::text("alice"), &Value::text("bob")]
        );

        let docs = query(
            &mut tx,
            "SELECT name FROM users ORDER BY age ASC LIMIT 1 OFFSET 1",
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("name"), Some(&Value::text("alice")));

        let docs = query(&mut tx, "SELECT * FROM users LIMIT 2");
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_select_order_by_nulls_first() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        exec(
            &mut tx,
            r#"CREATE TABLE t;
               INSERT INTO t VALUES {"n": 2}, {"name": "missing"}, {"n": 1}"#,
        );

        let docs = query(&mut tx, "SELECT * FROM t ORDER BY n");
        assert_eq!(docs[0].get("name"), Some(&Value::text("missing")));
        assert_eq!(docs[1].get("n"), Some(&Value::Integer(1)));
        assert_eq!(docs[2].get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_select_without_from() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        let docs = query(&mut tx, "SELECT 1 + 2 AS three");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("three"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_insert_with_columns() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        exec(
            &mut tx,
            "CREATE TABLE t; INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')",
        );

        let docs = query(&mut tx, "SELECT * FROM t");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get("a"), Some(&Value::Integer(1)));
        assert_eq!(docs[1].get("b"), Some(&Value::text("y")));
    }

    #[test]
    fn test_update_set_and_unset() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        seed(&mut tx);

        exec(
            &mut tx,
            "UPDATE users SET age = age + 1 WHERE name = 'bob'",
        );
        let docs = query(&mut tx, "SELECT age FROM users WHERE name = 'bob'");
        assert_eq!(docs[0].get("age"), Some(&Value::Integer(26)));

        exec(&mut tx, "UPDATE users UNSET age WHERE name = 'bob'");
        let docs = query(&mut tx, "SELECT * FROM users WHERE name = 'bob'");
        assert_eq!(docs[0].get("age"), None);
    }

    #[test]
    fn test_delete_where() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        seed(&mut tx);

        exec(&mut tx, "DELETE FROM users WHERE age < 31");
        let docs = query(&mut tx, "SELECT name FROM users");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("name"), Some(&Value::text("carol")));
    }

    #[test]
    fn test_index_accelerated_select_matches_full_scan() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        exec(&mut tx, "CREATE TABLE t; CREATE INDEX idx_n ON t (n)");
        for i in 0..20 {
            exec_with(
                &mut tx,
                "INSERT INTO t (n, tag) VALUES (?, 'row')",
                &[Value::Integer(i)],
            );
        }

        for filter in [
            "n = 7",
            "n > 15",
            "n >= 15",
            "n < 3",
            "n <= 3",
            "n BETWEEN 5 AND 8",
            "n IN (1, 19, 4)",
            "n > 2 AND n < 6",
        ] {
            let sql = format!("SELECT n FROM t WHERE {}", filter);
            let accelerated = query(&mut tx, &sql);

            // A plain filtered scan over the same rows must agree.
            let expr = Parser::parse_expression(filter).unwrap();
            let mut expected = Vec::new();
            let table = tx.get_table("t").unwrap();
            table
                .iterate(|pk, doc| {
                    if passes(Some(&expr), doc, pk, &[])? {
                        expected.push(doc.get("n").cloned().unwrap());
                    }
                    Ok(())
                })
                .unwrap();
            drop(table);

            let mut got: Vec<Value> =
                accelerated.iter().map(|d| d.get("n").cloned().unwrap()).collect();
            let mut want = expected;
            got.sort_by(|a, b| a.compare(b).unwrap());
            want.sort_by(|a, b| a.compare(b).unwrap());
            assert_eq!(got, want, "filter {:?}", filter);
        }
    }

    #[test]
    fn test_select_respects_limit_with_index() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        exec(&mut tx, "CREATE TABLE t; CREATE INDEX idx_n ON t (n)");
        for i in 0..10 {
            exec_with(&mut tx, "INSERT INTO t (n) VALUES (?)", &[Value::Integer(i)]);
        }

        let docs = query(&mut tx, "SELECT n FROM t WHERE n >= 0 LIMIT 3");
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_transaction_control_rejected() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        let stmt = Parser::parse_one("COMMIT").unwrap();
        let res = execute(&stmt, &mut tx, &[], &mut |_| Ok(()));
        assert!(matches!(res, Err(Error::Internal(_))));
    }

    #[test]
    fn test_reindex_statement() {
        let db = test_db();
        let mut tx = db.begin(true).unwrap();
        exec(
            &mut tx,
            r#"CREATE TABLE t;
               INSERT INTO t VALUES {"a": 1}, {"a": 2};
               CREATE INDEX a ON t (a);
               CREATE INDEX b ON t (b)"#,
        );

        exec(&mut tx, "DROP INDEX b");
        exec(&mut tx, "REINDEX a");

        assert!(tx.get_index("a").is_ok());
        assert!(tx.get_index("b").is_err());

        let stmt = Parser::parse_one("REINDEX missing").unwrap();
        let res = execute(&stmt, &mut tx, &[], &mut |_| Ok(()));
        assert!(matches!(res, Err(Error::IndexNotFound(_))));
    }
}
