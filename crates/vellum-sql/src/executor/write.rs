//! INSERT, UPDATE and DELETE execution.
//!
//! UPDATE and DELETE run in two phases: matched rows are collected
//! first, then mutated, so the scan never observes its own writes.

use vellum_common::{Error, Result};
use vellum_core::{Document, Value};
use vellum_db::{Table, Transaction};

use crate::ast::{Expr, InsertRows, UpdateStmt};
use crate::eval::{evaluate, Environment};
use crate::executor::scan_matches;

fn writable_table<'tx>(tx: &'tx Transaction, name: &str) -> Result<Table<'tx>> {
    let table = tx.get_table(name)?;
    if table.config().read_only {
        return Err(Error::ReadOnlyTable(name.to_string()));
    }
    Ok(table)
}

pub(crate) fn insert(
    tx: &Transaction,
    table_name: &str,
    rows: &InsertRows,
    params: &[Value],
) -> Result<()> {
    let table = writable_table(tx, table_name)?;
    let env = Environment::with_params(params);

    match rows {
        InsertRows::Documents(exprs) => {
            for expr in exprs {
                let doc = match evaluate(expr, &env)? {
                    Value::Object(doc) => doc,
                    other => {
                        return Err(Error::TypeMismatch(format!(
                            "INSERT expects documents, got {}",
                            other.value_type()
                        )))
                    }
                };
                table.insert(&doc)?;
            }
        }
        InsertRows::Values { columns, rows } => {
            for row in rows {
                let mut doc = Document::new();
                for (column, expr) in columns.iter().zip(row) {
                    doc.set(column.clone(), evaluate(expr, &env)?);
                }
                table.insert(&doc)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn update(tx: &Transaction, stmt: &UpdateStmt, params: &[Value]) -> Result<()> {
    let table = writable_table(tx, &stmt.table)?;

    let mut matched: Vec<(Vec<u8>, Document)> = Vec::new();
    scan_matches(tx, &table, stmt.filter.as_ref(), params, &mut |pk, doc| {
        matched.push((pk.to_vec(), doc.clone()));
        Ok(())
    })?;

    for (pk, original) in matched {
        let env = Environment {
            document: Some(&original),
            key: Some(&pk),
            params,
        };

        let mut edited = original.clone();
        for (path, expr) in &stmt.set {
            let value = evaluate(expr, &env)?;
            edited.set_by_path(path, value)?;
        }
        for path in &stmt.unset {
            edited.unset_by_path(path);
        }

        table.replace(&pk, &edited)?;
    }
    Ok(())
}

pub(crate) fn delete(
    tx: &Transaction,
    table_name: &str,
    filter: Option<&Expr>,
    params: &[Value],
) -> Result<()> {
    let table = writable_table(tx, table_name)?;

    let mut matched: Vec<Vec<u8>> = Vec::new();
    scan_matches(tx, &table, filter, params, &mut |pk, _| {
        matched.push(pk.to_vec());
        Ok(())
    })?;

    for pk in matched {
        table.delete(&pk)?;
    }
    Ok(())
}
