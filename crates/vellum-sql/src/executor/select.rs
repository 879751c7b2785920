//! SELECT execution.
//!
//! The pipeline is source -> filter -> optional sort -> project ->
//! offset/limit. Without an ORDER BY nothing is materialized: rows
//! stream from the source and the limit stops the scan with the
//! iteration sentinel.

use vellum_common::{Error, Result};
use vellum_core::encoding::encode_value;
use vellum_core::{Document, Value};
use vellum_db::Transaction;

use crate::ast::{Expr, Projection, SelectStmt};
use crate::eval::{evaluate, Environment};
use crate::executor::scan_matches;

pub(crate) fn execute_select(
    stmt: &SelectStmt,
    tx: &Transaction,
    params: &[Value],
    emit: &mut dyn FnMut(&Document) -> Result<()>,
) -> Result<()> {
    let offset = clause_count(stmt.offset.as_ref(), "OFFSET", params)?.unwrap_or(0);
    let limit = clause_count(stmt.limit.as_ref(), "LIMIT", params)?;

    let Some(table_name) = &stmt.table else {
        return select_without_table(stmt, params, emit, offset, limit);
    };
    let table = tx.get_table(table_name)?;

    if let Some((order_path, descending)) = &stmt.order_by {
        // Sorting materializes the matched rows, keyed by the encoded
        // value at the sort path so null sorts first and numbers
        // interleave.
        let mut rows: Vec<(Vec<u8>, Vec<u8>, Document)> = Vec::new();
        scan_matches(tx, &table, stmt.filter.as_ref(), params, &mut |pk, doc| {
            let sort_value = order_path
                .get_in_document(doc)
                .cloned()
                .unwrap_or(Value::Null)
                .normalize_number();
            rows.push((encode_value(&sort_value), pk.to_vec(), doc.clone()));
            Ok(())
        })?;

        rows.sort_by(|a, b| a.0.cmp(&b.0));
        if *descending {
            rows.reverse();
        }

        let mut emitted = 0usize;
        for (_, pk, doc) in rows.into_iter().skip(offset) {
            if limit.is_some_and(|max| emitted >= max) {
                break;
            }
            let projected = project(&stmt.projections, &doc, Some(&pk), params)?;
            emitted += 1;
            match emit(&projected) {
                Ok(()) => {}
                Err(Error::Stop) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        return Ok(());
    }

    let mut skipped = 0usize;
    let mut emitted = 0usize;
    scan_matches(tx, &table, stmt.filter.as_ref(), params, &mut |pk, doc| {
        if skipped < offset {
            skipped += 1;
            return Ok(());
        }
        if limit.is_some_and(|max| emitted >= max) {
            return Err(Error::Stop);
        }
        let projected = project(&stmt.projections, doc, Some(pk), params)?;
        emitted += 1;
        emit(&projected)?;
        if limit.is_some_and(|max| emitted >= max) {
            return Err(Error::Stop);
        }
        Ok(())
    })
}

fn select_without_table(
    stmt: &SelectStmt,
    params: &[Value],
    emit: &mut dyn FnMut(&Document) -> Result<()>,
    offset: usize,
    limit: Option<usize>,
) -> Result<()> {
    if stmt.filter.is_some() || stmt.order_by.is_some() {
        return Err(Error::Parse(
            "WHERE and ORDER BY require a FROM clause".into(),
        ));
    }
    if offset > 0 || limit == Some(0) {
        return Ok(());
    }
    let doc = project(&stmt.projections, &Document::new(), None, params)?;
    match emit(&doc) {
        Ok(()) | Err(Error::Stop) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Builds the result document of one row.
fn project(
    projections: &[Projection],
    doc: &Document,
    pk: Option<&[u8]>,
    params: &[Value],
) -> Result<Document> {
    let env = Environment {
        document: Some(doc),
        key: pk,
        params,
    };

    let mut out = Document::new();
    for projection in projections {
        match projection {
            Projection::Wildcard => {
                if pk.is_none() {
                    return Err(Error::Parse("SELECT * requires a FROM clause".into()));
                }
                for (name, value) in doc.iter() {
                    out.set(name.clone(), value.clone());
                }
            }
            Projection::Expr { expr, alias } => {
                let value = evaluate(expr, &env)?;
                let name = alias.clone().unwrap_or_else(|| projected_name(expr));
                out.set(name, value);
            }
        }
    }
    Ok(out)
}

/// The result field name of an unaliased projection.
fn projected_name(expr: &Expr) -> String {
    expr.to_string()
}

fn clause_count(
    expr: Option<&Expr>,
    clause: &str,
    params: &[Value],
) -> Result<Option<usize>> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    let value = evaluate(expr, &Environment::with_params(params))?;
    let count = value.as_i64().ok_or_else(|| {
        Error::TypeMismatch(format!("{} expects an integer, got {}", clause, value.value_type()))
    })?;
    usize::try_from(count)
        .map(Some)
        .map_err(|_| Error::TypeMismatch(format!("{} must not be negative", clause)))
}
