//! DDL and REINDEX execution.

use tracing::debug;
use vellum_common::{Error, Result};
use vellum_core::{Path, Value};
use vellum_db::{FieldConstraint, IndexConfig, TableConfig, Transaction};

use crate::ast::ColumnDef;
use crate::eval::{evaluate, Environment};

pub(crate) fn create_table(
    tx: &mut Transaction,
    name: &str,
    if_not_exists: bool,
    columns: &[ColumnDef],
    params: &[Value],
) -> Result<()> {
    let env = Environment::with_params(params);
    let mut cfg = TableConfig::new(name);
    for column in columns {
        let default_value = match &column.default {
            Some(expr) => Some(evaluate(expr, &env)?),
            None => None,
        };
        cfg.field_constraints.push(FieldConstraint {
            path: column.path.clone(),
            ty: column.ty,
            is_primary_key: column.primary_key,
            is_unique: column.unique,
            is_not_null: column.not_null || column.primary_key,
            default_value,
        });
    }

    match tx.create_table(cfg) {
        Err(Error::TableAlreadyExists(_)) if if_not_exists => Ok(()),
        other => other,
    }
}

pub(crate) fn drop_table(tx: &mut Transaction, name: &str, if_exists: bool) -> Result<()> {
    match tx.drop_table(name) {
        Err(Error::TableNotFound(_)) if if_exists => Ok(()),
        other => other,
    }
}

pub(crate) fn create_index(
    tx: &mut Transaction,
    name: &str,
    table: &str,
    path: &Path,
    unique: bool,
    if_not_exists: bool,
) -> Result<()> {
    let mut cfg = IndexConfig::new(name, table, path.clone());
    if unique {
        cfg = cfg.unique();
    }
    match tx.create_index(cfg) {
        Err(Error::IndexAlreadyExists(_)) if if_not_exists => Ok(()),
        other => other,
    }
}

pub(crate) fn drop_index(tx: &mut Transaction, name: &str, if_exists: bool) -> Result<()> {
    match tx.drop_index(name) {
        Err(Error::IndexNotFound(_)) if if_exists => Ok(()),
        other => other,
    }
}

/// Rebuilds one index, every index of one table, or every index of the
/// database.
pub(crate) fn reindex(tx: &mut Transaction, target: Option<&str>) -> Result<()> {
    match target {
        None => tx.reindex_all(),
        Some(name) => {
            if tx.catalog().index_exists(name) {
                debug!(index = name, "rebuilding index");
                return tx.reindex(name);
            }
            if tx.catalog().table_exists(name) {
                debug!(table = name, "rebuilding table indexes");
                for index in tx.catalog().list_indexes(Some(name)) {
                    tx.reindex(&index)?;
                }
                return Ok(());
            }
            Err(Error::IndexNotFound(name.to_string()))
        }
    }
}
