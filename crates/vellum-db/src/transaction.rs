//! Transaction manager.
//!
//! A [`Transaction`] bundles a key-value session with the catalog
//! snapshot loaded from it, so every table, index and catalog operation
//! of one transaction shares a single commit boundary. The catalog is
//! the sole owner of configuration; tables resolve their indexes through
//! it by name, never through owning pointers.

use tracing::debug;
use vellum_common::constants::CONSTRAINT_INDEX_SUFFIX;
use vellum_common::{Error, Result};
use vellum_core::Value;
use vellum_kv::{prefix_successor, IterOptions, Session};

use crate::catalog::{self, Catalog, IndexConfig, TableConfig};
use crate::index::Index;
use crate::table::Table;

/// A database transaction.
///
/// Transactions are single-threaded and must not outlive their
/// database. Dropping an unfinished transaction rolls it back.
pub struct Transaction {
    session: Box<dyn Session>,
    catalog: Catalog,
    writable: bool,
    done: bool,
}

impl Transaction {
    pub(crate) fn new(session: Box<dyn Session>, catalog: Catalog, writable: bool) -> Self {
        Transaction {
            session,
            catalog,
            writable,
            done: false,
        }
    }

    /// Returns true if the transaction accepts mutations.
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Returns the catalog snapshot of this transaction.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub(crate) fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// Makes the transaction's mutations durable and visible.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        debug!("committing transaction");
        self.session.commit()
    }

    /// Discards the transaction's mutations.
    pub fn rollback(mut self) -> Result<()> {
        self.done = true;
        debug!("rolling back transaction");
        self.session.rollback()
    }

    // -----------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------

    /// Returns a handle on a table.
    pub fn get_table(&self, name: &str) -> Result<Table<'_>> {
        let cfg = self.catalog.table(name)?.clone();
        let indexes = self.catalog.table_indexes(name);
        Ok(Table::new(self, cfg, indexes))
    }

    /// Lists user table names in lexical order.
    pub fn list_tables(&self) -> Vec<String> {
        self.catalog.list_tables()
    }

    /// Creates a table.
    ///
    /// Unique field constraints implicitly create constraint-bound
    /// indexes named `<table>_<path>_idx`.
    pub fn create_table(&mut self, mut cfg: TableConfig) -> Result<()> {
        self.ensure_writable()?;
        if self.catalog.table_exists(&cfg.name) {
            return Err(Error::TableAlreadyExists(cfg.name));
        }
        let pk_count = cfg
            .field_constraints
            .iter()
            .filter(|c| c.is_primary_key)
            .count();
        if pk_count > 1 {
            return Err(Error::Internal(format!(
                "table {} declares {} primary keys",
                cfg.name, pk_count
            )));
        }

        cfg.prefix = catalog::next_prefix(self.session.as_ref())?;
        cfg.read_only = false;
        catalog::write_table_row(self.session.as_ref(), &cfg)?;
        debug!(table = %cfg.name, prefix = cfg.prefix, "created table");

        let implicit: Vec<IndexConfig> = cfg
            .field_constraints
            .iter()
            .filter(|c| c.is_unique && !c.is_primary_key)
            .map(|c| IndexConfig {
                name: format!(
                    "{}_{}{}",
                    cfg.name,
                    c.path.to_string().replace('.', "_"),
                    CONSTRAINT_INDEX_SUFFIX
                ),
                table_name: cfg.name.clone(),
                path: c.path.clone(),
                unique: true,
                ty: c.ty,
                owned: true,
                prefix: 0,
            })
            .collect();

        self.catalog.add_table(cfg);
        for index in implicit {
            self.create_index(index)?;
        }
        Ok(())
    }

    /// Drops a table, all its rows, and every one of its indexes.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let cfg = self.catalog.table(name)?.clone();
        if cfg.read_only {
            return Err(Error::ReadOnlyTable(name.to_string()));
        }

        let session = self.session.as_ref();
        let prefix = cfg.prefix_bytes();
        if let Some(end) = prefix_successor(&prefix) {
            session.delete_range(&prefix, &end)?;
        }

        for index in self.catalog.table_indexes(name) {
            Index::new(session, index.clone()).truncate()?;
            catalog::delete_index_row(session, &index.name)?;
            self.catalog.remove_index(&index.name);
        }

        catalog::delete_table_row(session, name)?;
        catalog::delete_sequence(session, name)?;
        self.catalog.remove_table(name);
        debug!(table = name, "dropped table");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Indexes
    // -----------------------------------------------------------------

    /// Returns a handle on an index.
    pub fn get_index(&self, name: &str) -> Result<Index<'_>> {
        let cfg = self.catalog.index(name)?.clone();
        Ok(Index::new(self.session.as_ref(), cfg))
    }

    /// Creates an index. A non-empty table is scanned to populate it.
    pub fn create_index(&mut self, mut cfg: IndexConfig) -> Result<()> {
        self.ensure_writable()?;
        if self.catalog.index_exists(&cfg.name) {
            return Err(Error::IndexAlreadyExists(cfg.name));
        }
        let table_cfg = self.catalog.table(&cfg.table_name)?.clone();

        cfg.prefix = catalog::next_prefix(self.session.as_ref())?;
        catalog::write_index_row(self.session.as_ref(), &cfg)?;
        populate_index(self.session.as_ref(), &table_cfg, &cfg)?;
        debug!(index = %cfg.name, table = %cfg.table_name, "created index");
        self.catalog.add_index(cfg);
        Ok(())
    }

    /// Drops an index.
    ///
    /// Constraint-bound indexes refuse to be dropped on their own; they
    /// disappear with their table.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let cfg = self.catalog.index(name)?.clone();
        if cfg.owned {
            return Err(Error::CannotDropConstraintIndex(name.to_string()));
        }

        let session = self.session.as_ref();
        Index::new(session, cfg.clone()).truncate()?;
        catalog::delete_index_row(session, name)?;
        self.catalog.remove_index(name);
        debug!(index = name, "dropped index");
        Ok(())
    }

    /// Truncates one index and rebuilds it from its table.
    pub fn reindex(&self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let cfg = self.catalog.index(name)?.clone();
        let table_cfg = self.catalog.table(&cfg.table_name)?.clone();

        let session = self.session.as_ref();
        Index::new(session, cfg.clone()).truncate()?;
        populate_index(session, &table_cfg, &cfg)
    }

    /// Rebuilds every index of the database.
    pub fn reindex_all(&self) -> Result<()> {
        for name in self.catalog.list_indexes(None) {
            self.reindex(&name)?;
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if !self.writable {
            return Err(Error::TransactionReadOnly);
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.session.rollback();
        }
    }
}

/// Inserts an index entry for every row of `table_cfg`.
fn populate_index(
    session: &dyn Session,
    table_cfg: &TableConfig,
    index_cfg: &IndexConfig,
) -> Result<()> {
    use vellum_common::constants::PREFIX_LEN;
    use vellum_core::encoding::decode_document;

    let index = Index::new(session, index_cfg.clone());
    let prefix = table_cfg.prefix_bytes();
    let mut it = session.iterator(IterOptions::prefix(&prefix))?;

    let mut ok = it.first();
    while ok {
        let doc = decode_document(it.value())?;
        let pk = it.key()[PREFIX_LEN..].to_vec();
        let value = index_cfg
            .path
            .get_in_document(&doc)
            .cloned()
            .unwrap_or(Value::Null);
        index.set(&value, &pk)?;
        ok = it.next();
    }
    Ok(())
}
