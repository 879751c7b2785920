//! Database handle.
//!
//! A [`Database`] owns the key-value engine and hands out transactions.
//! The catalog is loaded from the transaction's own snapshot at begin,
//! so catalog changes become visible exactly when the data they describe
//! does.

use std::sync::Arc;

use tracing::debug;
use vellum_common::Result;
use vellum_kv::Engine;

use crate::catalog::Catalog;
use crate::transaction::Transaction;

/// A handle on one database.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Database {
    engine: Arc<dyn Engine>,
}

impl Database {
    /// Creates a database over the given engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Database { engine }
    }

    /// Starts a transaction.
    ///
    /// At most one writable transaction runs at a time; this call blocks
    /// until the previous writer terminates. Read-only transactions
    /// observe the state committed at begin.
    pub fn begin(&self, writable: bool) -> Result<Transaction> {
        let session = self.engine.begin(writable)?;
        let catalog = Catalog::load(session.as_ref())?;
        debug!(writable, "started transaction");
        Ok(Transaction::new(session, catalog, writable))
    }

    /// Runs `f` in a read-only transaction, rolling it back afterwards.
    pub fn view<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let tx = self.begin(false)?;
        let result = f(&tx);
        tx.rollback()?;
        result
    }

    /// Runs `f` in a writable transaction, committing on success and
    /// rolling back on error.
    pub fn update<T>(&self, f: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        let mut tx = self.begin(true)?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}
