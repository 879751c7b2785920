//! # VellumDB
//!
//! An embedded, transactional document database with a SQL-like query
//! language, secondary indexes, and a pluggable ordered key-value
//! engine.
//!
//! ```no_run
//! use vellum::{Database, Value};
//!
//! fn main() -> vellum::Result<()> {
//!     let db = Database::open(":memory:")?;
//!
//!     db.exec("CREATE TABLE users", &[])?;
//!     db.exec(
//!         r#"INSERT INTO users VALUES {"name": "alice", "age": 30}"#,
//!         &[],
//!     )?;
//!
//!     let mut query = db.query("SELECT name FROM users WHERE age > ?", &[Value::Integer(18)])?;
//!     query.iterate(|doc| {
//!         println!("{}", doc);
//!         Ok(())
//!     })?;
//!     query.close()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use vellum_db::Database as CoreDatabase;
use vellum_kv::{Engine, LogEngine, MemoryEngine};
use vellum_sql::{execute, Parser, Statement};

pub use vellum_common::{Error, Result};
pub use vellum_core::{Document, Path, Value, ValueType};
pub use vellum_db::{FieldConstraint, IndexConfig, Pivot, TableConfig, Transaction};
pub use vellum_sql::Expr;

/// A handle on a VellumDB database.
pub struct Database {
    core: CoreDatabase,
    /// Transaction opened by a SQL `BEGIN`, owned by the database until
    /// `COMMIT` or `ROLLBACK`.
    session: Mutex<Option<Transaction>>,
}

impl Database {
    /// Opens a database at `path`.
    ///
    /// `":memory:"` opens an ephemeral in-memory database; any other
    /// path opens (or creates) an on-disk database backed by the log
    /// engine.
    pub fn open(path: &str) -> Result<Database> {
        info!(path, "opening database");
        if path == ":memory:" {
            Ok(Database::new(Arc::new(MemoryEngine::new())))
        } else {
            Ok(Database::new(Arc::new(LogEngine::open(path)?)))
        }
    }

    /// Creates a database over an explicit engine.
    pub fn new(engine: Arc<dyn Engine>) -> Database {
        Database {
            core: CoreDatabase::new(engine),
            session: Mutex::new(None),
        }
    }

    /// Starts an explicit transaction.
    pub fn begin(&self, writable: bool) -> Result<Tx> {
        Ok(Tx {
            tx: Some(self.core.begin(writable)?),
        })
    }

    /// Runs `f` in a read-only transaction.
    pub fn view<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        self.core.view(f)
    }

    /// Runs `f` in a writable transaction, committing on success.
    pub fn update<T>(&self, f: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        self.core.update(f)
    }

    /// Executes one or more semicolon-separated statements, discarding
    /// their results.
    ///
    /// `BEGIN`, `COMMIT` and `ROLLBACK` manage a transaction owned by
    /// this handle: statements between them share it, everything else
    /// runs in its own transaction.
    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<()> {
        for stmt in Parser::parse(sql)? {
            self.exec_statement(&stmt, params)?;
        }
        Ok(())
    }

    fn exec_statement(&self, stmt: &Statement, params: &[Value]) -> Result<()> {
        let mut session = self.session.lock();
        match stmt {
            Statement::Begin { writable } => {
                if session.is_some() {
                    return Err(Error::Internal("a transaction is already open".into()));
                }
                *session = Some(self.core.begin(*writable)?);
                Ok(())
            }
            Statement::Commit => session
                .take()
                .ok_or_else(|| Error::Internal("no transaction is open".into()))?
                .commit(),
            Statement::Rollback => session
                .take()
                .ok_or_else(|| Error::Internal("no transaction is open".into()))?
                .rollback(),
            other => match session.take() {
                Some(mut tx) => {
                    let result = execute(other, &mut tx, params, &mut |_| Ok(()));
                    *session = Some(tx);
                    result
                }
                None => {
                    drop(session);
                    self.run_auto(other, params, &mut |_| Ok(()))
                }
            },
        }
    }

    /// Runs one statement in its own transaction.
    fn run_auto(
        &self,
        stmt: &Statement,
        params: &[Value],
        emit: &mut dyn FnMut(&Document) -> Result<()>,
    ) -> Result<()> {
        let mut tx = self.core.begin(stmt.is_mutation())?;
        match execute(stmt, &mut tx, params, emit) {
            Ok(()) => {
                if stmt.is_mutation() {
                    tx.commit()
                } else {
                    tx.rollback()
                }
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }

    /// Prepares a SELECT for iteration.
    ///
    /// Outside a SQL transaction the query owns a read-only transaction
    /// that stays open until the query is closed or dropped; inside one
    /// it reads through the open transaction.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Query<'_>> {
        let stmt = Parser::parse_one(sql)?;
        if !matches!(stmt, Statement::Select(_)) {
            return Err(Error::Parse("query expects a SELECT statement".into()));
        }

        let tx = if self.session.lock().is_some() {
            None
        } else {
            Some(self.core.begin(false)?)
        };

        Ok(Query {
            db: self,
            stmt,
            params: params.to_vec(),
            tx,
            closed: false,
        })
    }

    /// Runs a SELECT and returns its first document.
    pub fn query_document(&self, sql: &str, params: &[Value]) -> Result<Document> {
        let mut query = self.query(sql, params)?;
        let mut first: Option<Document> = None;
        query.iterate(|doc| {
            first = Some(doc.clone());
            Err(Error::Stop)
        })?;
        query.close()?;
        first.ok_or(Error::DocumentNotFound)
    }

    /// Closes the database, rolling back any open SQL transaction.
    pub fn close(self) -> Result<()> {
        if let Some(tx) = self.session.lock().take() {
            tx.rollback()?;
        }
        Ok(())
    }
}

/// An explicit transaction handle.
///
/// Dropping an unfinished transaction rolls it back.
pub struct Tx {
    tx: Option<Transaction>,
}

impl Tx {
    fn transaction(&mut self) -> Result<&mut Transaction> {
        self.tx.as_mut().ok_or(Error::TransactionClosed)
    }

    /// Executes statements inside this transaction, discarding results.
    pub fn exec(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let statements = Parser::parse(sql)?;
        let tx = self.transaction()?;
        for stmt in &statements {
            execute(stmt, tx, params, &mut |_| Ok(()))?;
        }
        Ok(())
    }

    /// Runs a SELECT inside this transaction, streaming documents to
    /// `f`. The callback may return [`Error::Stop`] to end the stream.
    pub fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        mut f: impl FnMut(&Document) -> Result<()>,
    ) -> Result<()> {
        let stmt = Parser::parse_one(sql)?;
        let tx = self.transaction()?;
        match execute(&stmt, tx, params, &mut f) {
            Err(Error::Stop) => Ok(()),
            other => other,
        }
    }

    /// Runs a SELECT inside this transaction and returns its first
    /// document.
    pub fn query_document(&mut self, sql: &str, params: &[Value]) -> Result<Document> {
        let mut first: Option<Document> = None;
        self.query(sql, params, |doc| {
            first = Some(doc.clone());
            Err(Error::Stop)
        })?;
        first.ok_or(Error::DocumentNotFound)
    }

    /// Returns the underlying core transaction.
    pub fn inner(&mut self) -> Result<&mut Transaction> {
        self.transaction()
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.tx.take().ok_or(Error::TransactionClosed)?.commit()
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.tx.take().ok_or(Error::TransactionClosed)?.rollback()
    }
}

/// A prepared SELECT and the transaction it reads through.
///
/// Iteration drives execution lazily; closing (or dropping) the query
/// releases its transaction.
pub struct Query<'d> {
    db: &'d Database,
    stmt: Statement,
    params: Vec<Value>,
    /// The query's own read transaction; `None` reads through the
    /// database's open SQL transaction.
    tx: Option<Transaction>,
    closed: bool,
}

impl Query<'_> {
    /// Streams result documents to `f`.
    ///
    /// The callback may return [`Error::Stop`] to end the stream early.
    pub fn iterate(&mut self, mut f: impl FnMut(&Document) -> Result<()>) -> Result<()> {
        if self.closed {
            return Err(Error::TransactionClosed);
        }

        let emit = &mut |doc: &Document| f(doc);
        let result = match self.tx.as_mut() {
            Some(tx) => execute(&self.stmt, tx, &self.params, emit),
            None => {
                let mut session = self.db.session.lock();
                let tx = session
                    .as_mut()
                    .ok_or_else(|| Error::Internal("the transaction is no longer open".into()))?;
                execute(&self.stmt, tx, &self.params, emit)
            }
        };

        match result {
            Err(Error::Stop) => Ok(()),
            other => other,
        }
    }

    /// Releases the query's transaction.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }
}
