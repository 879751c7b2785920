//! Shared session machinery for the reference engines.
//!
//! Both engines keep the committed state as an immutable
//! `Arc<BTreeMap>` snapshot. Readers clone the `Arc`; the writer clones
//! the map, mutates its private copy and swaps it in on commit, which
//! makes rollback restore the committed state bit for bit. Durability is
//! delegated to a per-engine [`Committer`] that runs before the swap.

use std::collections::BTreeMap;
use std::mem;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use vellum_common::{Error, Result};

use crate::{IterOptions, KvIterator, Session};

pub(crate) type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// One mutation recorded by a writable session, in application order.
#[derive(Debug, Clone)]
pub(crate) enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
    DeleteRange(Vec<u8>, Vec<u8>),
}

/// Durability hook invoked with the session's mutation batch before the
/// committed snapshot is swapped.
pub(crate) trait Committer: Send + Sync {
    fn persist(&self, ops: &[BatchOp]) -> Result<()>;
}

/// Blocks writers until the previous writable session terminates.
struct WriterGate {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl WriterGate {
    fn new() -> Self {
        WriterGate {
            busy: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.cv.wait(&mut busy);
        }
        *busy = true;
    }

    fn release(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.cv.notify_one();
    }
}

/// State shared by every session of one engine.
pub(crate) struct Shared {
    committed: RwLock<Arc<Tree>>,
    writer: WriterGate,
}

impl Shared {
    pub(crate) fn new(tree: Tree) -> Arc<Self> {
        Arc::new(Shared {
            committed: RwLock::new(Arc::new(tree)),
            writer: WriterGate::new(),
        })
    }
}

enum State {
    /// Read-only view of a committed snapshot.
    Read(Arc<Tree>),
    /// Private working copy of the committed snapshot, plus the journal
    /// of mutations in application order.
    Write { tree: Tree, ops: Vec<BatchOp> },
    Closed,
}

/// Session implementation shared by the memory and log engines.
pub(crate) struct StoreSession<C> {
    shared: Arc<Shared>,
    state: Mutex<State>,
    writable: bool,
    committer: C,
}

impl<C: Committer> StoreSession<C> {
    pub(crate) fn begin(shared: Arc<Shared>, writable: bool, committer: C) -> Self {
        let state = if writable {
            shared.writer.acquire();
            let snapshot = shared.committed.read().clone();
            State::Write {
                tree: (*snapshot).clone(),
                ops: Vec::new(),
            }
        } else {
            State::Read(shared.committed.read().clone())
        };

        StoreSession {
            shared,
            state: Mutex::new(state),
            writable,
            committer,
        }
    }

    fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> Result<R> {
        let state = self.state.lock();
        match &*state {
            State::Read(tree) => Ok(f(tree)),
            State::Write { tree, .. } => Ok(f(tree)),
            State::Closed => Err(Error::TransactionClosed),
        }
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut Tree, &mut Vec<BatchOp>) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Write { tree, ops } => f(tree, ops),
            State::Read(_) => Err(Error::TransactionReadOnly),
            State::Closed => Err(Error::TransactionClosed),
        }
    }
}

impl<C: Committer + Send + Sync> Session for StoreSession<C> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_tree(|tree| tree.get(key).cloned())?
            .ok_or(Error::KeyNotFound)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.with_tree(|tree| tree.contains_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_write(|tree, ops| {
            tree.insert(key.to_vec(), value.to_vec());
            ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
            Ok(())
        })
    }

    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_write(|tree, ops| {
            if tree.contains_key(key) {
                return Err(Error::KeyAlreadyExists);
            }
            tree.insert(key.to_vec(), value.to_vec());
            ops.push(BatchOp::Put(key.to_vec(), value.to_vec()));
            Ok(())
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_write(|tree, ops| {
            if tree.remove(key).is_none() {
                return Err(Error::KeyNotFound);
            }
            ops.push(BatchOp::Delete(key.to_vec()));
            Ok(())
        })
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<()> {
        self.with_write(|tree, ops| {
            let doomed: Vec<Vec<u8>> = tree
                .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                tree.remove(&key);
            }
            ops.push(BatchOp::DeleteRange(start.to_vec(), end.to_vec()));
            Ok(())
        })
    }

    fn iterator(&self, opts: IterOptions) -> Result<Box<dyn KvIterator + '_>> {
        // Fail fast when the session is already terminated.
        self.with_tree(|_| ())?;
        Ok(Box::new(SessionIter {
            session: self,
            lower: opts.lower_bound,
            upper: opts.upper_bound,
            current: None,
        }))
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            State::Closed => return Err(Error::TransactionClosed),
            State::Read(_) => return Err(Error::TransactionReadOnly),
            State::Write { .. } => {}
        }

        let State::Write { tree, ops } = mem::replace(&mut *state, State::Closed) else {
            unreachable!();
        };

        if let Err(e) = self.committer.persist(&ops) {
            // The working copy is gone; the session stays closed and the
            // committed snapshot is untouched.
            self.shared.writer.release();
            return Err(e);
        }

        *self.shared.committed.write() = Arc::new(tree);
        self.shared.writer.release();
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            State::Closed => return Ok(()),
            State::Read(_) => {
                *state = State::Closed;
                return Ok(());
            }
            State::Write { .. } => {}
        }
        *state = State::Closed;
        self.shared.writer.release();
        Ok(())
    }
}

impl<C> Drop for StoreSession<C> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if matches!(&*state, State::Write { .. }) {
            *state = State::Closed;
            self.shared.writer.release();
        }
    }
}

/// Cursor over a session's view.
///
/// The cursor re-queries the tree on every move, caching the entry it
/// lands on, so it observes the session's own writes and never holds a
/// lock across callback boundaries.
struct SessionIter<'a, C> {
    session: &'a StoreSession<C>,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<C: Committer> SessionIter<'_, C> {
    fn range_query(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        backwards: bool,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        self.session
            .with_tree(|tree| {
                let mut range = tree.range::<[u8], _>((lower, upper));
                let entry = if backwards { range.next_back() } else { range.next() };
                entry.map(|(k, v)| (k.clone(), v.clone()))
            })
            .ok()
            .flatten()
    }

    fn lower_bound(&self) -> Bound<&[u8]> {
        match &self.lower {
            Some(k) => Bound::Included(k.as_slice()),
            None => Bound::Unbounded,
        }
    }

    fn upper_bound(&self) -> Bound<&[u8]> {
        match &self.upper {
            Some(k) => Bound::Excluded(k.as_slice()),
            None => Bound::Unbounded,
        }
    }
}

impl<C: Committer> KvIterator for SessionIter<'_, C> {
    fn first(&mut self) -> bool {
        self.current = self.range_query(self.lower_bound(), self.upper_bound(), false);
        self.current.is_some()
    }

    fn last(&mut self) -> bool {
        self.current = self.range_query(self.lower_bound(), self.upper_bound(), true);
        self.current.is_some()
    }

    fn next(&mut self) -> bool {
        let Some((key, _)) = self.current.take() else {
            return false;
        };
        self.current = self.range_query(Bound::Excluded(key.as_slice()), self.upper_bound(), false);
        self.current.is_some()
    }

    fn prev(&mut self) -> bool {
        let Some((key, _)) = self.current.take() else {
            return false;
        };
        self.current = self.range_query(self.lower_bound(), Bound::Excluded(key.as_slice()), true);
        self.current.is_some()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        let lower = match &self.lower {
            Some(l) if l.as_slice() > key => Bound::Included(l.as_slice()),
            _ => Bound::Included(key),
        };
        self.current = self.range_query(lower, self.upper_bound(), false);
        self.current.is_some()
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }
}
