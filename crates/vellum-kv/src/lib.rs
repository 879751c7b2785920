//! # vellum-kv
//!
//! Ordered key-value engine contract for VellumDB, with two reference
//! implementations:
//!
//! - [`MemoryEngine`]: an ephemeral in-memory engine
//! - [`LogEngine`]: an on-disk engine backed by an append-only log of
//!   checksummed commit batches
//!
//! The database core treats engines as opaque ordered maps with
//! transactions: at most one writable session at a time, any number of
//! parallel readers, each observing the state committed when it began.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod log;
mod memory;
mod session;

pub use log::LogEngine;
pub use memory::MemoryEngine;

use vellum_common::Result;

/// Iterator bounds.
///
/// The lower bound is inclusive, the upper bound exclusive. A missing
/// bound leaves that side of the key space open.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    /// Smallest key (inclusive) the iterator will return.
    pub lower_bound: Option<Vec<u8>>,
    /// Largest key (exclusive) the iterator will return.
    pub upper_bound: Option<Vec<u8>>,
}

impl IterOptions {
    /// Bounds covering every key that starts with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        IterOptions {
            lower_bound: Some(prefix.to_vec()),
            upper_bound: prefix_successor(prefix),
        }
    }
}

/// An ordered key-value engine.
///
/// Engines hold process-wide state and are shared between transactions;
/// they must be passed explicitly, never assumed to be singletons.
pub trait Engine: Send + Sync + 'static {
    /// Starts a session.
    ///
    /// At most one writable session exists at a time; this call blocks
    /// until the previous writer commits or rolls back. Readers run in
    /// parallel and observe the latest committed state at begin.
    fn begin(&self, writable: bool) -> Result<Box<dyn Session>>;
}

/// A transactional view of the key space.
///
/// Sessions are single-threaded: they may be sent between threads but
/// must not be shared.
pub trait Session: Send {
    /// Returns the value for `key`, or [`KeyNotFound`].
    ///
    /// [`KeyNotFound`]: vellum_common::Error::KeyNotFound
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Returns whether `key` is visible to this session.
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Stores a key-value pair, overwriting any existing value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Stores a key-value pair, failing with [`KeyAlreadyExists`] if the
    /// key is already present.
    ///
    /// [`KeyAlreadyExists`]: vellum_common::Error::KeyAlreadyExists
    fn insert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes a key, failing with [`KeyNotFound`] if absent.
    ///
    /// [`KeyNotFound`]: vellum_common::Error::KeyNotFound
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Deletes every key in `[start, end)`.
    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<()>;

    /// Opens a cursor over the session's view of the key space.
    fn iterator(&self, opts: IterOptions) -> Result<Box<dyn KvIterator + '_>>;

    /// Makes the session's mutations durable and visible to future
    /// sessions. Fails on read-only or already-terminated sessions.
    fn commit(&self) -> Result<()>;

    /// Discards the session's mutations. Rolling back twice is a no-op.
    fn rollback(&self) -> Result<()>;
}

/// A cursor over an ordered key range.
///
/// The cursor starts unpositioned; call [`first`](KvIterator::first),
/// [`last`](KvIterator::last) or [`seek`](KvIterator::seek) before
/// reading. Every method that moves the cursor returns whether it landed
/// on an entry.
pub trait KvIterator {
    /// Positions on the first entry in bounds.
    fn first(&mut self) -> bool;
    /// Positions on the last entry in bounds.
    fn last(&mut self) -> bool;
    /// Advances to the next entry.
    fn next(&mut self) -> bool;
    /// Moves back to the previous entry.
    fn prev(&mut self) -> bool;
    /// Positions on the first entry at or after `key` (clamped to the
    /// bounds).
    fn seek(&mut self, key: &[u8]) -> bool;
    /// Returns whether the cursor is positioned on an entry.
    fn valid(&self) -> bool;
    /// The current key. Only meaningful while [`valid`](KvIterator::valid).
    fn key(&self) -> &[u8];
    /// The current value. Only meaningful while [`valid`](KvIterator::valid).
    fn value(&self) -> &[u8];
}

/// Returns the smallest key greater than every key starting with
/// `prefix`, or `None` when no such key exists.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(&[1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_successor(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(&[]), None);
    }

    #[test]
    fn test_prefix_options() {
        let opts = IterOptions::prefix(&[7, 7]);
        assert_eq!(opts.lower_bound, Some(vec![7, 7]));
        assert_eq!(opts.upper_bound, Some(vec![7, 8]));
    }
}
