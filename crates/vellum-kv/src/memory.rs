//! In-memory engine.
//!
//! The ephemeral reference engine: all state lives in a single ordered
//! map and vanishes when the engine is dropped. Used for `":memory:"`
//! databases and throughout the test suites.

use std::collections::BTreeMap;
use std::sync::Arc;

use vellum_common::Result;

use crate::session::{BatchOp, Committer, Shared, StoreSession};
use crate::{Engine, Session};

/// An ephemeral, in-memory ordered key-value engine.
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        MemoryEngine {
            shared: Shared::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct NoopCommitter;

impl Committer for NoopCommitter {
    fn persist(&self, _ops: &[BatchOp]) -> Result<()> {
        Ok(())
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, writable: bool) -> Result<Box<dyn Session>> {
        Ok(Box::new(StoreSession::begin(
            self.shared.clone(),
            writable,
            NoopCommitter,
        )))
    }
}
