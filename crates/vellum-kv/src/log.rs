//! On-disk engine backed by an append-only log.
//!
//! Every commit appends one batch to the log and flushes it before the
//! in-memory snapshot is swapped. A batch is framed as:
//!
//! ```text
//! payload_len: u32 | checksum: u32 (CRC32 of payload) | payload
//! ```
//!
//! where the payload is the session's mutations in application order.
//! Opening the engine replays complete batches into the snapshot; a torn
//! or corrupt tail is truncated, which drops at most the last,
//! unacknowledged commit.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, BufMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vellum_common::{Error, Result};

use crate::session::{BatchOp, Committer, Shared, StoreSession, Tree};
use crate::{Engine, Session};

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_DELETE_RANGE: u8 = 3;

/// Frame header size: payload length + checksum.
const FRAME_HEADER: usize = 8;

/// An on-disk ordered key-value engine.
pub struct LogEngine {
    shared: Arc<Shared>,
    log: Arc<LogFile>,
}

struct LogFile {
    file: Mutex<File>,
    path: PathBuf,
}

impl LogEngine {
    /// Opens the log at `path`, creating it if missing, and replays it
    /// into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let (tree, valid_len) = replay(&raw)?;
        if valid_len < raw.len() {
            warn!(
                path = %path.display(),
                dropped = raw.len() - valid_len,
                "truncating torn tail of log"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        info!(path = %path.display(), entries = tree.len(), "opened log engine");

        Ok(LogEngine {
            shared: Shared::new(tree),
            log: Arc::new(LogFile {
                file: Mutex::new(file),
                path,
            }),
        })
    }

    /// Returns the path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.log.path
    }
}

impl Engine for LogEngine {
    fn begin(&self, writable: bool) -> Result<Box<dyn Session>> {
        Ok(Box::new(StoreSession::begin(
            self.shared.clone(),
            writable,
            LogCommitter {
                log: self.log.clone(),
            },
        )))
    }
}

struct LogCommitter {
    log: Arc<LogFile>,
}

impl Committer for LogCommitter {
    fn persist(&self, ops: &[BatchOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let payload = encode_batch(ops);
        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
        frame.put_u32(payload.len() as u32);
        frame.put_u32(checksum(&payload));
        frame.extend_from_slice(&payload);

        let mut file = self.log.file.lock();
        file.write_all(&frame)?;
        file.sync_data()?;
        debug!(ops = ops.len(), bytes = frame.len(), "appended commit batch");
        Ok(())
    }
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

fn encode_batch(ops: &[BatchOp]) -> Vec<u8> {
    let mut buf = Vec::new();
    for op in ops {
        match op {
            BatchOp::Put(key, value) => {
                buf.put_u8(OP_PUT);
                buf.put_u32(key.len() as u32);
                buf.extend_from_slice(key);
                buf.put_u32(value.len() as u32);
                buf.extend_from_slice(value);
            }
            BatchOp::Delete(key) => {
                buf.put_u8(OP_DELETE);
                buf.put_u32(key.len() as u32);
                buf.extend_from_slice(key);
            }
            BatchOp::DeleteRange(start, end) => {
                buf.put_u8(OP_DELETE_RANGE);
                buf.put_u32(start.len() as u32);
                buf.extend_from_slice(start);
                buf.put_u32(end.len() as u32);
                buf.extend_from_slice(end);
            }
        }
    }
    buf
}

/// Replays the raw log, returning the reconstructed tree and the byte
/// length of the valid frames.
fn replay(raw: &[u8]) -> Result<(Tree, usize)> {
    let mut tree = Tree::new();
    let mut pos = 0;

    while raw.len() - pos >= FRAME_HEADER {
        let mut header = &raw[pos..pos + FRAME_HEADER];
        let payload_len = header.get_u32() as usize;
        let expected = header.get_u32();

        let start = pos + FRAME_HEADER;
        let Some(payload) = raw.get(start..start + payload_len) else {
            break; // torn tail
        };
        if checksum(payload) != expected {
            break; // corrupt tail
        }

        apply_batch(&mut tree, payload)?;
        pos = start + payload_len;
    }

    Ok((tree, pos))
}

fn apply_batch(tree: &mut Tree, mut payload: &[u8]) -> Result<()> {
    while payload.has_remaining() {
        match payload.get_u8() {
            OP_PUT => {
                let key = read_chunk(&mut payload)?;
                let value = read_chunk(&mut payload)?;
                tree.insert(key, value);
            }
            OP_DELETE => {
                let key = read_chunk(&mut payload)?;
                tree.remove(&key);
            }
            OP_DELETE_RANGE => {
                let start = read_chunk(&mut payload)?;
                let end = read_chunk(&mut payload)?;
                let doomed: Vec<Vec<u8>> = tree
                    .range::<[u8], _>((
                        Bound::Included(start.as_slice()),
                        Bound::Excluded(end.as_slice()),
                    ))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    tree.remove(&key);
                }
            }
            op => return Err(Error::Corruption(format!("unknown log op {:#04x}", op))),
        }
    }
    Ok(())
}

fn read_chunk(payload: &mut &[u8]) -> Result<Vec<u8>> {
    if payload.remaining() < 4 {
        return Err(Error::Corruption("truncated log record".into()));
    }
    let len = payload.get_u32() as usize;
    if payload.remaining() < len {
        return Err(Error::Corruption("truncated log record".into()));
    }
    let chunk = payload[..len].to_vec();
    payload.advance(len);
    Ok(chunk)
}
