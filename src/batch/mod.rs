//! Write batches: atomic, sequenced groups of point mutations.
//!
//! A batch is logged as one record before any of its operations are applied,
//! so a crash between logging and applying is recovered by replaying the
//! record. The same encoding doubles as the replay source for the memtable.
//!
//! # Record Format
//!
//! ```text
//! +----------------+---------------+------------+-----+------------+
//! |sequence:fixed64|count:fixed32  | operation  | ... | operation  |
//! +----------------+---------------+------------+-----+------------+
//!
//! operation := 0x01 | key_len:varint32 | key | value_len:varint32 | value
//!            | 0x00 | key_len:varint32 | key
//! ```
//!
//! The header sequence number belongs to the first operation; each later
//! operation implicitly takes the next one. When the same key appears more
//! than once, the operation with the higher sequence number wins.
//!
//! # Replay
//!
//! [`WriteBatch::iterate`] is all or nothing: the whole record is decoded
//! and its count checked before the handler sees the first operation, so a
//! corrupted batch is never partially applied.
//!
//! The operation count is a fixed32 and wraps on overflow. A wrapped count
//! no longer matches the body, so `iterate` rejects such a record.

pub mod internal;

use std::fmt;

use crate::encoding::put_length_prefixed_slice;
use crate::error::Result;
use crate::key::{SequenceNumber, ValueType};
use crate::Error;

pub use internal::{insert_into, MemtableInserter, Op, Ops};
use internal::HEADER_SIZE;

/// Receives the operations of a batch in encoded order.
pub trait Handler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// An ordered list of puts and deletes encoded as a single record.
///
/// Shared references allow concurrent reads (`iterate`, `contents`,
/// `clone`); every mutation takes `&mut self`.
#[derive(Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0u8; HEADER_SIZE],
        }
    }

    /// Wraps an encoded record, e.g. one read back from a log. Only the
    /// header is checked here; the body is validated by `iterate`.
    pub fn from_contents(contents: Vec<u8>) -> Result<Self> {
        if contents.len() < HEADER_SIZE {
            return Err(Error::Corruption(
                "malformed WriteBatch (too small)".to_string(),
            ));
        }
        Ok(Self { rep: contents })
    }

    /// Stores the mapping `key -> value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.bump_count();
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    /// Erases the mapping for `key`, if any.
    pub fn delete(&mut self, key: &[u8]) {
        self.bump_count();
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drops every operation and resets the sequence number to zero.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
    }

    /// Size of the encoded record. A heuristic for batching decisions; the
    /// exact value is tied to the encoding.
    pub fn approximate_size(&self) -> usize {
        internal::byte_size(&self.rep)
    }

    /// Copies the operations of `source` after the ones already in this
    /// batch. Runs in time proportional to the size of `source`. The
    /// sequence number of `source` is ignored.
    pub fn append(&mut self, source: &WriteBatch) {
        internal::append(&mut self.rep, &source.rep);
    }

    /// Replays every operation into `handler`, in the order they were added.
    pub fn iterate<H: Handler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        let ops = self.ops()?.collect::<Result<Vec<_>>>()?;
        if ops.len() != self.count() as usize {
            return Err(Error::Corruption("WriteBatch has wrong count".to_string()));
        }
        for op in ops {
            match op {
                Op::Put { key, value } => handler.put(key, value),
                Op::Delete { key } => handler.delete(key),
            }
        }
        Ok(())
    }

    /// Decodes operations lazily. Unlike `iterate`, this neither checks the
    /// header count nor holds back operations that precede a decode error.
    pub fn ops(&self) -> Result<Ops<'_>> {
        Ops::new(&self.rep)
    }

    pub fn count(&self) -> u32 {
        internal::count(&self.rep)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn sequence(&self) -> SequenceNumber {
        internal::sequence(&self.rep)
    }

    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        internal::set_sequence(&mut self.rep, sequence);
    }

    /// The encoded record, ready to be logged.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    fn bump_count(&mut self) {
        let count = self.count().wrapping_add(1);
        internal::set_count(&mut self.rep, count);
    }
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("sequence", &self.sequence())
            .field("count", &self.count())
            .field("size", &self.rep.len())
            .finish()
    }
}
