//! Primitives over the raw bytes of a write batch record.
//!
//! These functions do not validate the body; they only touch the fixed
//! 12-byte header or splice bodies together. [`super::WriteBatch`] is the
//! validating wrapper.

use crate::encoding::{
    decode_fixed32, decode_fixed64, encode_fixed32_at, encode_fixed64_at,
    get_length_prefixed_slice,
};
use crate::error::Result;
use crate::key::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};
use crate::memtable::Memtable;
use crate::Error;

use super::{Handler, WriteBatch};

/// 8-byte sequence number followed by a 4-byte operation count.
pub const HEADER_SIZE: usize = 12;

const COUNT_OFFSET: usize = 8;

pub fn count(rep: &[u8]) -> u32 {
    decode_fixed32(&rep[COUNT_OFFSET..])
}

pub fn set_count(rep: &mut [u8], count: u32) {
    encode_fixed32_at(rep, COUNT_OFFSET, count);
}

pub fn sequence(rep: &[u8]) -> SequenceNumber {
    decode_fixed64(rep)
}

pub fn set_sequence(rep: &mut [u8], sequence: SequenceNumber) {
    encode_fixed64_at(rep, 0, sequence);
}

pub fn byte_size(rep: &[u8]) -> usize {
    rep.len()
}

/// Splices the operations of `src` onto `dst`. Only the count of `dst` is
/// updated, wrapping on overflow; the sequence number of `src` is dropped.
pub fn append(dst: &mut Vec<u8>, src: &[u8]) {
    assert!(src.len() >= HEADER_SIZE && dst.len() >= HEADER_SIZE);
    let total = count(dst).wrapping_add(count(src));
    set_count(dst, total);
    dst.extend_from_slice(&src[HEADER_SIZE..]);
}

/// A single decoded operation, borrowing from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<'a> {
    Put { key: &'a [u8], value: &'a [u8] },
    Delete { key: &'a [u8] },
}

/// Decodes operations from a record body one at a time. The first error is
/// yielded once and ends the iteration. The header count is not checked
/// here; callers compare it against the number of operations produced.
pub struct Ops<'a> {
    input: &'a [u8],
    failed: bool,
}

impl<'a> Ops<'a> {
    pub fn new(rep: &'a [u8]) -> Result<Self> {
        if rep.len() < HEADER_SIZE {
            return Err(Error::Corruption(
                "malformed WriteBatch (too small)".to_string(),
            ));
        }
        Ok(Self {
            input: &rep[HEADER_SIZE..],
            failed: false,
        })
    }

    fn decode_one(&mut self) -> Result<Op<'a>> {
        let tag = self.input[0];
        self.input = &self.input[1..];
        match ValueType::try_from(tag) {
            Ok(ValueType::Value) => {
                let key = get_length_prefixed_slice(&mut self.input);
                let value = get_length_prefixed_slice(&mut self.input);
                match (key, value) {
                    (Some(key), Some(value)) => Ok(Op::Put { key, value }),
                    _ => Err(Error::Corruption("bad WriteBatch Put".to_string())),
                }
            }
            Ok(ValueType::Deletion) => match get_length_prefixed_slice(&mut self.input) {
                Some(key) => Ok(Op::Delete { key }),
                None => Err(Error::Corruption("bad WriteBatch Delete".to_string())),
            },
            Err(_) => Err(Error::Corruption("unknown WriteBatch tag".to_string())),
        }
    }
}

impl<'a> Iterator for Ops<'a> {
    type Item = Result<Op<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.input.is_empty() {
            return None;
        }
        let op = self.decode_one();
        if op.is_err() {
            self.failed = true;
        }
        Some(op)
    }
}

/// Applies batch operations to a memtable, stamping each with the next
/// sequence number starting from the batch header.
pub struct MemtableInserter<'a> {
    sequence: SequenceNumber,
    memtable: &'a Memtable,
}

impl<'a> MemtableInserter<'a> {
    pub fn new(sequence: SequenceNumber, memtable: &'a Memtable) -> Self {
        Self { sequence, memtable }
    }

    /// The sequence number the next operation would receive.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }
}

impl Handler for MemtableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.memtable
            .add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.memtable.add(self.sequence, ValueType::Deletion, key, b"");
        self.sequence += 1;
    }
}

/// Replays `batch` into `memtable`. Fails without inserting anything if the
/// last operation's sequence number would not fit in an internal key.
pub fn insert_into(batch: &WriteBatch, memtable: &Memtable) -> Result<()> {
    if let Some(last) = u64::from(batch.count()).checked_sub(1) {
        match batch.sequence().checked_add(last) {
            Some(last) if last <= MAX_SEQUENCE_NUMBER => {}
            _ => {
                return Err(Error::Corruption(format!(
                    "WriteBatch sequence {} overflows with {} operations",
                    batch.sequence(),
                    batch.count()
                )))
            }
        }
    }
    let mut inserter = MemtableInserter::new(batch.sequence(), memtable);
    batch.iterate(&mut inserter)
}
