//! Internal key format.
//!
//! Every key persisted by the engine carries the sequence number of the
//! write that produced it and whether that write was a value or a deletion:
//!
//! ```text
//! +-----------+----------------------------------+
//! | user key  | (sequence << 8 | type): fixed64  |
//! +-----------+----------------------------------+
//! ```

use std::fmt;

use crate::encoding::format::{Formatter, Internal};
use crate::encoding::{decode_fixed64, put_fixed64};
use crate::error::Result;
use crate::Error;

pub type SequenceNumber = u64;

/// Sequence numbers share a fixed64 with the value type, leaving 56 bits.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

const TRAILER_SIZE: usize = 8;

/// Tag of a logged or stored operation. The numeric values are persisted in
/// write batches and table keys and must never change.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Deletion = 0x00,
    Value = 0x01,
}

/// The type used when building a lookup key. `Value` is the highest tag, and
/// internal keys sort by type descending, so a seek lands on the newest entry
/// with a sequence number at or below the requested one.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl TryFrom<u8> for ValueType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0x00 => Ok(ValueType::Deletion),
            0x01 => Ok(ValueType::Value),
            other => Err(Error::Corruption(format!("unknown value type {:#04x}", other))),
        }
    }
}

pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    assert!(
        sequence <= MAX_SEQUENCE_NUMBER,
        "sequence number {} exceeds 56 bits",
        sequence
    );
    (sequence << 8) | value_type as u64
}

/// Returns the user key portion of an encoded internal key.
///
/// Panics if `internal_key` is shorter than the eight byte trailer.
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    assert!(
        internal_key.len() >= TRAILER_SIZE,
        "internal key of {} bytes has no trailer",
        internal_key.len()
    );
    &internal_key[..internal_key.len() - TRAILER_SIZE]
}

/// A borrowed, decoded view of an internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        Self {
            user_key,
            sequence,
            value_type,
        }
    }

    pub fn parse(internal_key: &'a [u8]) -> Result<Self> {
        if internal_key.len() < TRAILER_SIZE {
            return Err(Error::Corruption(format!(
                "internal key too short: {} bytes",
                internal_key.len()
            )));
        }
        let split = internal_key.len() - TRAILER_SIZE;
        let trailer = decode_fixed64(&internal_key[split..]);
        let value_type = ValueType::try_from((trailer & 0xff) as u8)?;
        Ok(Self {
            user_key: &internal_key[..split],
            sequence: trailer >> 8,
            value_type,
        })
    }

    pub fn encoded_len(&self) -> usize {
        self.user_key.len() + TRAILER_SIZE
    }

    pub fn append_to(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.user_key);
        put_fixed64(dst, pack_sequence_and_type(self.sequence, self.value_type));
    }
}

/// An owned, encoded internal key.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TRAILER_SIZE);
        ParsedInternalKey::new(user_key, sequence, value_type).append_to(&mut rep);
        Self { rep }
    }

    /// Adopts already encoded bytes without validating them.
    pub fn decode_from(encoded: &[u8]) -> Self {
        Self {
            rep: encoded.to_vec(),
        }
    }

    /// Replaces the contents with `encoded`, reusing the allocation.
    pub fn set_from(&mut self, encoded: &[u8]) {
        self.rep.clear();
        self.rep.extend_from_slice(encoded);
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn parse(&self) -> Result<ParsedInternalKey<'_>> {
        ParsedInternalKey::parse(&self.rep)
    }

    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    pub fn clear(&mut self) {
        self.rep.clear();
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Internal::key(&self.rep))
    }
}
