//! Prefix-compressed data blocks.
//!
//! Keys are stored as a delta against the previous key. Every
//! `restart_interval` entries the full key is stored instead; these restart
//! points are indexed in the block trailer so a reader can binary search them
//! and decode at most one interval of deltas.
//!
//! ```text
//! +--------------------+----------------------+--------------------+-----------+-------+
//! | shared: varint32   | unshared: varint32   | value_len: varint32| key delta | value |
//! +--------------------+----------------------+--------------------+-----------+-------+
//! ...
//! +---------------------+-----+-------------------------+-------------------+
//! | restart[0]: fixed32 | ... | restart[n - 1]: fixed32 | n: fixed32        |
//! +---------------------+-----+-------------------------+-------------------+
//! ```
//!
//! `shared` is zero at every restart point and `restart[0]` is always zero.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::config::Options;
use crate::encoding::{decode_fixed32, get_varint32, put_fixed32, put_varint32};
use crate::error::Result;
use crate::iterator::KvIterator;
use crate::Error;

const U32_SIZE: usize = std::mem::size_of::<u32>();

pub struct BlockBuilder {
    comparator: Arc<dyn Comparator>,
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize, // entries since the last restart
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(options: &Options) -> Self {
        Self::with_restart_interval(options.comparator.clone(), options.block_restart_interval)
    }

    pub fn with_restart_interval(comparator: Arc<dyn Comparator>, restart_interval: usize) -> Self {
        assert!(restart_interval >= 1, "restart interval must be at least 1");
        Self {
            comparator,
            restart_interval,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Returns the builder to its freshly constructed state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    /// Appends an entry. `key` must be strictly greater than every key added
    /// since the last reset; anything else is a caller bug and panics.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.finished, "add called on a finished block");
        assert!(self.counter <= self.restart_interval);
        assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "block keys must be added in strictly increasing order"
        );

        let shared = if self.counter < self.restart_interval {
            shared_prefix_length(&self.last_key, key)
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
    }

    /// Appends the restart trailer and returns the finished block. The
    /// bytes stay valid until `reset`.
    pub fn finish(&mut self) -> &[u8] {
        assert!(!self.finished, "block already finished");
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Size of the block if it were finished now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * U32_SIZE + U32_SIZE
    }

    /// True if no entries have been added since the last reset.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn shared_prefix_length(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|&(a, b)| a == b).count()
}

/// A decoded entry header: `(shared, non_shared, value_len, header_len)`.
fn decode_entry_header(mut input: &[u8]) -> Option<(usize, usize, usize, usize)> {
    let start = input.len();
    let shared = get_varint32(&mut input)? as usize;
    let non_shared = get_varint32(&mut input)? as usize;
    let value_len = get_varint32(&mut input)? as usize;
    if input.len() < non_shared + value_len {
        return None;
    }
    Some((shared, non_shared, value_len, start - input.len()))
}

/// A finished block, parsed just enough to locate its restart array.
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    restart_offset: usize,
    num_restarts: usize,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < U32_SIZE {
            return Err(Error::Corruption("block too short".to_string()));
        }
        let num_restarts = decode_fixed32(&data[data.len() - U32_SIZE..]) as usize;
        let max_restarts = (data.len() - U32_SIZE) / U32_SIZE;
        if num_restarts > max_restarts {
            return Err(Error::Corruption(format!(
                "block restart count {} exceeds block size {}",
                num_restarts,
                data.len()
            )));
        }
        let restart_offset = data.len() - (1 + num_restarts) * U32_SIZE;
        let block = Self {
            data,
            restart_offset,
            num_restarts,
        };
        block.check_restarts()?;
        Ok(block)
    }

    /// The first restart point is the start of the block; the rest strictly
    /// increase and start inside the entry area.
    fn check_restarts(&self) -> Result<()> {
        let mut previous = None;
        for index in 0..self.num_restarts {
            let offset = self.restart_point(index);
            let in_order = match previous {
                None => offset == 0,
                Some(previous) => offset > previous && offset < self.restart_offset,
            };
            if !in_order {
                return Err(Error::Corruption(format!(
                    "bad restart point {} at index {}",
                    offset, index
                )));
            }
            previous = Some(offset);
        }
        Ok(())
    }

    /// Total encoded size, trailer included.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn num_restarts(&self) -> usize {
        self.num_restarts
    }

    pub fn restart_point(&self, index: usize) -> usize {
        decode_fixed32(&self.data[self.restart_offset + index * U32_SIZE..]) as usize
    }

    pub fn iter(self: &Arc<Self>, comparator: Arc<dyn Comparator>) -> BlockIter {
        BlockIter {
            block: self.clone(),
            comparator,
            current: self.restart_offset,
            restart_index: self.num_restarts,
            key: Vec::new(),
            value: (0, 0),
            err: None,
        }
    }
}

pub struct BlockIter {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current entry; `restart_offset` when invalid.
    current: usize,
    /// Restart region containing `current`.
    restart_index: usize,
    key: Vec<u8>,
    /// Byte range of the current value. Its end is the next entry's offset.
    value: (usize, usize),
    err: Option<Error>,
}

impl BlockIter {
    fn invalidate(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
        self.key.clear();
        self.value = (0, 0);
    }

    fn corruption(&mut self) {
        self.invalidate();
        self.err = Some(Error::Corruption("bad entry in block".to_string()));
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.restart_index = index;
        let offset = self.block.restart_point(index);
        self.value = (offset, offset);
    }

    /// Decodes the entry that follows the current one.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.value.1;
        let limit = self.block.restart_offset;
        if self.current >= limit {
            self.invalidate();
            return false;
        }

        let block = &self.block;
        let Some((shared, non_shared, value_len, header_len)) =
            decode_entry_header(&block.data[self.current..limit])
        else {
            self.corruption();
            return false;
        };
        if self.key.len() < shared {
            self.corruption();
            return false;
        }

        let key_start = self.current + header_len;
        let value_start = key_start + non_shared;
        self.key.truncate(shared);
        self.key
            .extend_from_slice(&block.data[key_start..value_start]);
        self.value = (value_start, value_start + value_len);

        while self.restart_index + 1 < block.num_restarts
            && block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        true
    }
}

impl KvIterator for BlockIter {
    fn valid(&self) -> bool {
        self.err.is_none() && self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }

        // Find the last restart point whose key is < target.
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let offset = self.block.restart_point(mid);
            let header = if offset < self.block.restart_offset {
                decode_entry_header(&self.block.data[offset..self.block.restart_offset])
            } else {
                None
            };
            let Some((0, non_shared, _, header_len)) = header else {
                self.corruption();
                return;
            };
            let key_start = offset + header_len;
            let mid_key = &self.block.data[key_start..key_start + non_shared];
            if self.comparator.compare(mid_key, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        // Linear scan within the region for the first key >= target.
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        assert!(self.valid());
        self.parse_next_key();
    }

    fn key(&self) -> &[u8] {
        assert!(self.valid());
        &self.key
    }

    fn value(&self) -> &[u8] {
        assert!(self.valid());
        &self.block.data[self.value.0..self.value.1]
    }

    fn status(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
