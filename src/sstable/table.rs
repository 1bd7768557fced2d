//! Read side of a table: the footer and index block are loaded on open,
//! data blocks are read on demand while iterating.
//!
//! ```text
//! +-------------------+
//! | Data Block 1      |
//! +-------------------+
//! | ...               |
//! +-------------------+
//! | Data Block N      |
//! +-------------------+
//! | Index Block       |  last key of each data block -> BlockHandle
//! +-------------------+
//! | Footer            |  index handle + magic
//! +-------------------+
//! ```

use std::sync::Arc;

use crate::config::Options;
use crate::env::RandomAccessFile;
use crate::error::Result;
use crate::iterator::KvIterator;
use crate::Error;

use super::block::{Block, BlockIter};
use super::format::{read_block, BlockHandle, Footer, FOOTER_SIZE};

pub struct Table {
    options: Options,
    file: Box<dyn RandomAccessFile>,
    index_block: Arc<Block>,
    size: u64,
}

impl Table {
    /// Opens a table of `size` bytes. The index block is always checksummed.
    pub fn open(options: &Options, file: Box<dyn RandomAccessFile>, size: u64) -> Result<Self> {
        if size < FOOTER_SIZE as u64 {
            return Err(Error::InvalidArgument(
                "file is too short to be a table".to_string(),
            ));
        }
        let footer_bytes = file.read_at(size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode_from(&footer_bytes)?;
        footer
            .index_handle
            .check_within(size - FOOTER_SIZE as u64)?;

        let index_contents = read_block(file.as_ref(), &footer.index_handle, true)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        Ok(Self {
            options: options.clone(),
            file,
            index_block,
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn iter(self: &Arc<Self>) -> TableIter {
        TableIter {
            table: self.clone(),
            index_iter: self.index_block.iter(self.options.comparator.clone()),
            data_iter: None,
            data_handle: Vec::new(),
            err: None,
        }
    }

    fn block_iter(&self, encoded_handle: &[u8]) -> Result<BlockIter> {
        let mut input = encoded_handle;
        let handle = BlockHandle::decode_from(&mut input)?;
        handle.check_within(self.size - FOOTER_SIZE as u64)?;
        let contents = read_block(self.file.as_ref(), &handle, self.options.verify_checksums)?;
        let block = Arc::new(Block::new(contents)?);
        Ok(block.iter(self.options.comparator.clone()))
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("size", &self.size)
            .field("index_block", &self.index_block)
            .finish()
    }
}

/// Walks the index block and, for each entry, the data block it points to.
/// The first block that fails to load ends the iteration.
pub struct TableIter {
    table: Arc<Table>,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    /// Encoded handle of the block behind `data_iter`.
    data_handle: Vec<u8>,
    err: Option<Error>,
}

impl TableIter {
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            return;
        }
        let handle = self.index_iter.value();
        if self.data_iter.is_some() && handle == self.data_handle.as_slice() {
            return;
        }
        match self.table.block_iter(handle) {
            Ok(iter) => {
                self.data_handle.clear();
                self.data_handle.extend_from_slice(handle);
                self.data_iter = Some(iter);
            }
            Err(err) => {
                self.err = Some(err);
                self.data_iter = None;
            }
        }
    }

    fn skip_empty_blocks(&mut self) {
        while !self.data_iter.as_ref().map_or(false, |iter| iter.valid()) {
            if let Some(Err(err)) = self.data_iter.as_ref().map(|iter| iter.status()) {
                self.err = Some(err);
            }
            if self.err.is_some() || !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first();
            }
        }
    }
}

impl KvIterator for TableIter {
    fn valid(&self) -> bool {
        self.err.is_none() && self.data_iter.as_ref().map_or(false, |iter| iter.valid())
    }

    fn seek_to_first(&mut self) {
        self.err = None;
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first();
        }
        self.skip_empty_blocks();
    }

    fn seek(&mut self, target: &[u8]) {
        self.err = None;
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target);
        }
        self.skip_empty_blocks();
    }

    fn next(&mut self) {
        assert!(self.valid());
        if let Some(iter) = self.data_iter.as_mut() {
            iter.next();
        }
        self.skip_empty_blocks();
    }

    fn key(&self) -> &[u8] {
        match &self.data_iter {
            Some(iter) => iter.key(),
            None => panic!("key called on an invalid table iterator"),
        }
    }

    fn value(&self) -> &[u8] {
        match &self.data_iter {
            Some(iter) => iter.value(),
            None => panic!("value called on an invalid table iterator"),
        }
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        match &self.data_iter {
            Some(iter) => iter.status(),
            None => Ok(()),
        }
    }
}
