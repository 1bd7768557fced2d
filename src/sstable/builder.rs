use std::cmp::Ordering;

use crate::config::Options;
use crate::encoding::put_fixed32;
use crate::env::WritableFile;
use crate::error::Result;

use super::block::BlockBuilder;
use super::format::{block_checksum, BlockHandle, Footer, NO_COMPRESSION};

/// Writes a sorted run of entries to a file as a table.
///
/// Data blocks are closed once they reach `options.block_size`. The index
/// entry for a block is only emitted when the next key arrives (or on
/// `finish`), keyed by the last key of the block.
pub struct TableBuilder<'a> {
    options: Options,
    file: &'a mut dyn WritableFile,
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool,
    /// Handle of the last flushed data block, not yet in the index.
    pending_handle: Option<BlockHandle>,
}

impl<'a> TableBuilder<'a> {
    pub fn new(options: &Options, file: &'a mut dyn WritableFile) -> Self {
        Self {
            options: options.clone(),
            file,
            offset: 0,
            data_block: BlockBuilder::new(options),
            // Index keys are not prefix compressed against each other.
            index_block: BlockBuilder::with_restart_interval(options.comparator.clone(), 1),
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            pending_handle: None,
        }
    }

    /// Adds an entry. Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        assert!(!self.closed, "add called on a finished table");
        if self.num_entries > 0 {
            assert!(
                self.options.comparator.compare(key, &self.last_key) == Ordering::Greater,
                "table keys must be added in strictly increasing order"
            );
        }

        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Closes the current data block, if it has entries.
    pub fn flush(&mut self) -> Result<()> {
        assert!(!self.closed);
        if self.data_block.is_empty() {
            return Ok(());
        }
        assert!(self.pending_handle.is_none());
        let handle = write_raw_block(&mut *self.file, &mut self.offset, self.data_block.finish())?;
        self.data_block.reset();
        self.pending_handle = Some(handle);
        self.file.flush()
    }

    /// Writes the remaining data, the index block and the footer. The file
    /// itself is left open; syncing and closing it is up to the caller.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;

        if let Some(handle) = self.pending_handle.take() {
            self.index_block.add(&self.last_key, &handle.encode());
        }
        let index_handle =
            write_raw_block(&mut *self.file, &mut self.offset, self.index_block.finish())?;

        let mut footer = Vec::new();
        Footer::new(index_handle).encode_to(&mut footer);
        self.file.append(&footer)?;
        self.offset += footer.len() as u64;
        Ok(())
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far; the final file size once `finish` succeeded.
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}

fn write_raw_block(
    file: &mut dyn WritableFile,
    offset: &mut u64,
    contents: &[u8],
) -> Result<BlockHandle> {
    let handle = BlockHandle::new(*offset, contents.len() as u64);
    file.append(contents)?;

    let mut trailer = Vec::with_capacity(super::format::BLOCK_TRAILER_SIZE);
    trailer.push(NO_COMPRESSION);
    put_fixed32(&mut trailer, block_checksum(contents, NO_COMPRESSION));
    file.append(&trailer)?;

    *offset += (contents.len() + trailer.len()) as u64;
    Ok(handle)
}
