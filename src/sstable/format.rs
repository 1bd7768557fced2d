//! On-disk framing shared by the table writer and reader: block handles, the
//! per-block trailer and the fixed-size footer.
//!
//! ```text
//! +-----------------+------------------+-------------------+
//! | block contents  | compression: u8  | crc32c: fixed32   |
//! +-----------------+------------------+-------------------+
//!
//! footer (FOOTER_SIZE bytes):
//! +-------------------------------------+------------------+
//! | index handle, zero padded to 20     | magic: fixed64   |
//! +-------------------------------------+------------------+
//! ```
//!
//! The checksum covers the block contents and the compression byte.

use crc::{Crc, CRC_32_ISCSI};

use crate::encoding::{decode_fixed32, decode_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::env::RandomAccessFile;
use crate::error::Result;
use crate::Error;

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Compression byte for uncompressed blocks, the only kind written.
pub const NO_COMPRESSION: u8 = 0;

/// Compression byte plus checksum.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Two varint64s at their widest.
pub const MAX_ENCODED_HANDLE_LEN: usize = 20;

pub const FOOTER_SIZE: usize = MAX_ENCODED_HANDLE_LEN + 8;

/// "cindrtbl" read as a little-endian u64.
pub const TABLE_MAGIC_NUMBER: u64 = 0x6c62_7472_646e_6963;

/// Location of a block within a table file. `size` excludes the trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(MAX_ENCODED_HANDLE_LEN);
        self.encode_to(&mut dst);
        dst
    }

    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        match (get_varint64(input), get_varint64(input)) {
            (Some(offset), Some(size)) => Ok(Self { offset, size }),
            _ => Err(Error::Corruption("bad block handle".to_string())),
        }
    }

    /// Fails unless the block and its trailer end at or before `limit`.
    pub fn check_within(&self, limit: u64) -> Result<()> {
        let end = self
            .offset
            .checked_add(self.size)
            .and_then(|end| end.checked_add(BLOCK_TRAILER_SIZE as u64));
        match end {
            Some(end) if end <= limit => Ok(()),
            _ => Err(Error::Corruption(format!(
                "block handle at offset {} with size {} exceeds {} bytes",
                self.offset, self.size, limit
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn new(index_handle: BlockHandle) -> Self {
        Self { index_handle }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        self.index_handle.encode_to(dst);
        dst.resize(start + MAX_ENCODED_HANDLE_LEN, 0);
        put_fixed64(dst, TABLE_MAGIC_NUMBER);
        debug_assert_eq!(dst.len(), start + FOOTER_SIZE);
    }

    pub fn decode_from(input: &[u8]) -> Result<Self> {
        if input.len() < FOOTER_SIZE {
            return Err(Error::InvalidArgument(
                "file is too short to be a table".to_string(),
            ));
        }
        let magic = decode_fixed64(&input[MAX_ENCODED_HANDLE_LEN..]);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::InvalidArgument(
                "not a table (bad magic number)".to_string(),
            ));
        }
        let mut handle_bytes = &input[..MAX_ENCODED_HANDLE_LEN];
        let index_handle = BlockHandle::decode_from(&mut handle_bytes)?;
        Ok(Self { index_handle })
    }
}

/// Checksum stored in a block trailer.
pub fn block_checksum(contents: &[u8], compression: u8) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(contents);
    digest.update(&[compression]);
    digest.finalize()
}

/// Reads the block at `handle` and strips its trailer. Callers bound the
/// handle with [`BlockHandle::check_within`] first.
pub fn read_block(
    file: &dyn RandomAccessFile,
    handle: &BlockHandle,
    verify_checksums: bool,
) -> Result<Vec<u8>> {
    let n = usize::try_from(handle.size)
        .ok()
        .filter(|n| n.checked_add(BLOCK_TRAILER_SIZE).is_some())
        .ok_or_else(|| Error::Corruption(format!("block size {} too large", handle.size)))?;
    let mut buf = file.read_at(handle.offset, n + BLOCK_TRAILER_SIZE)?;
    if buf.len() != n + BLOCK_TRAILER_SIZE {
        return Err(Error::Corruption(format!(
            "truncated block read at offset {}",
            handle.offset
        )));
    }

    let compression = buf[n];
    if verify_checksums {
        let expected = decode_fixed32(&buf[n + 1..]);
        if block_checksum(&buf[..n], compression) != expected {
            return Err(Error::ChecksumMismatch);
        }
    }
    if compression != NO_COMPRESSION {
        return Err(Error::Corruption(format!(
            "unknown block compression type {}",
            compression
        )));
    }

    buf.truncate(n);
    Ok(buf)
}
