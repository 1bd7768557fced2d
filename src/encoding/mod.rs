//! Byte-level encoding helpers shared by the batch, block and table formats.
//!
//! Fixed-width integers are little-endian. Lengths are varints so that short
//! keys and values cost a single byte of overhead.

pub mod format;
pub mod varint;

use byteorder::{ByteOrder, LittleEndian};

pub use varint::{get_varint32, get_varint64, put_varint32, put_varint64, varint_length};

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    dst.extend_from_slice(&buf);
}

pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Reads a fixed32 from the first four bytes of `src`. Callers check length.
pub fn decode_fixed32(src: &[u8]) -> u32 {
    LittleEndian::read_u32(&src[..4])
}

/// Reads a fixed64 from the first eight bytes of `src`. Callers check length.
pub fn decode_fixed64(src: &[u8]) -> u64 {
    LittleEndian::read_u64(&src[..8])
}

/// Overwrites four bytes at `offset` with `value`.
pub fn encode_fixed32_at(dst: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut dst[offset..offset + 4], value);
}

/// Overwrites eight bytes at `offset` with `value`.
pub fn encode_fixed64_at(dst: &mut [u8], offset: usize, value: u64) {
    LittleEndian::write_u64(&mut dst[offset..offset + 8], value);
}

pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, value: &[u8]) {
    put_varint32(dst, value.len() as u32);
    dst.extend_from_slice(value);
}

/// Splits a varint32-prefixed slice off the front of `input`.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    let mut rest = *input;
    let len = get_varint32(&mut rest)? as usize;
    if rest.len() < len {
        return None;
    }
    let (value, rest) = rest.split_at(len);
    *input = rest;
    Some(value)
}
