//! Little-endian base-128 variable length integers.
//!
//! Each byte carries seven bits of payload, least significant group first.
//! The high bit is set on every byte except the last one. A `u32` takes at
//! most five bytes and a `u64` at most ten.

pub const MAX_VARINT32_LEN: usize = 5;
pub const MAX_VARINT64_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, value as u64)
}

pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= CONTINUATION as u64 {
        dst.push((value as u8) | CONTINUATION);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Number of bytes `value` occupies once varint encoded.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= CONTINUATION as u64 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decodes a varint32 from the front of `input` and advances it past the
/// consumed bytes. Returns `None` on truncation or overflow, leaving `input`
/// untouched.
pub fn get_varint32(input: &mut &[u8]) -> Option<u32> {
    let (value, len) = decode(input, MAX_VARINT32_LEN)?;
    let value = u32::try_from(value).ok()?;
    *input = &input[len..];
    Some(value)
}

pub fn get_varint64(input: &mut &[u8]) -> Option<u64> {
    let (value, len) = decode(input, MAX_VARINT64_LEN)?;
    *input = &input[len..];
    Some(value)
}

fn decode(input: &[u8], max_len: usize) -> Option<(u64, usize)> {
    let mut result = 0u64;
    for (i, &byte) in input.iter().take(max_len).enumerate() {
        let shift = 7 * i as u32;
        if shift == 63 && byte > 1 {
            return None;
        }
        result |= ((byte & !CONTINUATION) as u64) << shift;
        if byte & CONTINUATION == 0 {
            return Some((result, i + 1));
        }
    }
    None
}
