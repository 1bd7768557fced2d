//! Human-readable rendering of raw and internal keys, used by `Debug` impls
//! and diagnostics.

use itertools::Itertools as _;

use crate::key::{ParsedInternalKey, ValueType};

/// Formats encoded keys and values.
pub trait Formatter {
    /// Formats a key.
    fn key(key: &[u8]) -> String;

    /// Formats a value. Also takes the key to determine the kind of value.
    fn value(key: &[u8], value: &[u8]) -> String;

    /// Formats a key/value pair.
    fn key_value(key: &[u8], value: &[u8]) -> String {
        format!("{} -> {}", Self::key(key), Self::value(key, value))
    }
}

/// Formats raw byte slices without any decoding.
pub struct Raw;

impl Raw {
    /// Formats raw bytes as escaped ASCII strings.
    pub fn bytes(bytes: &[u8]) -> String {
        let escaped = bytes
            .iter()
            .copied()
            .flat_map(std::ascii::escape_default)
            .collect_vec();
        format!("\"{}\"", String::from_utf8_lossy(&escaped))
    }
}

impl Formatter for Raw {
    fn key(key: &[u8]) -> String {
        Self::bytes(key)
    }

    fn value(_key: &[u8], value: &[u8]) -> String {
        Self::bytes(value)
    }
}

/// Formats internal keys as `"user_key" @ sequence : type`. Bytes that do
/// not parse as an internal key fall back to [`Raw`].
pub struct Internal;

impl Formatter for Internal {
    fn key(key: &[u8]) -> String {
        let Ok(parsed) = ParsedInternalKey::parse(key) else {
            return Raw::key(key);
        };
        let kind = match parsed.value_type {
            ValueType::Value => "put",
            ValueType::Deletion => "del",
        };
        format!("{} @ {} : {}", Raw::bytes(parsed.user_key), parsed.sequence, kind)
    }

    fn value(key: &[u8], value: &[u8]) -> String {
        match ParsedInternalKey::parse(key) {
            Ok(parsed) if parsed.value_type == ValueType::Deletion => "None".to_string(),
            _ => Raw::bytes(value),
        }
    }
}
