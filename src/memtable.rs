//! Memtable implementation using a concurrent skip list.
//!
//! The memtable is the in-memory sink write batches are applied to and the
//! source a table is built from once it stops receiving writes.
//!
//! # Ordering
//!
//! Entries are keyed by their encoded internal key and ordered by an
//! [`InternalKeyComparator`] over the memtable's user comparator: user keys
//! ascending, newest version first. A table built from a memtable must be
//! configured with the same ordering, i.e. `Options::comparator` set to the
//! same user comparator followed by `Options::internal_keys`.
//!
//! Nothing is ever overwritten in place; a later write or a deletion is a new
//! entry that shadows older ones by sequence number.
//!
//! # Crossbeam SkipMap
//!
//! `crossbeam-skiplist::SkipMap` gives lock-free concurrent readers and
//! writers plus ordered, bounded traversal, which is all the flush path needs.

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

use crossbeam_skiplist::{map::Entry, SkipMap};

use crate::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
use crate::error::Result;
use crate::iterator::KvIterator;
use crate::key::{InternalKey, SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK};

/// An encoded internal key that orders itself with the memtable's comparator.
struct MemKey {
    key: InternalKey,
    comparator: InternalKeyComparator,
}

impl PartialEq for MemKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MemKey {}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(self.key.encode(), other.key.encode())
    }
}

/// In-memory sorted table of internal keys.
pub struct Memtable {
    comparator: InternalKeyComparator,
    data: SkipMap<MemKey, Vec<u8>>,
}

impl Memtable {
    /// A memtable ordering user keys bytewise.
    pub fn new() -> Self {
        Self::with_comparator(Arc::new(BytewiseComparator))
    }

    pub fn with_comparator(user_comparator: Arc<dyn Comparator>) -> Self {
        Self {
            comparator: InternalKeyComparator::new(user_comparator),
            data: SkipMap::new(),
        }
    }

    fn mem_key(&self, key: InternalKey) -> MemKey {
        MemKey {
            key,
            comparator: self.comparator.clone(),
        }
    }

    /// Records `value_type` for `key` at `sequence`. Deletions carry an
    /// empty value.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let key = self.mem_key(InternalKey::new(key, sequence, value_type));
        self.data.insert(key, value.to_vec());
    }

    /// Looks up the newest version of `key` visible at `snapshot`.
    ///
    /// Returns `Some(Some(value))` for a live value, `Some(None)` when the
    /// newest visible version is a deletion, and `None` when the memtable
    /// holds no visible version at all.
    pub fn get(&self, key: &[u8], snapshot: SequenceNumber) -> Option<Option<Vec<u8>>> {
        let lookup = self.mem_key(InternalKey::new(key, snapshot, VALUE_TYPE_FOR_SEEK));
        let entry = self.data.lower_bound(Bound::Included(&lookup))?;
        let found = entry.key().key.parse().ok()?;
        if self.comparator.user_comparator().compare(found.user_key, key) != Ordering::Equal {
            return None;
        }
        match found.value_type {
            ValueType::Value => Some(Some(entry.value().clone())),
            ValueType::Deletion => Some(None),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A cursor over the encoded internal keys, in internal key order.
    pub fn iter(&self) -> MemtableIterator<'_> {
        MemtableIterator {
            memtable: self,
            current: None,
        }
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("comparator", &self.comparator)
            .field("len", &self.data.len())
            .finish()
    }
}

pub struct MemtableIterator<'a> {
    memtable: &'a Memtable,
    current: Option<Entry<'a, MemKey, Vec<u8>>>,
}

impl KvIterator for MemtableIterator<'_> {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.current = self.memtable.data.front();
    }

    /// `target` is an internal key. Anything that cannot be one (shorter than
    /// a trailer, or with an unknown type tag) is taken as a bare user key and
    /// positions at its newest version.
    fn seek(&mut self, target: &[u8]) {
        let target = if target.len() >= 8 && ValueType::try_from(target[target.len() - 8]).is_ok() {
            InternalKey::decode_from(target)
        } else {
            InternalKey::new(target, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK)
        };
        let lookup = self.memtable.mem_key(target);
        self.current = self.memtable.data.lower_bound(Bound::Included(&lookup));
    }

    fn next(&mut self) {
        self.current = self.current.as_ref().and_then(|entry| entry.next());
    }

    fn key(&self) -> &[u8] {
        self.current
            .as_ref()
            .map(|entry| entry.key().key.encode())
            .unwrap_or_default()
    }

    fn value(&self) -> &[u8] {
        self.current
            .as_ref()
            .map(|entry| entry.value().as_slice())
            .unwrap_or_default()
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode_fixed64;
    use crate::encoding::format::{Formatter, Internal};
    use crate::iterator::collect_entries;
    use crate::key::extract_user_key;

    fn sequence_of(internal_key: &[u8]) -> SequenceNumber {
        decode_fixed64(&internal_key[extract_user_key(internal_key).len()..]) >> 8
    }

    /// Orders user keys from largest to smallest.
    struct ReverseComparator;

    impl Comparator for ReverseComparator {
        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            b.cmp(a)
        }

        fn name(&self) -> &'static str {
            "test.ReverseComparator"
        }
    }

    #[test]
    fn test_get_newest_visible_version() {
        let mem = Memtable::new();
        mem.add(1, ValueType::Value, b"key", b"v1");
        mem.add(2, ValueType::Value, b"key", b"v2");
        mem.add(3, ValueType::Deletion, b"key", b"");
        mem.add(4, ValueType::Value, b"key", b"v4");

        assert_eq!(mem.get(b"key", 1), Some(Some(b"v1".to_vec())));
        assert_eq!(mem.get(b"key", 2), Some(Some(b"v2".to_vec())));
        assert_eq!(mem.get(b"key", 3), Some(None));
        assert_eq!(mem.get(b"key", 100), Some(Some(b"v4".to_vec())));
        assert_eq!(mem.get(b"key", 0), None);
        assert_eq!(mem.get(b"other", 100), None);
    }

    #[test]
    fn test_iteration_in_internal_key_order() {
        let mem = Memtable::new();
        mem.add(10, ValueType::Value, b"b", b"old");
        mem.add(11, ValueType::Value, b"a", b"x");
        mem.add(12, ValueType::Value, b"b", b"new");

        let rendered: Vec<String> = collect_entries(&mut mem.iter())
            .unwrap()
            .iter()
            .map(|(k, v)| Internal::key_value(k, v))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "\"a\" @ 11 : put -> \"x\"",
                "\"b\" @ 12 : put -> \"new\"",
                "\"b\" @ 10 : put -> \"old\"",
            ]
        );
    }

    #[test]
    fn test_custom_user_comparator_orders_entries() {
        let mem = Memtable::with_comparator(Arc::new(ReverseComparator));
        mem.add(1, ValueType::Value, b"a", b"1");
        mem.add(2, ValueType::Value, b"c", b"3");
        mem.add(3, ValueType::Value, b"b", b"2");
        mem.add(4, ValueType::Deletion, b"c", b"");

        let keys: Vec<(Vec<u8>, SequenceNumber)> = collect_entries(&mut mem.iter())
            .unwrap()
            .iter()
            .map(|(k, _)| (extract_user_key(k).to_vec(), sequence_of(k)))
            .collect();
        assert_eq!(
            keys,
            vec![
                (b"c".to_vec(), 4),
                (b"c".to_vec(), 2),
                (b"b".to_vec(), 3),
                (b"a".to_vec(), 1),
            ]
        );

        assert_eq!(mem.get(b"b", 10), Some(Some(b"2".to_vec())));
        assert_eq!(mem.get(b"c", 10), Some(None));
        assert_eq!(mem.get(b"c", 3), Some(Some(b"3".to_vec())));

        let mut iter = mem.iter();
        iter.seek(b"bb");
        assert_eq!(extract_user_key(iter.key()), b"b");
    }

    #[test]
    fn test_seek_lands_on_first_entry_at_or_after_target() {
        let mem = Memtable::new();
        mem.add(1, ValueType::Value, b"apple", b"1");
        mem.add(2, ValueType::Value, b"cherry", b"2");

        let mut iter = mem.iter();
        iter.seek(InternalKey::new(b"banana", 9, VALUE_TYPE_FOR_SEEK).encode());
        assert!(iter.valid());
        assert_eq!(extract_user_key(iter.key()), b"cherry");

        iter.seek(b"apple");
        assert_eq!(extract_user_key(iter.key()), b"apple");

        iter.seek(InternalKey::new(b"zebra", 9, VALUE_TYPE_FOR_SEEK).encode());
        assert!(!iter.valid());
    }

    #[test]
    fn test_len() {
        let mem = Memtable::default();
        assert!(mem.is_empty());
        mem.add(1, ValueType::Value, b"abc", b"defg");
        mem.add(2, ValueType::Deletion, b"abc", b"");
        assert_eq!(mem.len(), 2);
    }
}
