//! Turns a sorted iterator (usually a frozen memtable) into a table file.
//!
//! The file only survives if every step succeeded: all entries written, the
//! builder finished, the file synced and closed, and the verifier able to
//! read it back. On any other outcome the partial file is removed.

use std::io::ErrorKind;
use std::path::Path;

use crate::config::Options;
use crate::env::{Env, WritableFile};
use crate::error::Result;
use crate::filename::table_file_name;
use crate::iterator::KvIterator;
use crate::key::InternalKey;
use crate::sstable::builder::TableBuilder;
use crate::table_cache::Verifier;
use crate::Error;

/// What the caller learns about a built table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetaData {
    pub number: u64,
    /// Zero unless the table was kept.
    pub file_size: u64,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

impl FileMetaData {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }
}

/// Builds table `meta.number` in `dbname` from the entries of `iter`.
///
/// An empty iterator produces no file and succeeds. A failure while creating
/// the file is returned as is. Every later failure removes whatever was
/// written; an error reported by `iter` itself takes precedence over all
/// others.
pub fn build_table<I: KvIterator + ?Sized>(
    dbname: &Path,
    env: &dyn Env,
    options: &Options,
    verifier: &dyn Verifier,
    iter: &mut I,
    meta: &mut FileMetaData,
) -> Result<()> {
    meta.file_size = 0;
    options.validate()?;
    iter.seek_to_first();

    let path = table_file_name(dbname, meta.number);
    let mut result = Ok(0);
    if iter.valid() {
        let mut file = env.new_writable_file(&path)?;
        result = write_entries(options, file.as_mut(), iter, meta)
            .and_then(|entries| sync_and_close(file.as_mut()).map(|()| entries))
            .and_then(|entries| {
                verifier
                    .verify_table(meta.number, meta.file_size)
                    .map(|()| entries)
            });
    } else {
        tracing::debug!(file_number = meta.number, "No entries to write, skipping table");
    }

    if let Err(e) = iter.status() {
        result = Err(e);
    }

    match result {
        Ok(entries) if meta.file_size > 0 => {
            tracing::info!(
                file_number = meta.number,
                file_size = meta.file_size,
                entries = entries,
                "Built table"
            );
            Ok(())
        }
        result => {
            discard(env, verifier, &path, meta, result.as_ref().err());
            result.map(|_| ())
        }
    }
}

/// Streams every entry into a new table and finishes it. Returns the number
/// of entries written.
fn write_entries<I: KvIterator + ?Sized>(
    options: &Options,
    file: &mut dyn WritableFile,
    iter: &mut I,
    meta: &mut FileMetaData,
) -> Result<u64> {
    let mut builder = TableBuilder::new(options, file);
    meta.smallest.set_from(iter.key());
    while iter.valid() {
        let key = iter.key();
        meta.largest.set_from(key);
        builder.add(key, iter.value())?;
        iter.next();
    }

    builder.finish()?;
    let file_size = builder.file_size();
    assert!(file_size > 0, "finished table reported zero bytes");
    meta.file_size = file_size;
    Ok(builder.num_entries())
}

fn sync_and_close(file: &mut dyn WritableFile) -> Result<()> {
    file.sync()?;
    file.close()
}

fn discard(
    env: &dyn Env,
    verifier: &dyn Verifier,
    path: &Path,
    meta: &mut FileMetaData,
    cause: Option<&Error>,
) {
    if let Some(e) = cause {
        tracing::warn!(file_number = meta.number, error = %e, "Table build failed");
    }
    meta.file_size = 0;
    verifier.evict(meta.number);
    match env.remove_file(path) {
        Ok(()) => tracing::debug!(file_number = meta.number, "Removed discarded table"),
        Err(Error::IoError(e)) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(file_number = meta.number, error = %e, "Failed to remove table file")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{insert_into, WriteBatch};
    use crate::env::{FsEnv, RandomAccessFile};
    use crate::iterator::collect_entries;
    use crate::key::{ValueType, MAX_SEQUENCE_NUMBER};
    use crate::memtable::{Memtable, MemtableIterator};
    use crate::table_cache::TableCache;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    fn injected(what: &str) -> Error {
        Error::IoError(io::Error::new(ErrorKind::Other, format!("injected {} failure", what)))
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Fault {
        Create,
        Append,
        Sync,
        Close,
    }

    /// Local file system that fails one kind of operation on demand.
    struct FaultyEnv {
        fault: Option<Fault>,
    }

    struct FaultyFile {
        inner: Box<dyn WritableFile>,
        fault: Option<Fault>,
    }

    impl Env for FaultyEnv {
        fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
            if self.fault == Some(Fault::Create) {
                return Err(injected("create"));
            }
            Ok(Box::new(FaultyFile {
                inner: FsEnv.new_writable_file(path)?,
                fault: self.fault,
            }))
        }

        fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>> {
            FsEnv.new_random_access_file(path)
        }

        fn remove_file(&self, path: &Path) -> Result<()> {
            FsEnv.remove_file(path)
        }

        fn file_exists(&self, path: &Path) -> bool {
            FsEnv.file_exists(path)
        }

        fn file_size(&self, path: &Path) -> Result<u64> {
            FsEnv.file_size(path)
        }
    }

    impl WritableFile for FaultyFile {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            if self.fault == Some(Fault::Append) {
                return Err(injected("append"));
            }
            self.inner.append(data)
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }

        fn sync(&mut self) -> Result<()> {
            if self.fault == Some(Fault::Sync) {
                return Err(injected("sync"));
            }
            self.inner.sync()
        }

        fn close(&mut self) -> Result<()> {
            if self.fault == Some(Fault::Close) {
                return Err(injected("close"));
            }
            self.inner.close()
        }
    }

    /// Yields `limit` entries of a memtable, then fails.
    struct FailingIter<'a> {
        inner: MemtableIterator<'a>,
        limit: usize,
        yielded: usize,
    }

    impl KvIterator for FailingIter<'_> {
        fn valid(&self) -> bool {
            self.yielded < self.limit && self.inner.valid()
        }

        fn seek_to_first(&mut self) {
            self.yielded = 0;
            self.inner.seek_to_first();
        }

        fn seek(&mut self, target: &[u8]) {
            self.inner.seek(target);
        }

        fn next(&mut self) {
            self.yielded += 1;
            self.inner.next();
        }

        fn key(&self) -> &[u8] {
            self.inner.key()
        }

        fn value(&self) -> &[u8] {
            self.inner.value()
        }

        fn status(&self) -> Result<()> {
            if self.yielded >= self.limit {
                return Err(injected("read"));
            }
            self.inner.status()
        }
    }

    /// Fails every verification and remembers evictions.
    #[derive(Default)]
    struct RejectingVerifier {
        evicted: Mutex<Vec<u64>>,
    }

    impl Verifier for RejectingVerifier {
        fn verify_table(&self, _file_number: u64, _file_size: u64) -> Result<()> {
            Err(Error::Corruption("rejected".to_string()))
        }

        fn evict(&self, file_number: u64) {
            self.evicted.lock().unwrap().push(file_number);
        }
    }

    fn options() -> Options {
        Options::default().internal_keys()
    }

    fn memtable_with(keys: &[&str]) -> Memtable {
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.put(key.as_bytes(), format!("value of {}", key).as_bytes());
        }
        batch.set_sequence(100);
        let memtable = Memtable::new();
        insert_into(&batch, &memtable).unwrap();
        memtable
    }

    fn cache(dir: &TempDir, options: &Options) -> TableCache {
        TableCache::new(dir.path(), Arc::new(FsEnv), options.clone())
    }

    #[test]
    fn test_empty_input_writes_nothing() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let memtable = Memtable::new();
        let mut meta = FileMetaData::new(1);
        meta.file_size = 99;

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        assert_eq!(meta.file_size, 0);
        assert!(!FsEnv.file_exists(&table_file_name(dir.path(), 1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_builds_and_verifies_table() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let memtable = memtable_with(&["m", "a", "z"]);
        let mut meta = FileMetaData::new(7);

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        let path = table_file_name(dir.path(), 7);
        assert!(meta.file_size > 0);
        assert_eq!(FsEnv.file_size(&path).unwrap(), meta.file_size);
        assert_eq!(meta.smallest.user_key(), b"a");
        assert_eq!(meta.largest.user_key(), b"z");
        assert!(cache.contains(7));

        let smallest = meta.smallest.parse().unwrap();
        assert_eq!(smallest.sequence, 101);
        assert_eq!(smallest.value_type, ValueType::Value);

        let stored = collect_entries(&mut cache.new_iterator(7, meta.file_size).unwrap()).unwrap();
        assert_eq!(stored, collect_entries(&mut memtable.iter()).unwrap());
    }

    #[test]
    fn test_multi_version_input_round_trips() {
        let dir = tempdir().unwrap();
        let options = options().block_size(512).block_restart_interval(4).paranoid_checks(true);
        let cache = cache(&dir, &options);

        let memtable = Memtable::new();
        let mut sequence = 1;
        for round in 0..3 {
            for i in 0..200 {
                let key = format!("user_{:04}", i);
                if (i + round) % 5 == 0 {
                    memtable.add(sequence, ValueType::Deletion, key.as_bytes(), b"");
                } else {
                    let value = format!("v{}_{}", round, i);
                    memtable.add(sequence, ValueType::Value, key.as_bytes(), value.as_bytes());
                }
                sequence += 1;
            }
        }
        let mut meta = FileMetaData::new(2);

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        assert_eq!(meta.smallest.user_key(), b"user_0000");
        assert_eq!(meta.largest.user_key(), b"user_0199");
        // Newest version of the first key sorts first; oldest of the last sorts last.
        assert_eq!(meta.smallest.parse().unwrap().sequence, 401);
        assert_eq!(meta.largest.parse().unwrap().sequence, 200);

        let stored = collect_entries(&mut cache.new_iterator(2, meta.file_size).unwrap()).unwrap();
        assert_eq!(stored.len(), 600);
        assert_eq!(stored, collect_entries(&mut memtable.iter()).unwrap());
    }

    #[test]
    fn test_file_size_covers_every_block() {
        let dir = tempdir().unwrap();
        let options = options().block_size(64);
        let cache = cache(&dir, &options);
        let keys: Vec<String> = (0..100).map(|i| format!("k{:03}", i)).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        let memtable = memtable_with(&keys);
        let mut meta = FileMetaData::new(3);

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        let on_disk = std::fs::metadata(table_file_name(dir.path(), 3)).unwrap().len();
        assert_eq!(meta.file_size, on_disk);
    }

    fn assert_fault_discards_file(fault: Fault) {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let env = FaultyEnv { fault: Some(fault) };
        let memtable = memtable_with(&["a", "m", "z"]);
        let mut meta = FileMetaData::new(4);

        let err = build_table(dir.path(), &env, &options, &cache, &mut memtable.iter(), &mut meta)
            .unwrap_err();

        assert!(err.is_io_error(), "{:?}: {}", fault, err);
        assert!(err.to_string().contains("injected"));
        assert_eq!(meta.file_size, 0);
        assert!(!FsEnv.file_exists(&table_file_name(dir.path(), 4)), "{:?}", fault);
        assert!(!cache.contains(4));
    }

    #[test]
    fn test_create_failure_is_returned() {
        assert_fault_discards_file(Fault::Create);
    }

    #[test]
    fn test_write_failure_removes_file() {
        assert_fault_discards_file(Fault::Append);
    }

    #[test]
    fn test_sync_failure_removes_file() {
        assert_fault_discards_file(Fault::Sync);
    }

    #[test]
    fn test_close_failure_removes_file() {
        assert_fault_discards_file(Fault::Close);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let dir = tempdir().unwrap();
        let options = options().block_restart_interval(0);
        let cache = cache(&dir, &options);
        let memtable = memtable_with(&["a"]);
        let mut meta = FileMetaData::new(11);

        let err = build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!FsEnv.file_exists(&table_file_name(dir.path(), 11)));
    }

    #[test]
    fn test_no_faults_keeps_file() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let env = FaultyEnv { fault: None };
        let memtable = memtable_with(&["a"]);
        let mut meta = FileMetaData::new(5);

        build_table(dir.path(), &env, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();
        assert!(env.file_exists(&table_file_name(dir.path(), 5)));
    }

    #[test]
    fn test_iterator_error_discards_verified_table() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let memtable = memtable_with(&["a", "b", "c", "d"]);
        let mut iter = FailingIter {
            inner: memtable.iter(),
            limit: 2,
            yielded: 0,
        };
        let mut meta = FileMetaData::new(6);

        let err = build_table(dir.path(), &FsEnv, &options, &cache, &mut iter, &mut meta)
            .unwrap_err();

        assert!(err.to_string().contains("injected read failure"));
        assert_eq!(meta.file_size, 0);
        assert!(!FsEnv.file_exists(&table_file_name(dir.path(), 6)));
        // The table was verified, and therefore cached, before being discarded.
        assert!(!cache.contains(6));
    }

    #[test]
    fn test_iterator_error_beats_write_error() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let env = FaultyEnv { fault: Some(Fault::Sync) };
        let memtable = memtable_with(&["a", "b", "c"]);
        let mut iter = FailingIter {
            inner: memtable.iter(),
            limit: 1,
            yielded: 0,
        };
        let mut meta = FileMetaData::new(8);

        let err = build_table(dir.path(), &env, &options, &cache, &mut iter, &mut meta)
            .unwrap_err();
        assert!(err.to_string().contains("injected read failure"));
    }

    #[test]
    fn test_verification_failure_removes_file() {
        let dir = tempdir().unwrap();
        let options = options();
        let verifier = RejectingVerifier::default();
        let memtable = memtable_with(&["a", "b"]);
        let mut meta = FileMetaData::new(9);

        let err = build_table(dir.path(), &FsEnv, &options, &verifier, &mut memtable.iter(), &mut meta)
            .unwrap_err();

        assert!(err.is_corruption());
        assert!(!FsEnv.file_exists(&table_file_name(dir.path(), 9)));
        assert_eq!(*verifier.evicted.lock().unwrap(), vec![9]);
    }

    #[test]
    fn test_largest_key_sorts_after_smallest() {
        let dir = tempdir().unwrap();
        let options = options();
        let cache = cache(&dir, &options);
        let memtable = Memtable::new();
        memtable.add(MAX_SEQUENCE_NUMBER, ValueType::Value, b"same", b"new");
        memtable.add(1, ValueType::Deletion, b"same", b"");
        let mut meta = FileMetaData::new(10);

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        assert_eq!(meta.smallest.parse().unwrap().sequence, MAX_SEQUENCE_NUMBER);
        assert_eq!(meta.largest.parse().unwrap().value_type, ValueType::Deletion);
        let comparator = options.comparator.clone();
        assert_eq!(
            comparator.compare(meta.smallest.encode(), meta.largest.encode()),
            std::cmp::Ordering::Less
        );
    }

    /// Orders user keys from largest to smallest.
    struct ReverseComparator;

    impl crate::comparator::Comparator for ReverseComparator {
        fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
            b.cmp(a)
        }

        fn name(&self) -> &'static str {
            "test.ReverseComparator"
        }
    }

    #[test]
    fn test_custom_user_comparator_round_trips() {
        let dir = tempdir().unwrap();
        let user_comparator = Arc::new(ReverseComparator);
        let options = Options::default()
            .comparator(user_comparator.clone())
            .internal_keys()
            .paranoid_checks(true);
        let cache = cache(&dir, &options);

        let memtable = Memtable::with_comparator(user_comparator);
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.put(b"c", b"3");
        batch.set_sequence(1);
        insert_into(&batch, &memtable).unwrap();
        let mut meta = FileMetaData::new(12);

        build_table(dir.path(), &FsEnv, &options, &cache, &mut memtable.iter(), &mut meta).unwrap();

        assert_eq!(meta.smallest.user_key(), b"c");
        assert_eq!(meta.largest.user_key(), b"a");
        let stored = collect_entries(&mut cache.new_iterator(12, meta.file_size).unwrap()).unwrap();
        assert_eq!(stored, collect_entries(&mut memtable.iter()).unwrap());
    }
}
