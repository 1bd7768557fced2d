//! Open tables, keyed by file number. At most `Options::max_open_tables` are
//! held; the least useful table is dropped to make room for a new one.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::Cache;
use crate::config::Options;
use crate::env::Env;
use crate::error::Result;
use crate::filename::table_file_name;
use crate::iterator::KvIterator;
use crate::sstable::table::{Table, TableIter};
use crate::Error;

/// Confirms that a freshly written table can be read back.
pub trait Verifier {
    fn verify_table(&self, file_number: u64, file_size: u64) -> Result<()>;

    /// Forgets anything held for `file_number`, e.g. after the file was
    /// deleted.
    fn evict(&self, file_number: u64);
}

pub struct TableCache {
    dbname: PathBuf,
    env: Arc<dyn Env>,
    options: Options,
    tables: Mutex<Cache<u64, Arc<Table>>>,
}

impl TableCache {
    pub fn new(dbname: impl Into<PathBuf>, env: Arc<dyn Env>, options: Options) -> Self {
        Self {
            dbname: dbname.into(),
            env,
            tables: Mutex::new(Cache::new(
                options.max_open_tables,
                Some(Box::new(|file_number: u64, _table: Arc<Table>| {
                    tracing::debug!(file_number, "Evicted table from cache");
                })),
            )),
            options,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Cache<u64, Arc<Table>>> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the open table for `file_number`, opening it on first use.
    pub fn find_table(&self, file_number: u64, file_size: u64) -> Result<Arc<Table>> {
        let mut tables = self.tables();
        if let Some(table) = tables.get(&file_number) {
            return Ok(table.clone());
        }

        let path = table_file_name(&self.dbname, file_number);
        let file = self.env.new_random_access_file(&path)?;
        let table = Arc::new(Table::open(&self.options, file, file_size)?);
        tables.insert(file_number, table.clone());
        Ok(table)
    }

    pub fn new_iterator(&self, file_number: u64, file_size: u64) -> Result<TableIter> {
        Ok(self.find_table(file_number, file_size)?.iter())
    }

    pub fn contains(&self, file_number: u64) -> bool {
        self.tables().contains_key(&file_number)
    }

    /// Hits and misses of `find_table`.
    pub fn stats(&self) -> (usize, usize) {
        self.tables().stats()
    }

    pub fn len(&self) -> usize {
        self.tables().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables().is_empty()
    }

    /// Reads every entry of `iter`, checking that keys strictly increase.
    fn scan(&self, iter: &mut TableIter) -> Result<u64> {
        let mut last_key: Option<Vec<u8>> = None;
        let mut entries = 0;
        iter.seek_to_first();
        while iter.valid() {
            if let Some(last) = &last_key {
                if self.options.comparator.compare(last, iter.key()) != Ordering::Less {
                    return Err(Error::Corruption("table keys out of order".to_string()));
                }
            }
            last_key = Some(iter.key().to_vec());
            entries += 1;
            iter.next();
        }
        iter.status()?;
        Ok(entries)
    }
}

impl Verifier for TableCache {
    fn verify_table(&self, file_number: u64, file_size: u64) -> Result<()> {
        let mut iter = self.new_iterator(file_number, file_size)?;
        if self.options.paranoid_checks {
            let entries = self.scan(&mut iter)?;
            tracing::debug!(file_number, entries, "Verified table contents");
        }
        iter.status()
    }

    fn evict(&self, file_number: u64) {
        self.tables().remove(&file_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::FsEnv;
    use crate::sstable::builder::TableBuilder;
    use tempfile::{tempdir, TempDir};

    fn write_table(dir: &TempDir, number: u64, options: &Options, n: usize) -> u64 {
        let path = table_file_name(dir.path(), number);
        let mut file = FsEnv.new_writable_file(&path).unwrap();
        let size = {
            let mut builder = TableBuilder::new(options, file.as_mut());
            for i in 0..n {
                builder
                    .add(format!("k{:04}", i).as_bytes(), b"value")
                    .unwrap();
            }
            builder.finish().unwrap();
            builder.file_size()
        };
        file.close().unwrap();
        size
    }

    #[test]
    fn test_tables_are_cached_by_number() {
        let dir = tempdir().unwrap();
        let options = Options::default();
        let size = write_table(&dir, 3, &options, 20);
        let cache = TableCache::new(dir.path(), Arc::new(FsEnv), options);

        assert!(cache.is_empty());
        let first = cache.find_table(3, size).unwrap();
        let second = cache.find_table(3, size).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.contains(3));

        cache.evict(3);
        assert!(!cache.contains(3));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_verify_missing_table_fails() {
        let dir = tempdir().unwrap();
        let cache = TableCache::new(dir.path(), Arc::new(FsEnv), Options::default());
        assert!(matches!(cache.verify_table(9, 100), Err(Error::IoError(_))));
        assert!(!cache.contains(9));
    }

    #[test]
    fn test_open_tables_are_bounded() {
        let dir = tempdir().unwrap();
        let options = Options::default().max_open_tables(3);
        let sizes: Vec<u64> = (1..=10)
            .map(|number| write_table(&dir, number, &options, 5))
            .collect();
        let cache = TableCache::new(dir.path(), Arc::new(FsEnv), options);

        for (number, &size) in (1..=10).zip(&sizes) {
            let table = cache.find_table(number, size).unwrap();
            assert_eq!(table.size(), size);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(1));
        assert!(cache.contains(10));

        // An evicted table is reopened on demand.
        let reopened = cache.new_iterator(1, sizes[0]).unwrap();
        drop(reopened);
        assert!(cache.contains(1));
        assert_eq!(cache.len(), 3);

        let (hits, misses) = cache.stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 11);
    }

    #[test]
    fn test_paranoid_verification_reads_every_block() {
        let dir = tempdir().unwrap();
        let options = Options::default().block_size(128).paranoid_checks(true);
        let size = write_table(&dir, 5, &options, 200);

        let path = table_file_name(dir.path(), 5);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[40] ^= 0x80;
        std::fs::write(&path, &bytes).unwrap();

        // Opening only touches the footer and index.
        let lenient = TableCache::new(dir.path(), Arc::new(FsEnv), Options::default());
        assert!(lenient.verify_table(5, size).is_ok());

        let paranoid = TableCache::new(dir.path(), Arc::new(FsEnv), options);
        assert!(matches!(
            paranoid.verify_table(5, size),
            Err(Error::ChecksumMismatch)
        ));
    }
}
