use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
use crate::error::Result;
use crate::Error;

/// Options controlling how tables are built and read back.
#[derive(Clone)]
pub struct Options {
    /// Order of the keys stored in tables (default: bytewise)
    pub comparator: Arc<dyn Comparator>,

    /// Uncompressed size at which a data block is closed (default: 4KB)
    pub block_size: usize,

    /// Entries between restart points inside a block (default: 16)
    pub block_restart_interval: usize,

    /// Verify block checksums on every read (default: true)
    pub verify_checksums: bool,

    /// Scan every entry of a freshly built table before accepting it
    /// (default: false)
    pub paranoid_checks: bool,

    /// Tables the table cache keeps open at once (default: 1000)
    pub max_open_tables: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator),
            block_size: 4 * 1024, // 4KB
            block_restart_interval: 16,
            verify_checksums: true,
            paranoid_checks: false,
            max_open_tables: 1000,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("verify_checksums", &self.verify_checksums)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("max_open_tables", &self.max_open_tables)
            .finish()
    }
}

impl Options {
    /// Set the key comparator
    pub fn comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Order table keys as internal keys, using the current comparator for
    /// the user key portion.
    pub fn internal_keys(mut self) -> Self {
        self.comparator = Arc::new(InternalKeyComparator::new(self.comparator));
        self
    }

    /// Set target data block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set restart interval for data blocks
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    /// Enable or disable checksum verification on reads
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Enable or disable the full scan of newly built tables
    pub fn paranoid_checks(mut self, enabled: bool) -> Self {
        self.paranoid_checks = enabled;
        self
    }

    /// Set how many tables the table cache keeps open
    pub fn max_open_tables(mut self, count: usize) -> Self {
        self.max_open_tables = count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_restart_interval == 0 {
            return Err(Error::InvalidArgument(
                "block_restart_interval must be at least 1".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidArgument(
                "block_size must be positive".to_string(),
            ));
        }
        if self.max_open_tables == 0 {
            return Err(Error::InvalidArgument(
                "max_open_tables must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
