pub mod batch;
pub mod builder;
pub mod cache;
pub mod comparator;
pub mod config;
pub mod encoding;
pub mod env;
pub mod error;
pub mod filename;
pub mod iterator;
pub mod key;
pub mod memtable;
pub mod sstable;
pub mod table_cache;

pub use batch::WriteBatch;
pub use builder::{build_table, FileMetaData};
pub use config::Options;
pub use error::{Error, Result};
pub use sstable::block::BlockBuilder;
