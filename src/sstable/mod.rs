//! Sorted tables: immutable files of sorted key/value pairs.
//!
//! ## File Format
//!
//! ```text
//! +-------------------+
//! | Data Block 1      |  ← ~4KB target, prefix-compressed entries
//! +-------------------+
//! | ...               |
//! +-------------------+
//! | Data Block N      |
//! +-------------------+
//! | Index Block       |  ← last key of each data block -> BlockHandle
//! +-------------------+
//! | Footer            |  ← index handle + magic, fixed size
//! +-------------------+
//! ```
//!
//! Every block is followed by a 5-byte trailer: a compression byte (always
//! zero) and a CRC32C over the block and that byte.
//!
//! # Component Details
//!
//! ## Data Blocks (`block.rs`)
//!
//! - **Prefix compression**: each key stores only its suffix past the prefix
//!   shared with the previous key
//! - **Restart points**: every `block_restart_interval` entries (16 by
//!   default) a full key is stored and its offset recorded in the trailer
//! - **Binary search**: seeks bisect the restart points, then scan forward
//!
//! ### Block Entry Format
//! ```text
//! +-----------------+-------------------+-------------------+-----+-------+
//! |shared: varint32 |unshared: varint32 |value_len: varint32| key | value |
//! +-----------------+-------------------+-------------------+-----+-------+
//! ```
//!
//! ## Framing (`format.rs`)
//!
//! Block handles, trailers, footer, checksummed block reads.
//!
//! ## Writing (`builder.rs`) and reading (`table.rs`)
//!
//! `TableBuilder` streams sorted entries into a `WritableFile`. `Table` opens
//! a finished file and iterates it through the index.

pub mod block;
pub mod builder;
pub mod format;
pub mod table;
