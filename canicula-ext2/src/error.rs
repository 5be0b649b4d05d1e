use alloc::string::String;
use alloc::vec::Vec;

use crate::fs_core::block_walker::BlockRef;

/// Unified error type for canicula-ext2.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ext2Error {
    /// Superblock magic is not 0xEF53
    #[error("not an ext2 filesystem (bad superblock magic)")]
    NotExt2,
    /// I/O error from the block device
    #[error("I/O error: {0}")]
    Io(String),
    /// Inode number outside `[1, s_inodes_count]`
    #[error("invalid inode number {0}")]
    InvalidInode(u32),
    /// Block group number outside `[0, group count)`
    #[error("invalid block group {0}")]
    InvalidGroup(u32),
    /// Block number outside the queried bounds
    #[error("block {block} is out of range")]
    OutOfRange { block: u64 },
    /// A block pointer addresses a block outside the filesystem.
    ///
    /// `holder` is the pointer block the bad entry was read from, or 0 when
    /// the pointer sits in the inode itself.
    #[error("corrupt block pointer {pointer} (held by block {holder})")]
    CorruptPointer { holder: u64, pointer: u64 },
    /// The filesystem handle was closed
    #[error("filesystem handle is closed")]
    Closed,
    /// A mutating access was requested
    #[error("filesystem is read-only")]
    ReadOnly,
    /// Corrupted filesystem metadata
    #[error("corrupted filesystem: {0}")]
    Corrupted(&'static str),
    /// Unsupported incompatible feature
    #[error("unsupported incompatible features {0:#x}")]
    IncompatibleFeature(u32),
}

/// Convenience Result type alias.
pub type Result<T> = ::core::result::Result<T, Ext2Error>;

/// A block walk that stopped on an error.
///
/// Blocks visited before the failure are kept, in walk order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("block walk stopped after {} blocks: {error}", .blocks.len())]
pub struct PartialWalk {
    pub blocks: Vec<BlockRef>,
    #[source]
    pub error: Ext2Error,
}
