#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod error;
pub mod fs;
pub mod io;
pub mod layout;
pub mod segment;
pub mod traits;

// The directory is called `core/`, but that name shadows the `core` crate.
// We use `#[path]` so the directory stays `core/` while the Rust module is `fs_core`.
#[path = "core/mod.rs"]
pub mod fs_core;

#[cfg(test)]
mod tests;

// Re-exports
pub use error::{Ext2Error, PartialWalk, Result};
pub use fs::{Ext2FileSystem, FreeBlocks, UsageCount};
pub use fs_core::bitmap_cache::{BlockBitmapCache, BlockBitmapRange};
pub use fs_core::block_walker::{BlockIterFlags, BlockKind, BlockRef, BlockWalker, WalkSummary};
pub use fs_core::group_manager::GroupManager;
pub use fs_core::inode_reader::{InodeIter, InodeReader, InodeScan, ROOT_INO};
pub use fs_core::superblock_manager::SuperBlockManager;
#[cfg(all(feature = "std", unix))]
pub use io::file_device::FileDevice;
pub use io::block_reader::BlockReader;
pub use io::mem_device::MemoryDevice;
pub use layout::group_desc::GroupDesc;
pub use layout::inode::{FileType, Inode};
pub use layout::superblock::SuperBlock;
pub use segment::{Segment, find_segments};
pub use traits::block_device::BlockDevice;
