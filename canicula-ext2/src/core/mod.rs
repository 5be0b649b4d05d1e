pub mod bitmap_cache;
pub mod block_walker;
pub mod group_manager;
pub mod inode_reader;
pub mod superblock_manager;
