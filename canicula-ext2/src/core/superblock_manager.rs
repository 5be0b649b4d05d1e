use log::{debug, warn};

use crate::error::Result;
use crate::io::block_reader::BlockReader;
use crate::layout::superblock::{SUPER_BLOCK_OFFSET, SUPER_BLOCK_SIZE, SuperBlock};
use crate::traits::block_device::BlockDevice;

/// Super block manager.
///
/// Loads the super block from disk, validates it, and caches the commonly
/// used derived parameters so that every caller does not need to re-derive them.
///
/// This is the very first step of `open()`.
#[derive(Debug, Clone)]
pub struct SuperBlockManager {
    /// The parsed super block.
    pub super_block: SuperBlock,
    /// Filesystem block size in bytes (`1024 << s_log_block_size`).
    pub block_size: usize,
    /// Number of block groups.
    pub group_count: u32,
    /// On-disk inode record size.
    pub inode_size: usize,
    /// Block pointers per indirect block (`block_size / 4`).
    pub addr_per_block: u64,
    /// One past the highest block a pointer may address.
    ///
    /// The smaller of `s_blocks_count` and the device capacity.
    pub block_limit: u64,
}

impl SuperBlockManager {
    /// Load the super block from the device via the given block reader.
    ///
    /// 1. Read 1024 raw bytes from byte offset 1024.
    /// 2. `SuperBlock::parse()` (magic check).
    /// 3. `validate()` + `check_features()`.
    /// 4. Cache derived parameters.
    pub fn load<D: BlockDevice>(reader: &BlockReader<D>) -> Result<Self> {
        let mut raw = [0u8; SUPER_BLOCK_SIZE];
        reader.read_bytes(SUPER_BLOCK_OFFSET as u64, &mut raw)?;

        let super_block = SuperBlock::parse(&raw)?;
        super_block.validate()?;
        super_block.check_features()?;

        if super_block.needs_recovery() {
            warn!("journal needs recovery; reading structures as they are on disk");
        } else if super_block.has_journal() {
            debug!("ext3 journal present, ignored");
        }

        let block_size = super_block.block_size();
        let group_count = super_block.group_count();

        let device_blocks = reader.capacity_bytes() / block_size as u64;
        let fs_blocks = super_block.s_blocks_count as u64;
        if device_blocks < fs_blocks {
            warn!(
                "device holds {device_blocks} blocks but the filesystem claims {fs_blocks}"
            );
        }

        debug!(
            "ext2: {} blocks of {} bytes, {} groups, {} inodes ({} bytes each)",
            fs_blocks, block_size, group_count, super_block.s_inodes_count, super_block.s_inode_size
        );

        Ok(SuperBlockManager {
            block_size,
            group_count,
            inode_size: super_block.s_inode_size as usize,
            addr_per_block: (block_size / 4) as u64,
            block_limit: fs_blocks.min(device_blocks),
            super_block,
        })
    }

    /// First block of group `group` (unchecked).
    pub fn group_first_block(&self, group: u32) -> u64 {
        self.super_block.s_first_data_block as u64
            + group as u64 * self.super_block.s_blocks_per_group as u64
    }

    /// Last block of group `group` (unchecked); the final group may be short.
    pub fn group_last_block(&self, group: u32) -> u64 {
        let last = self.group_first_block(group) + self.super_block.s_blocks_per_group as u64 - 1;
        last.min(self.super_block.s_blocks_count as u64 - 1)
    }

    /// Group holding `block` (unchecked).
    pub fn group_of_block(&self, block: u64) -> u32 {
        ((block - self.super_block.s_first_data_block as u64)
            / self.super_block.s_blocks_per_group as u64) as u32
    }
}
