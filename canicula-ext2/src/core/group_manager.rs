use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Ext2Error, Result};
use crate::fs_core::superblock_manager::SuperBlockManager;
use crate::io::block_reader::BlockReader;
use crate::layout::group_desc::{GROUP_DESC_SIZE, GroupDesc};
use crate::traits::block_device::BlockDevice;

/// Block group manager.
///
/// Loads and caches all block group descriptors from the descriptor table.
/// Provides convenience accessors to locate per-group metadata (bitmaps, inode table).
#[derive(Debug, Clone)]
pub struct GroupManager {
    descriptors: Vec<GroupDesc>,
}

impl GroupManager {
    /// Load all block group descriptors from the device.
    ///
    /// 1. Descriptor table starts in the block after the super block.
    /// 2. Total bytes = `group_count * 32`.
    /// 3. Read block-by-block, parse each descriptor and check that its
    ///    bitmap and inode table locations fall inside the filesystem.
    pub fn load<D: BlockDevice>(
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
    ) -> Result<Self> {
        let block_size = super_block_manager.block_size;
        let group_count = super_block_manager.group_count as usize;
        let desc_table_start = Self::desc_table_start(super_block_manager);

        let blocks_needed = (group_count * GROUP_DESC_SIZE).div_ceil(block_size);
        let inode_table_blocks = Self::inode_table_blocks(super_block_manager);

        let mut descriptors = Vec::with_capacity(group_count);
        let mut block_buf = vec![0u8; block_size];

        for block_idx in 0..blocks_needed as u64 {
            reader.read_block(desc_table_start + block_idx, &mut block_buf)?;

            for raw_desc in block_buf.chunks_exact(GROUP_DESC_SIZE) {
                if descriptors.len() == group_count {
                    break;
                }
                let desc = GroupDesc::parse(raw_desc)?;
                Self::check_locations(super_block_manager, &desc, inode_table_blocks)?;
                descriptors.push(desc);
            }
        }

        Ok(GroupManager { descriptors })
    }

    fn check_locations(
        super_block_manager: &SuperBlockManager,
        desc: &GroupDesc,
        inode_table_blocks: u64,
    ) -> Result<()> {
        let first = super_block_manager.super_block.s_first_data_block as u64;
        let end = super_block_manager.super_block.s_blocks_count as u64;
        let inside = |block: u64| block >= first && block < end;

        if !inside(desc.block_bitmap()) {
            return Err(Ext2Error::Corrupted("block bitmap outside filesystem"));
        }
        if !inside(desc.inode_bitmap()) {
            return Err(Ext2Error::Corrupted("inode bitmap outside filesystem"));
        }
        if !inside(desc.inode_table()) || desc.inode_table() + inode_table_blocks > end {
            return Err(Ext2Error::Corrupted("inode table outside filesystem"));
        }
        Ok(())
    }

    /// Get the descriptor for the given block group number.
    pub fn get_desc(&self, group_no: u32) -> Option<&GroupDesc> {
        self.descriptors.get(group_no as usize)
    }

    /// Physical block number of the inode table for the given group.
    pub fn inode_table_block(&self, group_no: u32) -> Result<u64> {
        self.get_desc(group_no)
            .map(GroupDesc::inode_table)
            .ok_or(Ext2Error::InvalidGroup(group_no))
    }

    /// Physical block number of the block bitmap for the given group.
    pub fn block_bitmap_block(&self, group_no: u32) -> Result<u64> {
        self.get_desc(group_no)
            .map(GroupDesc::block_bitmap)
            .ok_or(Ext2Error::InvalidGroup(group_no))
    }

    /// Number of loaded descriptors.
    pub fn count(&self) -> u32 {
        self.descriptors.len() as u32
    }

    /// All descriptors in group order.
    pub fn descriptors(&self) -> &[GroupDesc] {
        &self.descriptors
    }

    /// Descriptor table start block: the block after the super block.
    ///
    /// 1 KiB blocks → block 2; larger blocks → block 1.
    pub fn desc_table_start(super_block_manager: &SuperBlockManager) -> u64 {
        super_block_manager.super_block.s_first_data_block as u64 + 1
    }

    /// Blocks occupied by one group's inode table.
    pub fn inode_table_blocks(super_block_manager: &SuperBlockManager) -> u64 {
        let bytes = super_block_manager.super_block.s_inodes_per_group as u64
            * super_block_manager.inode_size as u64;
        bytes.div_ceil(super_block_manager.block_size as u64)
    }
}
