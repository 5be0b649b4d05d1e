use super::{read_u16_le, read_u32_le};
use crate::error::{Ext2Error, Result};

/// On-disk size of an ext2 block group descriptor.
pub const GROUP_DESC_SIZE: usize = 32;

/// Parsed ext2 block group descriptor.
///
/// Bridges from the super block to per-group metadata (bitmaps, inode table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDesc {
    // location pointers
    pub bg_block_bitmap: u32,
    pub bg_inode_bitmap: u32,
    pub bg_inode_table: u32,

    // counters
    pub bg_free_blocks_count: u16,
    pub bg_free_inodes_count: u16,
    pub bg_used_dirs_count: u16,
}

impl GroupDesc {
    /// Parse a block group descriptor from at least 32 raw bytes.
    pub fn parse(raw: &[u8]) -> Result<GroupDesc> {
        if raw.len() < GROUP_DESC_SIZE {
            return Err(Ext2Error::Corrupted("block group desc too small"));
        }

        Ok(GroupDesc {
            bg_block_bitmap: read_u32_le(raw, 0x00),
            bg_inode_bitmap: read_u32_le(raw, 0x04),
            bg_inode_table: read_u32_le(raw, 0x08),
            bg_free_blocks_count: read_u16_le(raw, 0x0C),
            bg_free_inodes_count: read_u16_le(raw, 0x0E),
            bg_used_dirs_count: read_u16_le(raw, 0x10),
        })
    }

    /// Physical block number of the block bitmap.
    pub fn block_bitmap(&self) -> u64 {
        self.bg_block_bitmap as u64
    }

    /// Physical block number of the inode bitmap.
    pub fn inode_bitmap(&self) -> u64 {
        self.bg_inode_bitmap as u64
    }

    /// Physical block number of the first inode table block.
    pub fn inode_table(&self) -> u64 {
        self.bg_inode_table as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let mut raw = [0u8; GROUP_DESC_SIZE];
        raw[0x00..0x04].copy_from_slice(&3u32.to_le_bytes());
        raw[0x04..0x08].copy_from_slice(&4u32.to_le_bytes());
        raw[0x08..0x0C].copy_from_slice(&5u32.to_le_bytes());
        raw[0x0C..0x0E].copy_from_slice(&900u16.to_le_bytes());
        raw[0x0E..0x10].copy_from_slice(&20u16.to_le_bytes());
        raw[0x10..0x12].copy_from_slice(&2u16.to_le_bytes());

        let desc = GroupDesc::parse(&raw).unwrap();
        assert_eq!(desc.block_bitmap(), 3);
        assert_eq!(desc.inode_bitmap(), 4);
        assert_eq!(desc.inode_table(), 5);
        assert_eq!(desc.bg_free_blocks_count, 900);
        assert_eq!(desc.bg_free_inodes_count, 20);
        assert_eq!(desc.bg_used_dirs_count, 2);
    }

    #[test]
    fn test_short_descriptor_is_corrupted() {
        assert!(matches!(
            GroupDesc::parse(&[0u8; 16]),
            Err(Ext2Error::Corrupted(_))
        ));
    }
}
