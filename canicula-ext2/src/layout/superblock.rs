use super::{read_u16_le, read_u32_le};
use crate::error::{Ext2Error, Result};

// ─── Constants ──────────────────────────────────────────────────────────────

/// ext2 super block magic number (at offset 0x38).
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

/// Super block is always at byte offset 1024 from start of device.
pub const SUPER_BLOCK_OFFSET: usize = 1024;

/// Super block raw size is always 1024 bytes.
pub const SUPER_BLOCK_SIZE: usize = 1024;

/// Revision 0 filesystems have fixed 128-byte inodes and first inode 11.
pub const GOOD_OLD_REV: u32 = 0;
pub const GOOD_OLD_INODE_SIZE: u16 = 128;
pub const GOOD_OLD_FIRST_INO: u32 = 11;

// ─── Feature flags ──────────────────────────────────────────────────────────

pub const COMPAT_HAS_JOURNAL: u32 = 0x0004;

pub const INCOMPAT_FILETYPE: u32 = 0x0002;
pub const INCOMPAT_RECOVER: u32 = 0x0004;
pub const INCOMPAT_META_BG: u32 = 0x0010;
pub const INCOMPAT_EXTENTS: u32 = 0x0040;
pub const INCOMPAT_64BIT: u32 = 0x0080;

/// Incompat features the indirect-block reader understands.
///
/// `RECOVER` only means the journal was not replayed; the structures are
/// still readable.
const SUPPORTED_INCOMPAT: u32 = INCOMPAT_FILETYPE | INCOMPAT_RECOVER;

pub const RO_COMPAT_LARGE_FILE: u32 = 0x0002;

// SuperBlock struct

/// Parsed ext2 super block.
///
/// Parsed from the raw 1024-byte on-disk super block via [`SuperBlock::parse()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    // basic counts
    pub s_inodes_count: u32,
    pub s_blocks_count: u32,
    pub s_r_blocks_count: u32,
    pub s_free_blocks_count: u32,
    pub s_free_inodes_count: u32,

    // geometry
    pub s_first_data_block: u32,
    pub s_log_block_size: u32,
    pub s_blocks_per_group: u32,
    pub s_inodes_per_group: u32,

    // state
    pub s_magic: u16,
    pub s_state: u16,
    pub s_rev_level: u32,

    // revision 1 fields (defaulted for revision 0)
    pub s_first_ino: u32,
    pub s_inode_size: u16,
    pub s_feature_compat: u32,
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
    pub s_uuid: [u8; 16],
    pub s_volume_name: [u8; 16],
}

impl SuperBlock {
    /// Parse a super block from raw 1024-byte on-disk data.
    ///
    /// Only the magic is checked here; structural checks live in [`validate`](Self::validate).
    pub fn parse(raw: &[u8; SUPER_BLOCK_SIZE]) -> Result<SuperBlock> {
        let magic = read_u16_le(raw, 0x38);
        if magic != EXT2_SUPER_MAGIC {
            return Err(Ext2Error::NotExt2);
        }

        let rev_level = read_u32_le(raw, 0x4C);
        let dynamic = rev_level > GOOD_OLD_REV;

        let mut s_uuid = [0u8; 16];
        let mut s_volume_name = [0u8; 16];
        if dynamic {
            s_uuid.copy_from_slice(&raw[0x68..0x78]);
            s_volume_name.copy_from_slice(&raw[0x78..0x88]);
        }

        Ok(SuperBlock {
            s_inodes_count: read_u32_le(raw, 0x00),
            s_blocks_count: read_u32_le(raw, 0x04),
            s_r_blocks_count: read_u32_le(raw, 0x08),
            s_free_blocks_count: read_u32_le(raw, 0x0C),
            s_free_inodes_count: read_u32_le(raw, 0x10),
            s_first_data_block: read_u32_le(raw, 0x14),
            s_log_block_size: read_u32_le(raw, 0x18),
            s_blocks_per_group: read_u32_le(raw, 0x20),
            s_inodes_per_group: read_u32_le(raw, 0x28),
            s_magic: magic,
            s_state: read_u16_le(raw, 0x3A),
            s_rev_level: rev_level,
            s_first_ino: if dynamic { read_u32_le(raw, 0x54) } else { GOOD_OLD_FIRST_INO },
            s_inode_size: if dynamic { read_u16_le(raw, 0x58) } else { GOOD_OLD_INODE_SIZE },
            s_feature_compat: if dynamic { read_u32_le(raw, 0x5C) } else { 0 },
            s_feature_incompat: if dynamic { read_u32_le(raw, 0x60) } else { 0 },
            s_feature_ro_compat: if dynamic { read_u32_le(raw, 0x64) } else { 0 },
            s_uuid,
            s_volume_name,
        })
    }

    /// Validate basic super block sanity.
    pub fn validate(&self) -> Result<()> {
        if self.s_magic != EXT2_SUPER_MAGIC {
            return Err(Ext2Error::NotExt2);
        }

        // log_block_size: 0 → 1 KiB, 6 → 64 KiB
        if self.s_log_block_size > 6 {
            return Err(Ext2Error::Corrupted("invalid log_block_size (> 6)"));
        }

        if self.s_blocks_per_group == 0 {
            return Err(Ext2Error::Corrupted("blocks_per_group is zero"));
        }

        // one bitmap block per group
        if self.s_blocks_per_group as usize > self.block_size() * 8 {
            return Err(Ext2Error::Corrupted("blocks_per_group exceeds one bitmap block"));
        }

        if self.s_inodes_per_group == 0 {
            return Err(Ext2Error::Corrupted("inodes_per_group is zero"));
        }

        let expected_first = if self.block_size() == 1024 { 1 } else { 0 };
        if self.s_first_data_block != expected_first {
            return Err(Ext2Error::Corrupted("first_data_block does not match block size"));
        }

        if self.s_blocks_count <= self.s_first_data_block {
            return Err(Ext2Error::Corrupted("block count too small"));
        }

        if self.s_inode_size < GOOD_OLD_INODE_SIZE
            || !self.s_inode_size.is_power_of_two()
            || self.s_inode_size as usize > self.block_size()
        {
            return Err(Ext2Error::Corrupted("invalid inode_size"));
        }

        let inode_capacity = self.group_count() as u64 * self.s_inodes_per_group as u64;
        if (self.s_inodes_count as u64) > inode_capacity {
            return Err(Ext2Error::Corrupted("inodes_count exceeds group capacity"));
        }

        Ok(())
    }

    /// Check feature flags compatibility.
    ///
    /// Unknown incompat bits (extents, 64-bit, meta_bg, ...) change the
    /// on-disk layout and must reject the open.
    pub fn check_features(&self) -> Result<()> {
        let unknown_incompat = self.s_feature_incompat & !SUPPORTED_INCOMPAT;
        if unknown_incompat != 0 {
            return Err(Ext2Error::IncompatibleFeature(unknown_incompat));
        }
        Ok(())
    }

    // Convenience accessors

    /// Block size in bytes: `1024 << s_log_block_size`.
    pub fn block_size(&self) -> usize {
        1024usize << self.s_log_block_size
    }

    /// Number of block groups.
    ///
    /// `(blocks_count - first_data_block + blocks_per_group - 1) / blocks_per_group`
    pub fn group_count(&self) -> u32 {
        let bc = self.s_blocks_count as u64 - self.s_first_data_block as u64;
        bc.div_ceil(self.s_blocks_per_group as u64) as u32
    }

    /// Whether the journal still holds transactions to replay.
    pub fn needs_recovery(&self) -> bool {
        self.s_feature_incompat & INCOMPAT_RECOVER != 0
    }

    /// Whether the filesystem carries an ext3 journal.
    pub fn has_journal(&self) -> bool {
        self.s_feature_compat & COMPAT_HAS_JOURNAL != 0
    }

    /// Volume label up to the first NUL.
    pub fn volume_name(&self) -> &[u8] {
        let len = self
            .s_volume_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.s_volume_name.len());
        &self.s_volume_name[..len]
    }
}
