use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Ext2Error, Result};
use crate::fs_core::group_manager::GroupManager;
use crate::fs_core::superblock_manager::SuperBlockManager;
use crate::io::block_reader::BlockReader;
use crate::layout::inode::Inode;
use crate::traits::block_device::BlockDevice;

/// Root directory inode number.
pub const ROOT_INO: u32 = 2;

/// Options for an inode scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InodeScan {
    /// Also yield free/deleted inodes (zero links or zero mode).
    pub include_unused: bool,
}

/// Inode reader: locates and reads inodes from disk.
///
/// Stateless: all context is passed as parameters.
pub struct InodeReader;

impl InodeReader {
    /// Read and parse the inode with the given inode number.
    ///
    /// 1. Validate `ino` > 0 and <= `s_inodes_count` (inode 0 does not exist).
    /// 2. `group = (ino - 1) / s_inodes_per_group`
    /// 3. `index = (ino - 1) % s_inodes_per_group`
    /// 4. `byte_offset = inode_table(group) * block_size + index * inode_size`
    /// 5. Read `inode_size` bytes → `Inode::parse()`
    pub fn read_inode<D: BlockDevice>(
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        group_manager: &GroupManager,
        ino: u32,
    ) -> Result<Inode> {
        let (block, offset) = Self::locate(super_block_manager, group_manager, ino)?;
        let inode_size = super_block_manager.inode_size;
        let byte_offset = block * super_block_manager.block_size as u64 + offset as u64;

        let mut inode_buf = vec![0u8; inode_size];
        reader.read_bytes(byte_offset, &mut inode_buf)?;
        Inode::parse(&inode_buf)
    }

    /// Inode table block holding `ino`, and the record's byte offset in it.
    fn locate(
        super_block_manager: &SuperBlockManager,
        group_manager: &GroupManager,
        ino: u32,
    ) -> Result<(u64, usize)> {
        let super_block = &super_block_manager.super_block;
        if ino == 0 || ino > super_block.s_inodes_count {
            return Err(Ext2Error::InvalidInode(ino));
        }

        let group = (ino - 1) / super_block.s_inodes_per_group;
        let index = ((ino - 1) % super_block.s_inodes_per_group) as u64;
        let table_block = group_manager.inode_table_block(group)?;

        let byte_in_table = index * super_block_manager.inode_size as u64;
        let block_size = super_block_manager.block_size as u64;
        Ok((
            table_block + byte_in_table / block_size,
            (byte_in_table % block_size) as usize,
        ))
    }
}

/// Lazy scan over inodes `1..=s_inodes_count`.
///
/// Each scan is an independent cursor. The current inode table block is kept
/// so a run of inodes costs one device read per table block. After an error
/// the scan yields it once and then ends.
pub struct InodeIter<'a, D: BlockDevice> {
    reader: BlockReader<D>,
    super_block_manager: &'a SuperBlockManager,
    group_manager: &'a GroupManager,
    scan: InodeScan,
    next_ino: u32,
    cached_block: Option<u64>,
    block_buf: Vec<u8>,
    failed: bool,
}

impl<'a, D: BlockDevice> InodeIter<'a, D> {
    pub fn new(
        reader: BlockReader<D>,
        super_block_manager: &'a SuperBlockManager,
        group_manager: &'a GroupManager,
        scan: InodeScan,
    ) -> Self {
        Self {
            reader,
            super_block_manager,
            group_manager,
            scan,
            next_ino: 1,
            cached_block: None,
            block_buf: vec![0u8; super_block_manager.block_size],
            failed: false,
        }
    }

    fn read_next(&mut self, ino: u32) -> Result<Inode> {
        let (block, offset) =
            InodeReader::locate(self.super_block_manager, self.group_manager, ino)?;
        if self.cached_block != Some(block) {
            self.cached_block = None;
            self.reader.read_block(block, &mut self.block_buf)?;
            self.cached_block = Some(block);
        }
        Inode::parse(&self.block_buf[offset..offset + self.super_block_manager.inode_size])
    }
}

impl<D: BlockDevice> Iterator for InodeIter<'_, D> {
    type Item = Result<(u32, Inode)>;

    fn next(&mut self) -> Option<Self::Item> {
        let last = self.super_block_manager.super_block.s_inodes_count;
        while !self.failed && self.next_ino <= last {
            let ino = self.next_ino;
            self.next_ino += 1;

            match self.read_next(ino) {
                Ok(inode) if inode.is_unused() && !self.scan.include_unused => continue,
                Ok(inode) => return Some(Ok((ino, inode))),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
