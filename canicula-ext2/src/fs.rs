use alloc::vec::Vec;
use core::ops::ControlFlow;

use log::debug;

use crate::error::{Ext2Error, PartialWalk, Result};
use crate::fs_core::bitmap_cache::{BlockBitmapCache, BlockBitmapRange};
use crate::fs_core::block_walker::{BlockIterFlags, BlockRef, BlockWalker, WalkSummary};
use crate::fs_core::group_manager::GroupManager;
use crate::fs_core::inode_reader::{InodeIter, InodeReader, InodeScan};
use crate::fs_core::superblock_manager::SuperBlockManager;
use crate::io::block_reader::BlockReader;
use crate::layout::group_desc::GroupDesc;
use crate::layout::inode::Inode;
use crate::layout::superblock::SuperBlock;
use crate::segment::Segment;
use crate::traits::block_device::BlockDevice;

/// Totals from a usage scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCount {
    pub inodes: u64,
    pub blocks: u64,
}

/// Read-only ext2 filesystem handle that wires all modules together.
///
/// Owns the device, the decoded super block and descriptor table, and the
/// block bitmap cache. After [`close`](Self::close) every fallible operation
/// fails with [`Ext2Error::Closed`]; only the plain super block field
/// accessors keep answering from the decoded copy.
pub struct Ext2FileSystem<D: BlockDevice> {
    device: Option<D>,
    sb_manager: SuperBlockManager,
    group_manager: GroupManager,
    bitmaps: BlockBitmapCache,
}

impl<D: BlockDevice> Ext2FileSystem<D> {
    /// Read the super block and the group descriptor table.
    ///
    /// Fails with [`Ext2Error::NotExt2`] on a bad magic, before any descriptor
    /// is read. The device is dropped on every error path.
    pub fn open(device: D) -> Result<Self> {
        let reader = BlockReader::new(&device);
        let sb_manager = SuperBlockManager::load(&reader)?;
        let group_manager = GroupManager::load(&reader, &sb_manager)?;
        let bitmaps = BlockBitmapCache::new(sb_manager.group_count);

        debug!(
            "opened {} with {} block groups",
            device.name().unwrap_or("device"),
            group_manager.count()
        );

        Ok(Self {
            device: Some(device),
            sb_manager,
            group_manager,
            bitmaps,
        })
    }

    /// Release the device and every cached bitmap.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            self.bitmaps.clear();
            debug!("filesystem closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.device.is_none()
    }

    fn reader(&self) -> Result<BlockReader<&D>> {
        self.device
            .as_ref()
            .map(BlockReader::new)
            .ok_or(Ext2Error::Closed)
    }

    /// Name reported by the device, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().and_then(|d| d.name())
    }

    // Super block fields

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb_manager.super_block
    }

    pub fn block_size(&self) -> usize {
        self.sb_manager.block_size
    }

    pub fn s_inodes_count(&self) -> u32 {
        self.sb_manager.super_block.s_inodes_count
    }

    pub fn s_blocks_count(&self) -> u32 {
        self.sb_manager.super_block.s_blocks_count
    }

    pub fn s_r_blocks_count(&self) -> u32 {
        self.sb_manager.super_block.s_r_blocks_count
    }

    pub fn s_free_blocks_count(&self) -> u32 {
        self.sb_manager.super_block.s_free_blocks_count
    }

    pub fn s_free_inodes_count(&self) -> u32 {
        self.sb_manager.super_block.s_free_inodes_count
    }

    pub fn s_first_data_block(&self) -> u32 {
        self.sb_manager.super_block.s_first_data_block
    }

    pub fn s_blocks_per_group(&self) -> u32 {
        self.sb_manager.super_block.s_blocks_per_group
    }

    // Group geometry

    pub fn group_desc_count(&self) -> u32 {
        self.group_manager.count()
    }

    pub fn group_desc(&self, group: u32) -> Result<&GroupDesc> {
        if self.is_closed() {
            return Err(Ext2Error::Closed);
        }
        self.group_manager
            .get_desc(group)
            .ok_or(Ext2Error::InvalidGroup(group))
    }

    /// First block of `group`.
    pub fn group_first_block(&self, group: u32) -> Result<u64> {
        self.check_group(group)?;
        Ok(self.sb_manager.group_first_block(group))
    }

    /// Last block of `group`; the final group may be shorter than the others.
    pub fn group_last_block(&self, group: u32) -> Result<u64> {
        self.check_group(group)?;
        Ok(self.sb_manager.group_last_block(group))
    }

    fn check_group(&self, group: u32) -> Result<()> {
        if self.is_closed() {
            return Err(Ext2Error::Closed);
        }
        if group >= self.group_desc_count() {
            return Err(Ext2Error::InvalidGroup(group));
        }
        Ok(())
    }

    // Inodes

    pub fn read_inode(&self, ino: u32) -> Result<Inode> {
        let reader = self.reader()?;
        InodeReader::read_inode(&reader, &self.sb_manager, &self.group_manager, ino)
    }

    /// Scan the in-use inodes, `(number, inode)` in ascending order.
    ///
    /// Every call starts a fresh scan.
    pub fn inodes(&self) -> Result<InodeIter<'_, &D>> {
        self.inodes_with(InodeScan::default())
    }

    pub fn inodes_with(&self, scan: InodeScan) -> Result<InodeIter<'_, &D>> {
        Ok(InodeIter::new(
            self.reader()?,
            &self.sb_manager,
            &self.group_manager,
            scan,
        ))
    }

    // Blocks

    /// Visit the blocks owned by `inode` in file-logical order.
    pub fn block_iterate<F>(
        &self,
        inode: &Inode,
        flags: BlockIterFlags,
        visit: F,
    ) -> Result<WalkSummary>
    where
        F: FnMut(BlockRef) -> ControlFlow<()>,
    {
        let reader = self.reader()?;
        BlockWalker::iterate(&reader, &self.sb_manager, inode, flags, visit)
    }

    /// Collect the blocks owned by `inode`, keeping partial results on error.
    pub fn collect_blocks(
        &self,
        inode: &Inode,
        flags: BlockIterFlags,
    ) -> ::core::result::Result<Vec<BlockRef>, PartialWalk> {
        let reader = self.reader().map_err(|error| PartialWalk {
            blocks: Vec::new(),
            error,
        })?;
        BlockWalker::collect(&reader, &self.sb_manager, inode, flags)
    }

    /// Count in-use inodes and the blocks they own.
    ///
    /// Stops on the first error.
    pub fn count_inodes_blocks(&self, flags: BlockIterFlags) -> Result<UsageCount> {
        let mut usage = UsageCount::default();
        for entry in self.inodes()? {
            let (_, inode) = entry?;
            usage.inodes += 1;
            self.block_iterate(&inode, flags, |_| {
                usage.blocks += 1;
                ControlFlow::Continue(())
            })?;
        }
        Ok(usage)
    }

    // Block bitmaps

    /// Usage bits of one group, loading its bitmap on first use.
    pub fn read_block_bitmap(&self, group: u32) -> Result<BlockBitmapRange> {
        let start = self.group_first_block(group)?;
        let end = self.group_last_block(group)?;
        self.get_block_bitmap_range(start, end)
    }

    /// Load every group's bitmap into the cache.
    pub fn read_block_bitmaps(&self) -> Result<()> {
        let reader = self.reader()?;
        for group in 0..self.group_desc_count() {
            self.bitmaps
                .load(&reader, &self.sb_manager, &self.group_manager, group)?;
        }
        Ok(())
    }

    /// Usage bits for `[start, end]`, which may span several groups.
    pub fn get_block_bitmap_range(&self, start: u64, end: u64) -> Result<BlockBitmapRange> {
        let reader = self.reader()?;
        self.bitmaps
            .range(&reader, &self.sb_manager, &self.group_manager, start, end)
    }

    /// Free blocks in ascending order, one group bitmap at a time.
    pub fn free_blocks(&self) -> FreeBlocks<'_, D> {
        FreeBlocks {
            fs: self,
            next_group: 0,
            current: None,
            next_block: 0,
            failed: false,
        }
    }

    /// Maximal runs of free blocks across the whole filesystem.
    ///
    /// On a consistent image the sizes add up to `s_free_blocks_count`.
    pub fn free_segments(&self) -> Result<Vec<Segment>> {
        let mut segments: Vec<Segment> = Vec::new();
        for group in 0..self.group_desc_count() {
            let range = self.read_block_bitmap(group)?;
            for seg in range.free_segments() {
                match segments.last_mut() {
                    // a free run may continue across a group boundary
                    Some(last) if last.start + last.size == seg.start => last.size += seg.size,
                    _ => segments.push(seg),
                }
            }
        }
        Ok(segments)
    }
}

/// Lazy scan over free block numbers; see [`Ext2FileSystem::free_blocks`].
pub struct FreeBlocks<'a, D: BlockDevice> {
    fs: &'a Ext2FileSystem<D>,
    next_group: u32,
    current: Option<BlockBitmapRange>,
    next_block: u64,
    failed: bool,
}

impl<D: BlockDevice> Iterator for FreeBlocks<'_, D> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Result<u64>> {
        while !self.failed {
            if let Some(range) = &self.current {
                if let Some(block) = range.free_blocks_from(self.next_block).next() {
                    self.next_block = block + 1;
                    return Some(Ok(block));
                }
                self.current = None;
            }

            if self.next_group >= self.fs.group_desc_count() {
                return None;
            }
            match self.fs.read_block_bitmap(self.next_group) {
                Ok(range) => {
                    self.next_block = range.start();
                    self.current = Some(range);
                    self.next_group += 1;
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
