use alloc::vec;
use alloc::vec::Vec;

use log::debug;
use spin::Mutex;

use crate::bitmap::{count_zeros, find_first_set, find_first_zero, set_bit, test_bit};
use crate::error::{Ext2Error, Result};
use crate::fs_core::group_manager::GroupManager;
use crate::fs_core::superblock_manager::SuperBlockManager;
use crate::io::block_reader::BlockReader;
use crate::segment::{Segments, find_segments};
use crate::traits::block_device::BlockDevice;

/// Block usage bits for the blocks `[start, end]`.
///
/// Bit `n` describes block `start + n`; a set bit means the block is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitmapRange {
    start: u64,
    end: u64,
    bits: Vec<u8>,
}

impl BlockBitmapRange {
    /// First block covered.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last block covered (inclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Never true: a range covers at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `block` is marked in use.
    pub fn used(&self, block: u64) -> Result<bool> {
        if block < self.start || block > self.end {
            return Err(Ext2Error::OutOfRange { block });
        }
        Ok(test_bit(&self.bits, (block - self.start) as usize))
    }

    /// Number of free blocks in the range.
    pub fn free_count(&self) -> u64 {
        count_zeros(&self.bits, self.len() as usize) as u64
    }

    /// Free block numbers in ascending order.
    pub fn free_blocks(&self) -> BitIter<'_> {
        BitIter {
            range: self,
            next_bit: 0,
            used: false,
        }
    }

    /// Free block numbers from `block` onwards.
    pub fn free_blocks_from(&self, block: u64) -> BitIter<'_> {
        BitIter {
            range: self,
            next_bit: block.saturating_sub(self.start) as usize,
            used: false,
        }
    }

    /// Used block numbers in ascending order.
    pub fn used_blocks(&self) -> BitIter<'_> {
        BitIter {
            range: self,
            next_bit: 0,
            used: true,
        }
    }

    /// Maximal runs of free blocks.
    pub fn free_segments(&self) -> Segments<BitIter<'_>> {
        find_segments(self.free_blocks())
    }
}

/// Iterator over the blocks of a [`BlockBitmapRange`] in one usage state.
pub struct BitIter<'a> {
    range: &'a BlockBitmapRange,
    next_bit: usize,
    used: bool,
}

impl Iterator for BitIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let max_bit = self.range.len() as usize;
        let found = if self.used {
            find_first_set(&self.range.bits, self.next_bit, max_bit)
        } else {
            find_first_zero(&self.range.bits, self.next_bit, max_bit)
        }?;
        self.next_bit = found + 1;
        Some(self.range.start + found as u64)
    }
}

/// Lazily filled per-group block bitmaps.
///
/// A group's bitmap block is read on first use and kept until [`clear`](Self::clear).
/// The lookup-or-load sequence runs under one lock, so a shared cache can be
/// queried from several threads.
pub struct BlockBitmapCache {
    groups: Mutex<Vec<Option<Vec<u8>>>>,
}

impl BlockBitmapCache {
    pub fn new(group_count: u32) -> Self {
        Self {
            groups: Mutex::new(vec![None; group_count as usize]),
        }
    }

    /// Number of groups whose bitmap is loaded.
    pub fn loaded(&self) -> usize {
        self.groups.lock().iter().filter(|g| g.is_some()).count()
    }

    /// Drop every cached bitmap.
    pub fn clear(&self) {
        self.groups.lock().iter_mut().for_each(|g| *g = None);
    }

    /// Run `f` on the bitmap bytes of `group`, loading them if needed.
    ///
    /// The device read happens with the lock released, so other threads only
    /// spin for the lookup and the insert. When two threads miss on the same
    /// group both read it and the first insert wins.
    fn with_group<D: BlockDevice, R>(
        &self,
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        group_manager: &GroupManager,
        group: u32,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R> {
        {
            let groups = self.groups.lock();
            match groups.get(group as usize) {
                None => return Err(Ext2Error::InvalidGroup(group)),
                Some(Some(bits)) => return Ok(f(bits)),
                Some(None) => {}
            }
        }

        let bitmap_block = group_manager.block_bitmap_block(group)?;
        debug!("loading block bitmap of group {group} from block {bitmap_block}");

        let mut buf = vec![0u8; super_block_manager.block_size];
        reader.read_block(bitmap_block, &mut buf)?;
        let bits = super_block_manager.super_block.s_blocks_per_group as usize;
        buf.truncate(bits.div_ceil(8));

        let mut groups = self.groups.lock();
        let slot = groups
            .get_mut(group as usize)
            .ok_or(Ext2Error::InvalidGroup(group))?;
        Ok(f(slot.get_or_insert(buf)))
    }

    /// Make sure `group`'s bitmap is cached.
    pub fn load<D: BlockDevice>(
        &self,
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        group_manager: &GroupManager,
        group: u32,
    ) -> Result<()> {
        self.with_group(reader, super_block_manager, group_manager, group, |_| ())
    }

    /// Usage bits for `[start, end]`, concatenated across groups.
    ///
    /// Both bounds must lie in `[s_first_data_block, s_blocks_count - 1]`.
    pub fn range<D: BlockDevice>(
        &self,
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        group_manager: &GroupManager,
        start: u64,
        end: u64,
    ) -> Result<BlockBitmapRange> {
        let first = super_block_manager.super_block.s_first_data_block as u64;
        let last = super_block_manager.super_block.s_blocks_count as u64 - 1;
        for block in [start, end] {
            if block < first || block > last {
                return Err(Ext2Error::OutOfRange { block });
            }
        }
        if start > end {
            return Err(Ext2Error::OutOfRange { block: start });
        }

        let mut bits = vec![0u8; (end - start + 1).div_ceil(8) as usize];
        for group in super_block_manager.group_of_block(start)..=super_block_manager.group_of_block(end) {
            let group_first = super_block_manager.group_first_block(group);
            let from = start.max(group_first);
            let to = end.min(super_block_manager.group_last_block(group));

            self.with_group(reader, super_block_manager, group_manager, group, |group_bits| {
                copy_bits(
                    group_bits,
                    (from - group_first) as usize,
                    &mut bits,
                    (from - start) as usize,
                    (to - from + 1) as usize,
                );
            })?;
        }

        Ok(BlockBitmapRange { start, end, bits })
    }
}

/// Copy `count` bits; whole bytes are copied when both offsets are byte aligned.
fn copy_bits(src: &[u8], src_bit: usize, dst: &mut [u8], dst_bit: usize, count: usize) {
    let mut done = 0;
    if src_bit % 8 == 0 && dst_bit % 8 == 0 {
        let bytes = count / 8;
        dst[dst_bit / 8..dst_bit / 8 + bytes].copy_from_slice(&src[src_bit / 8..src_bit / 8 + bytes]);
        done = bytes * 8;
    }
    for n in done..count {
        if test_bit(src, src_bit + n) {
            set_bit(dst, dst_bit + n);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::{BlockBitmapCache, copy_bits};
    use crate::error::Ext2Error;
    use crate::fs_core::group_manager::GroupManager;
    use crate::fs_core::superblock_manager::SuperBlockManager;
    use crate::io::block_reader::BlockReader;
    use crate::segment::Segment;
    use crate::tests::ImageBuilder;

    #[test]
    fn test_copy_bits_unaligned() {
        let src = [0b1010_1100u8, 0b0000_0011];
        let mut dst = [0u8; 2];
        copy_bits(&src, 2, &mut dst, 1, 8);
        // src bits 2..10 = 1,1,0,1,0,1,1,1
        assert_eq!(dst, [0b1101_0110, 0b0000_0001]);
    }

    #[test]
    fn test_lazy_load_and_cross_group_range() {
        let mut image = ImageBuilder::small();
        // group 1 starts at block 1025 with its bitmaps and inode table (1025..=1030)
        image.mark_used(1022);
        let dev = image.device();
        let reader = BlockReader::new(&dev);
        let sbm = SuperBlockManager::load(&reader).unwrap();
        let gm = GroupManager::load(&reader, &sbm).unwrap();
        let cache = BlockBitmapCache::new(sbm.group_count);
        assert_eq!(cache.loaded(), 0);

        let range = cache.range(&reader, &sbm, &gm, 1018, 1034).unwrap();
        assert_eq!(cache.loaded(), 2);
        assert_eq!(range.len(), 17);
        assert!(range.used(1022).unwrap());
        assert!(!range.used(1024).unwrap());
        assert!(range.used(1025).unwrap());
        assert_eq!(range.used(1035), Err(Ext2Error::OutOfRange { block: 1035 }));

        let segs: Vec<Segment> = range.free_segments().collect();
        assert_eq!(
            segs,
            [
                Segment { start: 1018, size: 4 },
                Segment { start: 1023, size: 2 },
                Segment { start: 1031, size: 4 },
            ]
        );
        assert_eq!(
            range.used_blocks().collect::<Vec<_>>(),
            [1022, 1025, 1026, 1027, 1028, 1029, 1030]
        );
        assert_eq!(range.free_count(), 10);

        cache.clear();
        assert_eq!(cache.loaded(), 0);
    }

    #[test]
    fn test_range_bounds_are_checked() {
        let image = ImageBuilder::small();
        let dev = image.device();
        let reader = BlockReader::new(&dev);
        let sbm = SuperBlockManager::load(&reader).unwrap();
        let gm = GroupManager::load(&reader, &sbm).unwrap();
        let cache = BlockBitmapCache::new(sbm.group_count);

        let total = image.total_blocks() as u64;
        assert_eq!(
            cache.range(&reader, &sbm, &gm, 0, 10),
            Err(Ext2Error::OutOfRange { block: 0 })
        );
        assert_eq!(
            cache.range(&reader, &sbm, &gm, 10, total),
            Err(Ext2Error::OutOfRange { block: total })
        );
        assert!(cache.range(&reader, &sbm, &gm, 20, 10).is_err());
        assert!(cache.range(&reader, &sbm, &gm, 1, total - 1).is_ok());
    }
}
