use alloc::vec;
use alloc::vec::Vec;
use core::ops::ControlFlow;

use log::{trace, warn};

use crate::error::{Ext2Error, PartialWalk, Result};
use crate::fs_core::superblock_manager::SuperBlockManager;
use crate::io::block_reader::BlockReader;
use crate::layout::inode::{DIND_BLOCK, IND_BLOCK, Inode, NDIR_BLOCKS, TIND_BLOCK};
use crate::traits::block_device::BlockDevice;

/// Options for [`BlockWalker::iterate`].
///
/// The default is the usual accounting policy: read-only, data blocks only,
/// holes skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIterFlags {
    /// Must stay `true`; the walker never modifies the image.
    pub read_only: bool,
    /// Report only blocks holding file data, not the pointer blocks.
    pub data_only: bool,
    /// Report zero pointers as holes (`block == 0`).
    pub include_holes: bool,
}

impl BlockIterFlags {
    pub const READ_ONLY_DATA_ONLY: Self = Self {
        read_only: true,
        data_only: true,
        include_holes: false,
    };

    /// Also report indirect, double-indirect and triple-indirect blocks.
    pub fn with_metadata(self) -> Self {
        Self {
            data_only: false,
            ..self
        }
    }

    /// Also report holes.
    pub fn with_holes(self) -> Self {
        Self {
            include_holes: true,
            ..self
        }
    }
}

impl Default for BlockIterFlags {
    fn default() -> Self {
        Self::READ_ONLY_DATA_ONLY
    }
}

/// Role of a visited block within the inode's block map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// File data at the given logical block index.
    Data(u64),
    Indirect,
    DoubleIndirect,
    TripleIndirect,
}

/// One visited block. `block == 0` marks a hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub block: u64,
    pub kind: BlockKind,
}

impl BlockRef {
    /// Logical index within the file, for data blocks.
    pub fn logical_index(&self) -> Option<u64> {
        match self.kind {
            BlockKind::Data(index) => Some(index),
            _ => None,
        }
    }

    pub fn is_metadata(&self) -> bool {
        !matches!(self.kind, BlockKind::Data(_))
    }

    pub fn is_hole(&self) -> bool {
        self.block == 0
    }
}

/// Result of a completed walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Number of visitor calls.
    pub visited: u64,
    /// The visitor returned `Break`.
    pub aborted: bool,
}

/// Block walker.
///
/// Enumerates the blocks owned by an inode through its 12 direct pointers and
/// the indirect, double-indirect and triple-indirect trees, in file-logical
/// order. Traversal depth is fixed by the format, so a corrupt image cannot
/// send it around a pointer cycle.
pub struct BlockWalker;

impl BlockWalker {
    /// Visit every block owned by `inode`.
    ///
    /// Pointer blocks are visited before their children when `data_only` is
    /// off. On error the walk stops; blocks already passed to `visit` stay
    /// visited.
    pub fn iterate<D, F>(
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        inode: &Inode,
        flags: BlockIterFlags,
        visit: F,
    ) -> Result<WalkSummary>
    where
        D: BlockDevice,
        F: FnMut(BlockRef) -> ControlFlow<()>,
    {
        if !flags.read_only {
            return Err(Ext2Error::ReadOnly);
        }
        if inode.uses_extents() {
            return Err(Ext2Error::Corrupted("inode uses extents"));
        }
        if !inode.has_block_map(super_block_manager.block_size) {
            return Ok(WalkSummary::default());
        }

        let mut walk = Walk {
            reader,
            super_block_manager,
            flags,
            visit,
            visited: 0,
            level_bufs: [Vec::new(), Vec::new(), Vec::new()],
        };
        let flow = walk.run(inode)?;
        Ok(WalkSummary {
            visited: walk.visited,
            aborted: flow.is_break(),
        })
    }

    /// Collect every block owned by `inode`.
    ///
    /// On failure the blocks gathered so far come back with the error.
    pub fn collect<D: BlockDevice>(
        reader: &BlockReader<D>,
        super_block_manager: &SuperBlockManager,
        inode: &Inode,
        flags: BlockIterFlags,
    ) -> ::core::result::Result<Vec<BlockRef>, PartialWalk> {
        let mut blocks = Vec::new();
        let walked = Self::iterate(reader, super_block_manager, inode, flags, |block| {
            blocks.push(block);
            ControlFlow::Continue(())
        });
        match walked {
            Ok(_) => Ok(blocks),
            Err(error) => Err(PartialWalk { blocks, error }),
        }
    }
}

struct Walk<'a, D: BlockDevice, F> {
    reader: &'a BlockReader<D>,
    super_block_manager: &'a SuperBlockManager,
    flags: BlockIterFlags,
    visit: F,
    visited: u64,
    /// One pointer-block buffer per indirection level.
    level_bufs: [Vec<u8>; 3],
}

impl<D, F> Walk<'_, D, F>
where
    D: BlockDevice,
    F: FnMut(BlockRef) -> ControlFlow<()>,
{
    fn run(&mut self, inode: &Inode) -> Result<ControlFlow<()>> {
        for (index, &ptr) in inode.direct_blocks().iter().enumerate() {
            if self.data(ptr as u64, 0, index as u64)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        let per_block = self.super_block_manager.addr_per_block;
        let mut base = NDIR_BLOCKS as u64;
        for (level, slot) in [(1u32, IND_BLOCK), (2, DIND_BLOCK), (3, TIND_BLOCK)] {
            if self.tree(inode.i_block[slot] as u64, level, 0, base)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
            base += per_block.pow(level);
        }
        Ok(ControlFlow::Continue(()))
    }

    fn emit(&mut self, block: BlockRef) -> ControlFlow<()> {
        self.visited += 1;
        (self.visit)(block)
    }

    /// Non-zero pointers must address a block inside the filesystem.
    fn check(&self, pointer: u64, holder: u64) -> Result<()> {
        let first = self.super_block_manager.super_block.s_first_data_block as u64;
        if pointer < first || pointer >= self.super_block_manager.block_limit {
            warn!("block {holder} holds out-of-range pointer {pointer}");
            return Err(Ext2Error::CorruptPointer { holder, pointer });
        }
        Ok(())
    }

    fn data(&mut self, ptr: u64, holder: u64, index: u64) -> Result<ControlFlow<()>> {
        if ptr == 0 {
            if self.flags.include_holes {
                return Ok(self.emit(BlockRef {
                    block: 0,
                    kind: BlockKind::Data(index),
                }));
            }
            return Ok(ControlFlow::Continue(()));
        }
        self.check(ptr, holder)?;
        Ok(self.emit(BlockRef {
            block: ptr,
            kind: BlockKind::Data(index),
        }))
    }

    /// Walk a pointer block `level` hops above the data (1 = indirect).
    ///
    /// `base` is the logical index of the first data block under `ptr`.
    fn tree(&mut self, ptr: u64, level: u32, holder: u64, base: u64) -> Result<ControlFlow<()>> {
        let kind = match level {
            1 => BlockKind::Indirect,
            2 => BlockKind::DoubleIndirect,
            _ => BlockKind::TripleIndirect,
        };

        if ptr == 0 {
            // A missing subtree is one hole; its range is never expanded.
            if self.flags.include_holes && !self.flags.data_only {
                return Ok(self.emit(BlockRef { block: 0, kind }));
            }
            return Ok(ControlFlow::Continue(()));
        }

        self.check(ptr, holder)?;
        if !self.flags.data_only && self.emit(BlockRef { block: ptr, kind }).is_break() {
            return Ok(ControlFlow::Break(()));
        }

        trace!("reading level-{level} pointer block {ptr}");
        let slot = level as usize - 1;
        let mut buf = core::mem::take(&mut self.level_bufs[slot]);
        if buf.is_empty() {
            buf = vec![0u8; self.super_block_manager.block_size];
        }
        self.reader.read_block(ptr, &mut buf)?;

        let span = self.super_block_manager.addr_per_block.pow(level - 1);
        let mut flow = ControlFlow::Continue(());
        for (j, raw) in buf.chunks_exact(4).enumerate() {
            let child = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64;
            let child_base = base + j as u64 * span;
            flow = if level == 1 {
                self.data(child, ptr, child_base)?
            } else {
                self.tree(child, level - 1, ptr, child_base)?
            };
            if flow.is_break() {
                break;
            }
        }

        self.level_bufs[slot] = buf;
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::ops::ControlFlow;

    use super::{BlockIterFlags, BlockKind, BlockRef, BlockWalker};
    use crate::error::Ext2Error;
    use crate::fs_core::superblock_manager::SuperBlockManager;
    use crate::io::block_reader::BlockReader;
    use crate::layout::inode::{DIND_BLOCK, IND_BLOCK, Inode, S_IFREG, TIND_BLOCK};
    use crate::tests::ImageBuilder;

    fn walk(
        image: &ImageBuilder,
        inode: &Inode,
        flags: BlockIterFlags,
    ) -> Result<Vec<BlockRef>, crate::error::PartialWalk> {
        let dev = image.device();
        let reader = BlockReader::new(&dev);
        let sbm = SuperBlockManager::load(&reader).unwrap();
        BlockWalker::collect(&reader, &sbm, inode, flags)
    }

    fn file_inode(i_block: [u32; 15]) -> Inode {
        let mut inode = ImageBuilder::regular_inode(0);
        inode.i_block = i_block;
        inode.i_blocks = 2;
        inode
    }

    fn data(block: u64, index: u64) -> BlockRef {
        BlockRef {
            block,
            kind: BlockKind::Data(index),
        }
    }

    #[test]
    fn test_direct_blocks_skip_holes() {
        let image = ImageBuilder::small();
        let mut i_block = [0u32; 15];
        i_block[0] = 100;
        i_block[2] = 102;

        let blocks = walk(&image, &file_inode(i_block), BlockIterFlags::default()).unwrap();
        assert_eq!(blocks, [data(100, 0), data(102, 2)]);

        let with_holes = walk(
            &image,
            &file_inode(i_block),
            BlockIterFlags::default().with_holes(),
        )
        .unwrap();
        assert_eq!(with_holes.len(), 12);
        assert_eq!(with_holes[1], data(0, 1));
    }

    #[test]
    fn test_indirect_tree_order_and_indices() {
        let mut image = ImageBuilder::small();
        let ind = image.alloc_block();
        image.write_pointers(ind, &[(0, 300), (3, 303)]);
        let dind = image.alloc_block();
        let dind_leaf = image.alloc_block();
        image.write_pointers(dind, &[(1, dind_leaf)]);
        image.write_pointers(dind_leaf, &[(2, 400)]);

        let mut i_block = [0u32; 15];
        i_block[11] = 111;
        i_block[IND_BLOCK] = ind;
        i_block[DIND_BLOCK] = dind;

        // 1 KiB blocks: 256 pointers per block
        let blocks = walk(&image, &file_inode(i_block), BlockIterFlags::default()).unwrap();
        assert_eq!(
            blocks,
            [
                data(111, 11),
                data(300, 12),
                data(303, 15),
                data(400, 12 + 256 + 256 + 2),
            ]
        );

        let with_meta = walk(
            &image,
            &file_inode(i_block),
            BlockIterFlags::default().with_metadata(),
        )
        .unwrap();
        let kinds: Vec<BlockKind> = with_meta.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            [
                BlockKind::Data(11),
                BlockKind::Indirect,
                BlockKind::Data(12),
                BlockKind::Data(15),
                BlockKind::DoubleIndirect,
                BlockKind::Indirect,
                BlockKind::Data(12 + 256 + 256 + 2),
            ]
        );
    }

    #[test]
    fn test_data_only_never_reports_pointer_blocks() {
        let mut image = ImageBuilder::small();
        let tind = image.alloc_block();
        let dind = image.alloc_block();
        let ind = image.alloc_block();
        image.write_pointers(tind, &[(0, dind)]);
        image.write_pointers(dind, &[(0, ind)]);
        image.write_pointers(ind, &[(0, 500), (1, 501)]);

        let mut i_block = [0u32; 15];
        i_block[TIND_BLOCK] = tind;

        let blocks = walk(&image, &file_inode(i_block), BlockIterFlags::default()).unwrap();
        let meta = [tind as u64, dind as u64, ind as u64];
        assert!(blocks.iter().all(|b| !meta.contains(&b.block)));
        assert_eq!(blocks[0].logical_index(), Some(12 + 256 + 256 * 256));
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_zero_pointers_are_never_dereferenced() {
        let mut image = ImageBuilder::small();
        let ind = image.alloc_block();
        image.write_pointers(ind, &[(5, 600)]);

        let mut i_block = [0u32; 15];
        i_block[IND_BLOCK] = ind;
        // DIND and TIND stay zero; block 0 holds the boot sector, not pointers.

        let blocks = walk(
            &image,
            &file_inode(i_block),
            BlockIterFlags::default().with_metadata(),
        )
        .unwrap();
        assert_eq!(
            blocks,
            [
                BlockRef {
                    block: ind as u64,
                    kind: BlockKind::Indirect
                },
                data(600, 17),
            ]
        );
    }

    #[test]
    fn test_zero_subtree_reported_once_as_hole() {
        let image = ImageBuilder::small();
        let blocks = walk(
            &image,
            &file_inode([0u32; 15]),
            BlockIterFlags::default().with_metadata().with_holes(),
        )
        .unwrap();
        assert_eq!(blocks.len(), 12 + 3);
        assert!(blocks.iter().all(BlockRef::is_hole));
        assert_eq!(blocks[12].kind, BlockKind::Indirect);
        assert_eq!(blocks[14].kind, BlockKind::TripleIndirect);
    }

    #[test]
    fn test_corrupt_entry_returns_partial_walk() {
        let mut image = ImageBuilder::small();
        let ind = image.alloc_block();
        let total = image.total_blocks();
        image.write_pointers(
            ind,
            &[(0, 700), (1, 701), (2, 702), (3, 703), (4, total + 10), (5, 705)],
        );

        let mut i_block = [0u32; 15];
        i_block[IND_BLOCK] = ind;

        let partial = walk(&image, &file_inode(i_block), BlockIterFlags::default()).unwrap_err();
        assert_eq!(
            partial.blocks,
            [data(700, 12), data(701, 13), data(702, 14), data(703, 15)]
        );
        assert_eq!(
            partial.error,
            Ext2Error::CorruptPointer {
                holder: ind as u64,
                pointer: (total + 10) as u64,
            }
        );
    }

    #[test]
    fn test_corrupt_indirect_pointer_in_inode() {
        let image = ImageBuilder::small();
        let mut i_block = [0u32; 15];
        i_block[0] = 100;
        i_block[IND_BLOCK] = u32::MAX;

        let partial = walk(&image, &file_inode(i_block), BlockIterFlags::default()).unwrap_err();
        assert_eq!(partial.blocks, [data(100, 0)]);
        assert!(matches!(
            partial.error,
            Ext2Error::CorruptPointer { holder: 0, .. }
        ));
    }

    #[test]
    fn test_visitor_can_abort() {
        let image = ImageBuilder::small();
        let dev = image.device();
        let reader = BlockReader::new(&dev);
        let sbm = SuperBlockManager::load(&reader).unwrap();

        let mut i_block = [0u32; 15];
        i_block[..4].copy_from_slice(&[100, 101, 102, 103]);
        let mut seen = Vec::new();
        let summary = BlockWalker::iterate(
            &reader,
            &sbm,
            &file_inode(i_block),
            BlockIterFlags::default(),
            |b| {
                seen.push(b.block);
                if seen.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .unwrap();
        assert!(summary.aborted);
        assert_eq!(summary.visited, 2);
        assert_eq!(seen, [100, 101]);
    }

    #[test]
    fn test_writable_walk_is_rejected() {
        let image = ImageBuilder::small();
        let flags = BlockIterFlags {
            read_only: false,
            ..BlockIterFlags::default()
        };
        let err = walk(&image, &file_inode([0; 15]), flags).unwrap_err();
        assert_eq!(err.error, Ext2Error::ReadOnly);
        assert!(err.blocks.is_empty());
    }

    #[test]
    fn test_device_inode_has_no_blocks() {
        let image = ImageBuilder::small();
        let mut inode = file_inode([0; 15]);
        inode.i_mode = 0x2000 | 0o600; // char device
        inode.i_block[0] = 0x0301;
        assert!(walk(&image, &inode, BlockIterFlags::default()).unwrap().is_empty());

        inode.i_mode = S_IFREG | 0o644;
        assert_eq!(walk(&image, &inode, BlockIterFlags::default()).unwrap().len(), 1);
    }
}
