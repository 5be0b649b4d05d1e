use crate::error::Ext2Error;

/// Block device abstraction, the I/O foundation for the entire filesystem.
///
/// Implementations may back onto a raw disk, a memory image, or an image file.
/// The device block size is independent of the filesystem block size; the
/// [`BlockReader`](crate::io::block_reader::BlockReader) translates between them.
pub trait BlockDevice {
    /// Read a single device block into `buf`.
    ///
    /// `buf.len()` must equal `self.block_size()`.
    fn read_block(&self, block_no: u64, buf: &mut [u8]) -> ::core::result::Result<(), Ext2Error>;

    /// Block size in bytes (typically 512 / 1024 / 4096).
    fn block_size(&self) -> usize;

    /// Total number of blocks on the device.
    fn total_blocks(&self) -> u64;

    /// Human-readable device name, when the device has one.
    fn name(&self) -> Option<&str> {
        None
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read_block(&self, block_no: u64, buf: &mut [u8]) -> ::core::result::Result<(), Ext2Error> {
        (**self).read_block(block_no, buf)
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn total_blocks(&self) -> u64 {
        (**self).total_blocks()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for alloc::boxed::Box<T> {
    fn read_block(&self, block_no: u64, buf: &mut [u8]) -> ::core::result::Result<(), Ext2Error> {
        (**self).read_block(block_no, buf)
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn total_blocks(&self) -> u64 {
        (**self).total_blocks()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}
