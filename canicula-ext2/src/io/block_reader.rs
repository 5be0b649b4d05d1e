use alloc::vec;

use crate::error::{Ext2Error, Result};
use crate::traits::block_device::BlockDevice;

/// Block reader wrapping a [`BlockDevice`] with higher-level read operations.
///
/// Translates byte offsets and filesystem-sized blocks into individual
/// `BlockDevice::read_block` calls, so the filesystem block size does not have
/// to match the device block size.
pub struct BlockReader<D: BlockDevice> {
    device: D,
}

impl<D: BlockDevice> BlockReader<D> {
    /// Create a new reader wrapping the given block device.
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Read one filesystem block into `buf`.
    ///
    /// The filesystem block size is `buf.len()`, so block `block_no` starts
    /// at byte `block_no * buf.len()`.
    pub fn read_block(&self, block_no: u64, buf: &mut [u8]) -> Result<()> {
        let bs = buf.len() as u64;
        let byte_offset = block_no
            .checked_mul(bs)
            .ok_or(Ext2Error::OutOfRange { block: block_no })?;

        if buf.len() == self.device.block_size() {
            return self.device.read_block(block_no, buf);
        }
        self.read_bytes(byte_offset, buf)
    }

    /// Read `buf.len()` bytes starting at the given **byte** offset.
    ///
    /// Handles cross-block boundaries transparently.
    /// Used for reading the super block (at byte offset 1024), inode records, etc.
    pub fn read_bytes(&self, byte_offset: u64, buf: &mut [u8]) -> Result<()> {
        let bs = self.device.block_size();
        if bs == 0 {
            return Err(Ext2Error::Io("device reports zero block size".into()));
        }

        let end = byte_offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Ext2Error::Io("read range overflows u64".into()))?;
        if end > self.capacity_bytes() {
            return Err(Ext2Error::Io(alloc::format!(
                "read past end of device: offset={byte_offset} len={} capacity={}",
                buf.len(),
                self.capacity_bytes()
            )));
        }

        let mut current_block = byte_offset / bs as u64;
        let mut offset_in_block = (byte_offset % bs as u64) as usize;
        let mut written = 0usize;
        let mut block_buf = vec![0u8; bs];

        while written < buf.len() {
            self.device.read_block(current_block, &mut block_buf)?;

            let to_copy = (bs - offset_in_block).min(buf.len() - written);
            buf[written..written + to_copy]
                .copy_from_slice(&block_buf[offset_in_block..offset_in_block + to_copy]);

            written += to_copy;
            current_block += 1;
            offset_in_block = 0; // subsequent blocks start at byte 0
        }

        Ok(())
    }

    /// Device size in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.device
            .total_blocks()
            .saturating_mul(self.device.block_size() as u64)
    }

    /// Borrow the underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::BlockReader;
    use crate::error::Ext2Error;
    use crate::io::mem_device::MemoryDevice;

    fn patterned(len: usize) -> alloc::vec::Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_read_bytes_crosses_device_blocks() {
        let image = patterned(4096);
        let dev = MemoryDevice::with_block_size(image.clone(), 512).unwrap();
        let reader = BlockReader::new(&dev);

        let mut buf = [0u8; 700];
        reader.read_bytes(300, &mut buf).unwrap();
        assert_eq!(&buf[..], &image[300..1000]);
    }

    #[test]
    fn test_read_block_uses_buffer_length_as_block_size() {
        let image = patterned(8192);
        let dev = MemoryDevice::with_block_size(image.clone(), 512).unwrap();
        let reader = BlockReader::new(&dev);

        let mut buf = [0u8; 2048];
        reader.read_block(2, &mut buf).unwrap();
        assert_eq!(&buf[..], &image[4096..6144]);
    }

    #[test]
    fn test_read_past_end_is_io_error() {
        let dev = MemoryDevice::new(alloc::vec![0u8; 2048]);
        let reader = BlockReader::new(&dev);

        let mut buf = [0u8; 1024];
        assert!(matches!(reader.read_block(2, &mut buf), Err(Ext2Error::Io(_))));
    }
}
