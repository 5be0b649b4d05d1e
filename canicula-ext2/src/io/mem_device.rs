use alloc::vec::Vec;

use crate::error::{Ext2Error, Result};
use crate::traits::block_device::BlockDevice;

/// Default device block size for in-memory images.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// A filesystem image held entirely in memory.
///
/// Trailing bytes that do not fill a whole device block are not addressable.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    block_size: usize,
}

impl MemoryDevice {
    /// Wrap `data` with 1 KiB device blocks.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Wrap `data` with the given device block size (a power of two, >= 512).
    pub fn with_block_size(data: Vec<u8>, block_size: usize) -> Result<Self> {
        if block_size < 512 || !block_size.is_power_of_two() {
            return Err(Ext2Error::Io(alloc::format!(
                "invalid device block size {block_size}"
            )));
        }
        Ok(Self { data, block_size })
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give back the image bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for MemoryDevice {
    fn read_block(&self, block_no: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size {
            return Err(Ext2Error::Io(alloc::format!(
                "buffer of {} bytes for {}-byte device blocks",
                buf.len(),
                self.block_size
            )));
        }
        if block_no >= self.total_blocks() {
            return Err(Ext2Error::Io(alloc::format!(
                "device block {block_no} beyond end of image"
            )));
        }

        let start = block_no as usize * self.block_size;
        buf.copy_from_slice(&self.data[start..start + self.block_size]);
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    fn name(&self) -> Option<&str> {
        Some("memory")
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryDevice;
    use crate::traits::block_device::BlockDevice;

    #[test]
    fn test_partial_trailing_block_is_not_addressable() {
        let dev = MemoryDevice::new(alloc::vec![7u8; 2500]);
        assert_eq!(dev.total_blocks(), 2);

        let mut buf = [0u8; 1024];
        dev.read_block(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 7));
        assert!(dev.read_block(2, &mut buf).is_err());
    }

    #[test]
    fn test_rejects_odd_block_size() {
        assert!(MemoryDevice::with_block_size(alloc::vec![0; 4096], 1000).is_err());
        assert!(MemoryDevice::with_block_size(alloc::vec![0; 4096], 256).is_err());
    }
}
