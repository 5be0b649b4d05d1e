use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::string::{String, ToString};

use log::debug;

use crate::error::{Ext2Error, Result};
use crate::traits::block_device::BlockDevice;

/// Read-only block device backed by an image file or a device node.
///
/// Uses positioned reads (`pread`), so no seek position is shared between
/// callers.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    len: u64,
    block_size: usize,
    name: String,
}

impl FileDevice {
    /// Open `path` read-only with 1 KiB device blocks.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_block_size(path, crate::io::mem_device::DEFAULT_BLOCK_SIZE)
    }

    /// Open `path` read-only with the given device block size.
    pub fn open_with_block_size(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        if block_size < 512 || !block_size.is_power_of_two() {
            return Err(Ext2Error::Io(std::format!(
                "invalid device block size {block_size}"
            )));
        }

        let path = path.as_ref();
        let file = File::open(path).map_err(io_error)?;
        let len = device_len(&file)?;
        let name = path.display().to_string();
        debug!("opened {name}: {len} bytes, {block_size}-byte device blocks");

        Ok(Self {
            file,
            len,
            block_size,
            name,
        })
    }
}

impl BlockDevice for FileDevice {
    fn read_block(&self, block_no: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size {
            return Err(Ext2Error::Io(std::format!(
                "buffer of {} bytes for {}-byte device blocks",
                buf.len(),
                self.block_size
            )));
        }
        if block_no >= self.total_blocks() {
            return Err(Ext2Error::Io(std::format!(
                "device block {block_no} beyond end of {}",
                self.name
            )));
        }

        self.file
            .read_exact_at(buf, block_no * self.block_size as u64)
            .map_err(io_error)
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> u64 {
        self.len / self.block_size as u64
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

fn io_error(err: std::io::Error) -> Ext2Error {
    Ext2Error::Io(err.to_string())
}

/// Regular files report their length in metadata; block device nodes report
/// zero there, so seek to the end instead.
fn device_len(file: &File) -> Result<u64> {
    use std::io::{Seek, SeekFrom};

    let meta_len = file.metadata().map_err(io_error)?.len();
    if meta_len > 0 {
        return Ok(meta_len);
    }
    let mut handle = file;
    handle.seek(SeekFrom::End(0)).map_err(io_error)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::FileDevice;
    use crate::traits::block_device::BlockDevice;

    #[test]
    fn test_reads_blocks_from_image_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut image = std::vec![0u8; 4096];
        image[2048..3072].fill(0xAB);
        file.write_all(&image).unwrap();
        file.flush().unwrap();

        let dev = FileDevice::open(file.path()).unwrap();
        assert_eq!(dev.total_blocks(), 4);
        assert!(dev.name().is_some());

        let mut buf = [0u8; 1024];
        dev.read_block(2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
        assert!(dev.read_block(4, &mut buf).is_err());
    }
}
