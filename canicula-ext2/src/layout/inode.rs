use super::{read_u16_le, read_u32_le};
use crate::error::{Ext2Error, Result};

// Mode constants (i_mode & S_IFMT)
pub const S_IFMT: u16 = 0xF000;
pub const S_IFSOCK: u16 = 0xC000;
pub const S_IFLNK: u16 = 0xA000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFBLK: u16 = 0x6000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFCHR: u16 = 0x2000;
pub const S_IFIFO: u16 = 0x1000;

// Inode flags (i_flags)
pub const EXTENTS_FL: u32 = 0x0008_0000;

// i_block slots
pub const NDIR_BLOCKS: usize = 12;
pub const IND_BLOCK: usize = NDIR_BLOCKS;
pub const DIND_BLOCK: usize = IND_BLOCK + 1;
pub const TIND_BLOCK: usize = DIND_BLOCK + 1;
pub const N_BLOCKS: usize = TIND_BLOCK + 1;

// FileType enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    RegularFile,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

// Inode struct

/// Parsed ext2 inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub i_mode: u16,
    /// Combined: `(uid_hi << 16) | uid_lo`
    pub i_uid: u32,
    /// Combined: `(gid_hi << 16) | gid_lo`
    pub i_gid: u32,
    /// Combined with `i_size_high` for regular files.
    pub i_size: u64,
    pub i_atime: u32,
    pub i_ctime: u32,
    pub i_mtime: u32,
    pub i_dtime: u32,
    pub i_links_count: u16,
    /// In 512-byte units, including indirect blocks.
    pub i_blocks: u32,
    pub i_flags: u32,
    /// 12 direct, then indirect, double-indirect and triple-indirect pointers.
    pub i_block: [u32; N_BLOCKS],
    pub i_generation: u32,
    pub i_file_acl: u32,
}

impl Inode {
    /// Parse an inode from at least 128 raw bytes.
    ///
    /// For directories `i_size_high` is the legacy `i_dir_acl` and is ignored.
    pub fn parse(raw: &[u8]) -> Result<Inode> {
        if raw.len() < 128 {
            return Err(Ext2Error::Corrupted("inode buffer < 128 bytes"));
        }

        let i_mode = read_u16_le(raw, 0x00);

        let mut i_block = [0u32; N_BLOCKS];
        for (slot, ptr) in i_block.iter_mut().enumerate() {
            *ptr = read_u32_le(raw, 0x28 + slot * 4);
        }

        let i_size_lo = read_u32_le(raw, 0x04);
        let i_size_hi = if i_mode & S_IFMT == S_IFREG {
            read_u32_le(raw, 0x6C)
        } else {
            0
        };

        // osd2 (Linux): uid/gid high halves
        let i_uid = ((read_u16_le(raw, 0x78) as u32) << 16) | read_u16_le(raw, 0x02) as u32;
        let i_gid = ((read_u16_le(raw, 0x7A) as u32) << 16) | read_u16_le(raw, 0x18) as u32;

        Ok(Inode {
            i_mode,
            i_uid,
            i_gid,
            i_size: ((i_size_hi as u64) << 32) | i_size_lo as u64,
            i_atime: read_u32_le(raw, 0x08),
            i_ctime: read_u32_le(raw, 0x0C),
            i_mtime: read_u32_le(raw, 0x10),
            i_dtime: read_u32_le(raw, 0x14),
            i_links_count: read_u16_le(raw, 0x1A),
            i_blocks: read_u32_le(raw, 0x1C),
            i_flags: read_u32_le(raw, 0x20),
            i_block,
            i_generation: read_u32_le(raw, 0x64),
            i_file_acl: read_u32_le(raw, 0x68),
        })
    }

    // File type helpers

    /// Determine the file type from `i_mode & S_IFMT`.
    pub fn file_type(&self) -> FileType {
        match self.i_mode & S_IFMT {
            S_IFREG => FileType::RegularFile,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            S_IFCHR => FileType::CharDevice,
            S_IFBLK => FileType::BlockDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.i_mode & S_IFMT == S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.i_mode & S_IFMT == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.i_mode & S_IFMT == S_IFLNK
    }

    /// Free or deleted: no links, or a zeroed mode.
    pub fn is_unused(&self) -> bool {
        self.i_links_count == 0 || self.i_mode == 0
    }

    /// Whether the inode uses an extent tree (vs. indirect block map).
    pub fn uses_extents(&self) -> bool {
        self.i_flags & EXTENTS_FL != 0
    }

    /// Whether `i_block` holds block pointers at all.
    ///
    /// Device nodes keep a device number there, and fast symlinks
    /// (`i_blocks` covering at most the ACL block) keep the target inline.
    pub fn has_block_map(&self, block_size: usize) -> bool {
        match self.file_type() {
            FileType::CharDevice | FileType::BlockDevice | FileType::Fifo | FileType::Socket => {
                false
            }
            FileType::Symlink => {
                let acl_sectors = if self.i_file_acl != 0 {
                    (block_size / 512) as u32
                } else {
                    0
                };
                self.i_blocks > acl_sectors
            }
            _ => true,
        }
    }

    /// Direct block pointers.
    pub fn direct_blocks(&self) -> &[u32] {
        &self.i_block[..NDIR_BLOCKS]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_inode(mode: u16, links: u16) -> [u8; 128] {
        let mut raw = [0u8; 128];
        raw[0x00..0x02].copy_from_slice(&mode.to_le_bytes());
        raw[0x04..0x08].copy_from_slice(&4096u32.to_le_bytes());
        raw[0x1A..0x1C].copy_from_slice(&links.to_le_bytes());
        raw[0x1C..0x20].copy_from_slice(&8u32.to_le_bytes());
        raw[0x28..0x2C].copy_from_slice(&100u32.to_le_bytes());
        raw[0x60..0x64].copy_from_slice(&777u32.to_le_bytes()); // triple indirect
        raw[0x6C..0x70].copy_from_slice(&1u32.to_le_bytes());
        raw
    }

    #[test]
    fn test_parse_regular_file() {
        let inode = Inode::parse(&raw_inode(S_IFREG | 0o644, 1)).unwrap();
        assert!(inode.is_file());
        assert_eq!(inode.i_size, (1u64 << 32) | 4096);
        assert_eq!(inode.i_block[0], 100);
        assert_eq!(inode.i_block[TIND_BLOCK], 777);
        assert!(inode.i_block[1..TIND_BLOCK].iter().all(|&b| b == 0));
        assert!(!inode.is_unused());
    }

    #[test]
    fn test_directory_ignores_size_high() {
        let inode = Inode::parse(&raw_inode(S_IFDIR | 0o755, 2)).unwrap();
        assert_eq!(inode.i_size, 4096);
        assert_eq!(inode.file_type(), FileType::Directory);
    }

    #[test]
    fn test_unused_inode() {
        assert!(Inode::parse(&raw_inode(S_IFREG, 0)).unwrap().is_unused());
        assert!(Inode::parse(&raw_inode(0, 1)).unwrap().is_unused());
    }

    #[test]
    fn test_fast_symlink_has_no_block_map() {
        let mut raw = raw_inode(S_IFLNK | 0o777, 1);
        raw[0x1C..0x20].copy_from_slice(&0u32.to_le_bytes());
        assert!(!Inode::parse(&raw).unwrap().has_block_map(1024));

        let slow = Inode::parse(&raw_inode(S_IFLNK | 0o777, 1)).unwrap();
        assert!(slow.has_block_map(1024));

        let chr = Inode::parse(&raw_inode(S_IFCHR, 1)).unwrap();
        assert!(!chr.has_block_map(1024));
    }
}
