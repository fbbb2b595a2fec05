#![no_std]

extern crate alloc;

/* sfs 的整体架构，自上而下 */

// 文件系统层：单卷 inode 文件系统的全部操作
// （debug、format、mount、create、remove、stat、read、write）
mod fs;
pub use fs::SimpleFileSystem;

// 错误类型
mod error;
pub use error::{FsError, Result};

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;
pub use layout::{DiskInode, PointerBlock, SuperBlock};

// 磁盘块设备接口层：读写磁盘块设备的接口
mod block_dev;
pub use block_dev::BlockDevice;

/// 超级块魔数
pub const MAGIC: u32 = 0xF0F0_3410;
/// 块大小（字节）
pub const BLOCK_SIZE: usize = 4096;
/// 每个 inode 块容纳的 inode 数
pub const INODES_PER_BLOCK: usize = 128;
/// 每个 inode 的直接指针数
pub const POINTERS_PER_INODE: usize = 5;
/// 每个指针块容纳的块号数
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// 一个原始磁盘块
pub type Block = [u8; BLOCK_SIZE];

/// 设备共 `total_blocks` 块时，保留给 inode 区域的块数：
/// 总块数的百分之十，向上取整
#[inline]
pub fn inode_region_blocks(total_blocks: u32) -> u32 {
    total_blocks.div_ceil(10)
}
