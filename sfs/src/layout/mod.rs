//! # 磁盘数据结构层
//!
//! sfs 的磁盘布局：
//! 超级块 | 索引节点区域（总块数的 10%，向上取整） | 数据块区域
//!
//! 所有元数据字段都是小端 u32；本层只做原始块与类型化视图之间的
//! 纯编解码，不接触设备。

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::DiskInode;

mod pointer;
pub use pointer::PointerBlock;

use crate::Block;

// 按块内字下标读写一个小端 u32
fn read_word(block: &Block, index: usize) -> u32 {
    let base = index * 4;
    u32::from_le_bytes(block[base..base + 4].try_into().unwrap())
}

fn write_word(block: &mut Block, index: usize, value: u32) {
    let base = index * 4;
    block[base..base + 4].copy_from_slice(&value.to_le_bytes());
}
