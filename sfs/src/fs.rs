//! # 文件系统层
//!
//! [`SimpleFileSystem`] 把一个块设备组织成单卷 inode 文件系统：
//! 0 号块是超级块，其后连续的一段是 inode 区域，剩余部分是数据区域。
//!
//! 空闲块位图从不落盘，每次挂载时从 inode 元数据重建；
//! inode 缓存只是磁盘的读侧镜像，所有变更都立即写盘。
//! 句柄内部不加锁，多方共享时由调用者自行串行化。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use log::{debug, trace};

use crate::error::{FsError, Result};
use crate::layout::{DiskInode, PointerBlock, SuperBlock};
use crate::Block;
use crate::BlockDevice;
use crate::BLOCK_SIZE;
use crate::INODES_PER_BLOCK;
use crate::MAGIC;
use crate::POINTERS_PER_INODE;

/// 文件系统句柄：绑定一个块设备，持有空闲块位图与 inode 缓存
pub struct SimpleFileSystem {
    device: Option<Arc<dyn BlockDevice>>,
    /// 每块一格，true 表示该块正被超级块、inode 区域或某个文件占用
    free_map: Vec<bool>,
    /// 与磁盘 inode 区域等长的镜像，挂载时重建
    inode_cache: Vec<DiskInode>,
    /// 挂载卷的 inode 区域块数
    inode_blocks: usize,
}

impl SimpleFileSystem {
    /// 尚未挂载任何设备的空句柄
    pub fn new() -> Self {
        Self {
            device: None,
            free_map: Vec::new(),
            inode_cache: Vec::new(),
            inode_blocks: 0,
        }
    }

    /// 把设备格式化成一个空卷：写出超级块，其余块全部清零。
    ///
    /// 已挂载的设备拒绝格式化。不建立任何内存状态，格式化不等于挂载。
    pub fn format(device: &dyn BlockDevice) -> Result<()> {
        if device.mounted() {
            return Err(FsError::AlreadyMounted);
        }

        let total_blocks = device.num_blocks();
        let mut block: Block = [0; BLOCK_SIZE];
        SuperBlock::new(total_blocks as u32).encode(&mut block);
        device.write_block(0, &block);

        let zeroes: Block = [0; BLOCK_SIZE];
        for bnum in 1..total_blocks {
            device.write_block(bnum, &zeroes);
        }
        Ok(())
    }

    /// 挂载设备并重建内存元数据。
    ///
    /// 超级块的每个字段都要与设备几何吻合，任何不符都在产生副作用之前
    /// 失败返回。重复挂载当前已绑定的设备是错误；换绑其它设备则直接
    /// 替换位图与缓存，旧卷不回写。
    pub fn mount(&mut self, device: Arc<dyn BlockDevice>) -> Result<()> {
        if let Some(bound) = &self.device {
            if Arc::ptr_eq(bound, &device) {
                return Err(FsError::AlreadyMounted);
            }
        }

        let total_blocks = device.num_blocks();
        let mut block: Block = [0; BLOCK_SIZE];
        device.read_block(0, &mut block);
        let sb = SuperBlock::decode(&block);
        if !sb.is_valid(total_blocks) {
            return Err(FsError::BadSuperblock);
        }
        debug!(
            "mounting volume: {} blocks, {} inode blocks, {} inodes",
            sb.blocks, sb.inode_blocks, sb.inodes
        );

        device.mount();
        self.inode_blocks = sb.inode_blocks as usize;
        self.free_map = vec![false; total_blocks];
        self.inode_cache = vec![DiskInode::default(); sb.inodes as usize];
        self.free_map[0] = true;

        // 逐块扫描 inode 区域，把每个在用 inode 可达的块登记进位图
        for ibnum in 1..=self.inode_blocks {
            self.free_map[ibnum] = true;
            device.read_block(ibnum, &mut block);
            for slot in 0..INODES_PER_BLOCK {
                let inode = DiskInode::decode(&block, slot);
                if !inode.is_valid() || inode.size == 0 {
                    continue;
                }
                let inumber = (ibnum - 1) * INODES_PER_BLOCK + slot;
                self.inode_cache[inumber] = inode;
                self.mark(&inode.direct, true);
                self.mark(&[inode.indirect], true);
                if inode.indirect != 0 && (inode.indirect as usize) < total_blocks {
                    let mut pblock: Block = [0; BLOCK_SIZE];
                    device.read_block(inode.indirect as usize, &mut pblock);
                    self.mark(&PointerBlock::decode(&pblock).0, true);
                }
            }
        }

        self.device = Some(device);
        Ok(())
    }

    /// 分配一个新文件，返回其 inode 号。
    ///
    /// 取缓存中第一个空闲槽位，置 valid 后立即落盘。
    pub fn create(&mut self) -> Result<usize> {
        let device = self.device()?.clone();
        let inumber = self
            .inode_cache
            .iter()
            .position(|inode| !inode.is_valid())
            .ok_or(FsError::NoFreeInodes)?;

        let inode = DiskInode {
            valid: 1,
            ..DiskInode::default()
        };
        self.inode_cache[inumber] = inode;
        save_inode(device.as_ref(), inumber, &inode);
        trace!("created inode {}", inumber);
        Ok(inumber)
    }

    /// 删除一个文件并归还它占用的所有块。
    ///
    /// 释放只清内存位图：数据块与指针块留在盘上原样不动，
    /// 等待后续分配覆盖。
    pub fn remove(&mut self, inumber: usize) -> Result<()> {
        let device = self.device()?.clone();
        self.check_inumber(inumber)?;

        // 以磁盘上的 inode 为准，缓存只当提示
        let inode = load_inode(device.as_ref(), inumber);
        if !inode.is_valid() {
            return Err(FsError::InvalidInode(inumber));
        }

        self.mark(&inode.direct, false);
        self.mark(&[inode.indirect], false);
        if inode.indirect != 0 && (inode.indirect as usize) < self.free_map.len() {
            let mut block: Block = [0; BLOCK_SIZE];
            device.read_block(inode.indirect as usize, &mut block);
            self.mark(&PointerBlock::decode(&block).0, false);
        }

        self.inode_cache[inumber] = DiskInode::default();
        save_inode(device.as_ref(), inumber, &self.inode_cache[inumber]);
        trace!("removed inode {}", inumber);
        Ok(())
    }

    /// 文件大小（字节）
    pub fn stat(&self, inumber: usize) -> Result<usize> {
        let device = self.device()?;
        self.check_inumber(inumber)?;
        let inode = load_inode(device.as_ref(), inumber);
        if !inode.is_valid() {
            return Err(FsError::InvalidInode(inumber));
        }
        Ok(inode.size as usize)
    }

    /// 从 `offset` 起读取文件内容到 `buf`，返回读到的字节数。
    ///
    /// 读取长度被文件末尾截断；`offset` 落在文件外是错误。
    /// 有效 `size` 之内却凑不满的读取说明 size 与指针图不一致，
    /// 按元数据损坏上报。
    pub fn read(&self, inumber: usize, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let device = self.device()?;
        self.check_inumber(inumber)?;

        let inode = load_inode(device.as_ref(), inumber);
        if !inode.is_valid() {
            return Err(FsError::InvalidInode(inumber));
        }
        let size = inode.size as usize;
        if offset >= size {
            return Err(FsError::BadOffset(offset));
        }

        let length = usize::min(buf.len(), size - offset);
        if length == 0 {
            return Ok(0);
        }
        let data = &mut buf[..length];

        // 第一阶段：直接指针
        let copied = read_span(device.as_ref(), &inode.direct, offset, data);
        if copied == length {
            return Ok(length);
        }

        // 第二阶段：进入间接区域之前重新从磁盘加载 inode
        let inode = load_inode(device.as_ref(), inumber);
        if inode.indirect == 0 {
            return Err(FsError::Corrupted(inumber));
        }
        let tail_offset = offset.saturating_sub(POINTERS_PER_INODE * BLOCK_SIZE);
        let mut block: Block = [0; BLOCK_SIZE];
        device.read_block(inode.indirect as usize, &mut block);
        let pointers = PointerBlock::decode(&block);

        let copied = copied + read_span(device.as_ref(), &pointers.0, tail_offset, &mut data[copied..]);
        if copied < length {
            return Err(FsError::Corrupted(inumber));
        }
        Ok(length)
    }

    /// 从 `offset` 起把 `buf` 写入文件，返回写入的字节数。
    ///
    /// 只允许覆盖已有字节或紧贴文件末尾追加（`offset <= size`）。
    /// 数据块按需惰性分配；磁盘写满时落盘已完成的部分并返回短计数，
    /// 此时 inode 的 size 同步反映短计数。
    pub fn write(&mut self, inumber: usize, offset: usize, buf: &[u8]) -> Result<usize> {
        let device = self.device()?.clone();
        self.check_inumber(inumber)?;

        // 空写直接返回，不碰 inode
        if buf.is_empty() {
            return Ok(0);
        }

        let mut inode = load_inode(device.as_ref(), inumber);
        if !inode.is_valid() {
            return Err(FsError::InvalidInode(inumber));
        }
        if offset > inode.size as usize {
            return Err(FsError::BadOffset(offset));
        }

        // 第一阶段：直接指针
        let length = buf.len();
        let mut written = self.write_span(device.as_ref(), &mut inode.direct, offset, buf);
        if written == length {
            inode.size = (offset + written) as u32;
            self.inode_cache[inumber] = inode;
            save_inode(device.as_ref(), inumber, &inode);
            return Ok(length);
        }

        // 第二阶段：间接区域，指针块本身也可能要现场分配
        let mut pointers = if inode.indirect == 0 {
            match self.allocate() {
                Some(bnum) => {
                    inode.indirect = bnum as u32;
                    PointerBlock::default()
                }
                None => {
                    inode.size = (offset + written) as u32;
                    self.inode_cache[inumber] = inode;
                    save_inode(device.as_ref(), inumber, &inode);
                    return Ok(written);
                }
            }
        } else {
            let mut block: Block = [0; BLOCK_SIZE];
            device.read_block(inode.indirect as usize, &mut block);
            PointerBlock::decode(&block)
        };

        let tail_offset = offset.saturating_sub(POINTERS_PER_INODE * BLOCK_SIZE);
        written += self.write_span(device.as_ref(), &mut pointers.0, tail_offset, &buf[written..]);

        // 先落指针块，inode 最后写
        let mut block: Block = [0; BLOCK_SIZE];
        pointers.encode(&mut block);
        device.write_block(inode.indirect as usize, &block);

        inode.size = (offset + written) as u32;
        self.inode_cache[inumber] = inode;
        save_inode(device.as_ref(), inumber, &inode);
        Ok(written)
    }

    /// 不挂载直接巡检设备，渲染超级块与所有在用 inode 的报告
    pub fn debug(device: &dyn BlockDevice) -> String {
        let mut out = String::new();
        let mut block: Block = [0; BLOCK_SIZE];
        device.read_block(0, &mut block);
        let sb = SuperBlock::decode(&block);

        if sb.magic == MAGIC {
            let _ = writeln!(out, "    magic number is valid");
        }
        let _ = writeln!(out, "superblock:");
        let _ = writeln!(out, "    {} blocks", sb.blocks);
        let _ = writeln!(out, "    {} inode blocks", sb.inode_blocks);
        let _ = writeln!(out, "    {} inodes", sb.inodes);

        // 超级块可能是坏的，遍历范围以设备实际大小为上限
        let total_blocks = device.num_blocks();
        let inode_blocks = usize::min(sb.inode_blocks as usize, total_blocks.saturating_sub(1));
        for ibnum in 1..=inode_blocks {
            device.read_block(ibnum, &mut block);
            for slot in 0..INODES_PER_BLOCK {
                let inode = DiskInode::decode(&block, slot);
                if !inode.is_valid() {
                    continue;
                }
                let inumber = (ibnum - 1) * INODES_PER_BLOCK + slot;
                let _ = writeln!(out, "inode {}:", inumber);
                let _ = writeln!(out, "    size: {} bytes", inode.size);
                let _ = write!(out, "    direct blocks:");
                for &bnum in inode.direct.iter().filter(|&&bnum| bnum != 0) {
                    let _ = write!(out, " {}", bnum);
                }
                let _ = writeln!(out);
                if inode.indirect != 0 {
                    let _ = writeln!(out, "    indirect block: {}", inode.indirect);
                    let _ = write!(out, "    indirect data blocks:");
                    if (inode.indirect as usize) < total_blocks {
                        let mut pblock: Block = [0; BLOCK_SIZE];
                        device.read_block(inode.indirect as usize, &mut pblock);
                        for &bnum in PointerBlock::decode(&pblock).0.iter().filter(|&&bnum| bnum != 0) {
                            let _ = write!(out, " {}", bnum);
                        }
                    }
                    let _ = writeln!(out);
                }
            }
        }
        out
    }
}

impl SimpleFileSystem {
    fn device(&self) -> Result<&Arc<dyn BlockDevice>> {
        self.device.as_ref().ok_or(FsError::NotMounted)
    }

    fn check_inumber(&self, inumber: usize) -> Result<()> {
        if inumber < self.inode_cache.len() {
            Ok(())
        } else {
            Err(FsError::BadInumber(inumber))
        }
    }

    /// 把一组块号在位图中登记（`used = true`）或归还；0 槽位跳过
    fn mark(&mut self, pointers: &[u32], used: bool) {
        for &bnum in pointers {
            let bnum = bnum as usize;
            if bnum != 0 && bnum < self.free_map.len() {
                self.free_map[bnum] = used;
            }
        }
    }

    /// 从数据区域起点线性扫描位图，取第一个空闲块
    fn allocate(&mut self) -> Option<usize> {
        let start = self.inode_blocks + 1;
        if let Some(bnum) = (start..self.free_map.len()).find(|&bnum| !self.free_map[bnum]) {
            self.free_map[bnum] = true;
            trace!("allocated block {}", bnum);
            return Some(bnum);
        }
        debug!("device is full");
        None
    }

    /// 对一段指针槽位执行写入遍历。
    ///
    /// `data` 是本阶段尚未写出的字节，`offset` 是相对本段第 0 个槽位的
    /// 字节偏移。空槽位现场分配并从全零内容写起；分配失败立即以短写
    /// 收场，已写出的块保持不动。
    fn write_span(
        &mut self,
        device: &dyn BlockDevice,
        slots: &mut [u32],
        offset: usize,
        data: &[u8],
    ) -> usize {
        let length = data.len();
        let mut written = 0;
        for d in 0..slots.len() {
            // 本槽位整个落在写入起点之前
            if offset >= (d + 1) * BLOCK_SIZE {
                continue;
            }

            let mut scratch: Block = [0; BLOCK_SIZE];
            let bnum = if slots[d] == 0 {
                let Some(bnum) = self.allocate() else {
                    return written;
                };
                slots[d] = bnum as u32;
                bnum
            } else {
                let bnum = slots[d] as usize;
                device.read_block(bnum, &mut scratch);
                bnum
            };

            if offset <= d * BLOCK_SIZE && length - written > BLOCK_SIZE {
                // 整块覆盖
                scratch.copy_from_slice(&data[written..written + BLOCK_SIZE]);
                device.write_block(bnum, &scratch);
                written += BLOCK_SIZE;
            } else if offset <= d * BLOCK_SIZE {
                // 末尾的部分块
                let take = length - written;
                scratch[..take].copy_from_slice(&data[written..]);
                device.write_block(bnum, &scratch);
                return length;
            } else {
                // 写入起点落在本槽位内部
                let head = offset % BLOCK_SIZE;
                if offset + length <= (d + 1) * BLOCK_SIZE {
                    scratch[head..head + length].copy_from_slice(data);
                    device.write_block(bnum, &scratch);
                    return length;
                }
                let take = BLOCK_SIZE - head;
                scratch[head..head + take].copy_from_slice(&data[written..written + take]);
                device.write_block(bnum, &scratch);
                written += take;
            }
        }
        written
    }
}

impl Default for SimpleFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// 对一段指针槽位执行读取遍历，返回拷出的字节数。
///
/// `offset` 是相对本段第 0 个槽位的字节偏移；0 槽位直接跳过。
/// 与块边界对齐的整块读取省去一次中转拷贝。
fn read_span(device: &dyn BlockDevice, slots: &[u32], offset: usize, data: &mut [u8]) -> usize {
    let length = data.len();
    let mut copied = 0;
    for (d, &bnum) in slots.iter().enumerate() {
        if bnum == 0 || offset >= (d + 1) * BLOCK_SIZE {
            continue;
        }
        let bnum = bnum as usize;

        if offset <= d * BLOCK_SIZE && length - copied > BLOCK_SIZE {
            // 整块直读进目标缓冲区
            device.read_block(bnum, &mut data[copied..copied + BLOCK_SIZE]);
            copied += BLOCK_SIZE;
        } else if offset <= d * BLOCK_SIZE {
            // 末尾的部分块
            let mut scratch: Block = [0; BLOCK_SIZE];
            device.read_block(bnum, &mut scratch);
            let take = length - copied;
            data[copied..].copy_from_slice(&scratch[..take]);
            return length;
        } else {
            // 读取起点落在本槽位内部
            let mut scratch: Block = [0; BLOCK_SIZE];
            device.read_block(bnum, &mut scratch);
            let head = offset % BLOCK_SIZE;
            if offset + length <= (d + 1) * BLOCK_SIZE {
                data[copied..].copy_from_slice(&scratch[head..head + length]);
                return length;
            }
            let take = BLOCK_SIZE - head;
            data[copied..copied + take].copy_from_slice(&scratch[head..head + take]);
            copied += take;
        }
    }
    copied
}

/// 从磁盘读出 `inumber` 号 inode
fn load_inode(device: &dyn BlockDevice, inumber: usize) -> DiskInode {
    let (bnum, slot) = DiskInode::locate(inumber);
    let mut block: Block = [0; BLOCK_SIZE];
    device.read_block(bnum, &mut block);
    DiskInode::decode(&block, slot)
}

/// 把 `inumber` 号 inode 写回磁盘（读改写所在的 inode 块）
fn save_inode(device: &dyn BlockDevice, inumber: usize, inode: &DiskInode) {
    let (bnum, slot) = DiskInode::locate(inumber);
    let mut block: Block = [0; BLOCK_SIZE];
    device.read_block(bnum, &mut block);
    inode.encode(&mut block, slot);
    device.write_block(bnum, &block);
}
