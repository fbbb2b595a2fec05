
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use sfs::BlockDevice;
use sfs::BLOCK_SIZE;

/// 以一个普通文件模拟的块设备，镜像长度恒为整数个块
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
    mounted: AtomicBool,
}

impl BlockFile {
    /// 新建（或截断）一个 `blocks` 块大小的镜像文件
    pub fn create(path: impl AsRef<Path>, blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SIZE) as u64)?;

        Ok(Self {
            file: Mutex::new(file),
            blocks,
            mounted: AtomicBool::new(false),
        })
    }

    /// 打开既有镜像，块数由文件长度推出
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let blocks = file.metadata()?.len() as usize / BLOCK_SIZE;

        Ok(Self {
            file: Mutex::new(file),
            blocks,
            mounted: AtomicBool::new(false),
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn mount(&self) {
        self.mounted.store(true, Ordering::Relaxed);
    }

    fn mounted(&self) -> bool {
        self.mounted.load(Ordering::Relaxed)
    }
}
