use thiserror::Error;

/// 文件系统统一结果类型
pub type Result<T> = core::result::Result<T, FsError>;

/// 文件系统错误类型
///
/// 磁盘写满不在此列：它只在写路径上可能发生，并以**短写**计数
/// 而非错误的形式上报。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no file system is mounted")]
    NotMounted,
    #[error("device is already mounted")]
    AlreadyMounted,
    #[error("superblock does not describe this device")]
    BadSuperblock,
    #[error("inode number {0} is out of range")]
    BadInumber(usize),
    #[error("inode {0} is not in use")]
    InvalidInode(usize),
    #[error("offset {0} is outside the file")]
    BadOffset(usize),
    #[error("no free inode slot")]
    NoFreeInodes,
    #[error("size and block pointers of inode {0} disagree")]
    Corrupted(usize),
}
