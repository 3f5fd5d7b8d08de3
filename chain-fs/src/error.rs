//! # 错误
//!
//! 各项文件系统操作共用的错误类型。

use std::{fmt, io};

pub type Result<T> = std::result::Result<T, FsError>;

/// 文件系统操作的失败原因。
#[derive(Debug)]
pub enum FsError {
    /// 路径中某一分量不存在。
    NotFound,
    /// 目标名字已被占用。
    AlreadyExists,
    /// 路径的中间分量不是目录。
    NotADirectory,
    /// 对目录执行了仅限文件的操作。
    IsADirectory,
    /// 目录仍有条目，不能删除。
    DirectoryNotEmpty,
    /// 文件名超出九字节上限。
    NameTooLong,
    /// 镜像中已无空闲块。
    NoSpace,
    /// 打开文件表已满。
    TooManyOpenFiles,
    /// 游标移动到了负偏移。
    InvalidOffset,
    /// 文件描述符越界或未打开。
    InvalidDescriptor,
    /// 文件尚有打开的描述符。
    FileIsOpen,
    /// FAT 块链中断或越界。
    CorruptChain,
    /// 镜像的几何参数、魔数或校验和不合法。
    BadImage,
    /// 宿主机 I/O 失败。
    Io(io::Error),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such file or directory"),
            Self::AlreadyExists => write!(f, "name already exists"),
            Self::NotADirectory => write!(f, "not a directory"),
            Self::IsADirectory => write!(f, "is a directory"),
            Self::DirectoryNotEmpty => write!(f, "directory not empty"),
            Self::NameTooLong => write!(f, "file name too long"),
            Self::NoSpace => write!(f, "no free block left"),
            Self::TooManyOpenFiles => write!(f, "open file table is full"),
            Self::InvalidOffset => write!(f, "invalid offset"),
            Self::InvalidDescriptor => write!(f, "invalid file descriptor"),
            Self::FileIsOpen => write!(f, "file is busy"),
            Self::CorruptChain => write!(f, "corrupt block chain"),
            Self::BadImage => write!(f, "bad filesystem image"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
