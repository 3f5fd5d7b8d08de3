/* 链式文件系统的整体架构，自上而下 */

// 会话层：装载镜像，维护当前目录与打开文件表
mod fs;

// 文件操作层：创建、打开、读写与删除文件
mod file;

// 目录操作层：目录块内 FCB 槽位的查找、分配与回收
mod dir;

// FAT 层：双副本块分配表，以单链表组织文件与目录的数据块
mod fat;

// 磁盘数据结构层：超级块、FCB 与目录块头
mod layout;

// 镜像层：4096 字节块的平坦数组，提供块内定型视图
mod image;

// 块号：指向镜像中一个块的 16 位索引
mod bid;

mod error;

pub use self::{
    bid::Bid,
    dir::{DirEntries, DirStat, EntryInfo, EntryKind},
    error::{FsError, Result},
    file::MAX_OPEN_FILES,
    fs::{ChainFileSystem, FsInfo, MIN_TOTAL_BLOCKS},
    layout::{DirHeader, FCBS_PER_BLOCK, Fcb, FcbAttr, NAME_LENGTH, SuperBlock},
};
pub use std::io::SeekFrom;

pub const BLOCK_SIZE: usize = 4096;

/// 镜像最多可容纳的块数，受 16 位块号限制。
pub const MAX_TOTAL_BLOCKS: usize = 1 << 16;
