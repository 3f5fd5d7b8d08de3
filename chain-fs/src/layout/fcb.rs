//! # 文件控制块
//!
//! 目录块内的定长条目，一个 FCB 描述一个文件或子目录。
//! 整个结构 32 字节、8 字节对齐，一个目录块恰好容纳 127 个。

use std::{
    str,
    time::{SystemTime, UNIX_EPOCH},
};

use enumflags2::{BitFlags, bitflags};

use crate::bid::Bid;

/// 文件名上限（字节）。超长的名字直接拒绝，不做截断。
pub const NAME_LENGTH: usize = 9;

/// FCB 属性位。
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcbAttr {
    /// 槽位在用。
    Exist = 1,
    /// 指向子目录。
    Directory = 1 << 1,
}

/// 文件控制块。
///
/// 文件的 `start` 在写入第一个字节前为 [`Bid::FREE`]；
/// 目录的 `start` 指向目录链首块，`size` 恒为零。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Fcb {
    name: [u8; NAME_LENGTH],
    attrs: u8,
    start: Bid,
    size: u32,
    created: i64,
    modified: i64,
}

impl Fcb {
    /// 新空文件，尚未分配任何数据块。
    pub fn new_file(name: &str, now: i64) -> Self {
        Self::new(name, FcbAttr::Exist.into(), Bid::FREE, now)
    }

    /// 新子目录，`start` 为已初始化的目录块。
    pub fn new_dir(name: &str, start: Bid, now: i64) -> Self {
        Self::new(name, FcbAttr::Exist | FcbAttr::Directory, start, now)
    }

    fn new(name: &str, attrs: BitFlags<FcbAttr>, start: Bid, now: i64) -> Self {
        let mut fcb = Self {
            name: [0; NAME_LENGTH],
            attrs: attrs.bits(),
            start,
            size: 0,
            created: now,
            modified: now,
        };
        fcb.name[..name.len()].copy_from_slice(name.as_bytes());
        fcb
    }

    pub fn attr(&self) -> BitFlags<FcbAttr> {
        BitFlags::from_bits_truncate(self.attrs)
    }

    /// 槽位是否在用。
    pub fn exists(&self) -> bool {
        self.attr().contains(FcbAttr::Exist)
    }

    pub fn is_dir(&self) -> bool {
        self.attr().contains(FcbAttr::Directory)
    }

    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LENGTH);
        str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// 名字是否与 `name` 逐字节相同。
    pub fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        bytes.len() <= NAME_LENGTH
            && self.name[..bytes.len()] == *bytes
            && self.name[bytes.len()..].iter().all(|&b| b == 0)
    }

    pub fn rename(&mut self, name: &str) {
        self.name = [0; NAME_LENGTH];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    pub fn start(&self) -> Bid {
        self.start
    }

    pub fn set_start(&mut self, start: Bid) {
        self.start = start;
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn touch(&mut self, now: i64) {
        self.modified = now;
    }

    /// 释放槽位。清零后 `Exist` 位落下。
    pub fn clear(&mut self) {
        *self = Self {
            name: [0; NAME_LENGTH],
            attrs: 0,
            start: Bid::FREE,
            size: 0,
            created: 0,
            modified: 0,
        };
    }
}

/// 当前 Unix 时间戳（秒）。
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
