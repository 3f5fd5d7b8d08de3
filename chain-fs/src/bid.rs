//! # 块号
//!
//! 镜像中一个块的 16 位索引。`0` 与 `1` 不指向任何数据块，
//! 在 FAT 表项中复用为哨兵值。

use derive_more::{Display, From, Into};

/// 块号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct Bid(u16);

impl Bid {
    /// FAT 表项：空闲块。
    pub const FREE: Self = Self(0);
    /// FAT 表项：链尾。
    pub const END: Self = Self(1);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// 作为镜像块数组的下标。
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 是否为哨兵值，即不指向任何数据块。
    pub const fn is_sentinel(self) -> bool {
        self.0 < 2
    }
}
