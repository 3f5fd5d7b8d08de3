//! # 目录块
//!
//! 目录是一条块链，链上每块以 [`DirHeader`] 开头，
//! 其后是定长的 FCB 槽位数组。条目计数只在链首块维护。

use std::mem;

use crate::{BLOCK_SIZE, bid::Bid, layout::fcb::Fcb};

const MAGIC: u16 = 0xD151;

/// FCB 槽区在目录块内的起始偏移，对齐到 FCB 的对齐要求。
pub const FCB_AREA_OFFSET: usize =
    mem::size_of::<DirHeader>().next_multiple_of(mem::align_of::<Fcb>());

/// 每个目录块可容纳的 FCB 数。
pub const FCBS_PER_BLOCK: usize = (BLOCK_SIZE - FCB_AREA_OFFSET) / mem::size_of::<Fcb>();

/// 目录块头。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirHeader {
    magic: u16,
    bid: Bid,
    parent: Bid,
    item_num: u32,
}

impl DirHeader {
    /// 把一个已清零的块初始化为目录块。
    pub fn initialize(&mut self, bid: Bid, parent: Bid) {
        self.magic = MAGIC;
        self.bid = bid;
        self.parent = parent;
        self.item_num = 0;
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn bid(&self) -> Bid {
        self.bid
    }

    /// 父目录链首块；根目录没有父亲，存 [`Bid::FREE`]。
    pub fn parent(&self) -> Bid {
        self.parent
    }

    pub fn item_num(&self) -> u32 {
        self.item_num
    }

    pub fn add_items(&mut self, delta: i32) {
        self.item_num = self.item_num.wrapping_add_signed(delta);
    }
}

/// 第 `nth` 个 FCB 槽位在目录块内的偏移。
pub const fn slot_offset(nth: usize) -> usize {
    assert!(nth < FCBS_PER_BLOCK);
    FCB_AREA_OFFSET + nth * mem::size_of::<Fcb>()
}
