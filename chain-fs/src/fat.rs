//! # FAT 层
//!
//! 紧随超级块之后存放两份 FAT 副本。表项按块号索引，
//! 每项记录同一条链中的下一块：
//!
//! - [`Bid::FREE`]：本块空闲
//! - [`Bid::END`]：本块是链尾
//! - 其余值：后继块号
//!
//! 两份副本同步写入。装载时只校验主副本的校验和，
//! 不做副本间的裁决。

use std::mem;

use crate::{
    BLOCK_SIZE,
    bid::Bid,
    error::{FsError, Result},
    image::Image,
    layout::SuperBlock,
};

/// 每个 FAT 块的表项数。
const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / mem::size_of::<Bid>();

/// FAT 块的定型视图。
type FatBlock = [Bid; ENTRIES_PER_BLOCK];

/// FAT 的几何参数，从超级块提取。
#[derive(Debug, Clone, Copy)]
pub struct Fat {
    total_blocks: u32,
    fat_blocks: u32,
    data_start: Bid,
}

impl Fat {
    pub fn new(sb: &SuperBlock) -> Self {
        Self {
            total_blocks: sb.total_blocks,
            fat_blocks: sb.fat_blocks,
            data_start: sb.data_start,
        }
    }

    /// 表项在主副本中的位置：（块下标，块内项号）。
    fn locate(&self, bid: Bid) -> (usize, usize) {
        (
            1 + bid.index() / ENTRIES_PER_BLOCK,
            bid.index() % ENTRIES_PER_BLOCK,
        )
    }

    /// 读某块的 FAT 表项。
    pub fn entry(&self, img: &Image, bid: Bid) -> Bid {
        let (blk, nth) = self.locate(bid);
        img.map(blk, 0, |entries: &FatBlock| entries[nth])
    }

    /// 写某块的 FAT 表项，两份副本同步更新。
    pub fn set_entry(&self, img: &mut Image, bid: Bid, next: Bid) {
        let (blk, nth) = self.locate(bid);
        img.map_mut(blk, 0, |entries: &mut FatBlock| entries[nth] = next);
        img.map_mut(blk + self.fat_blocks as usize, 0, |entries: &mut FatBlock| {
            entries[nth] = next
        });
    }

    /// 块号是否落在数据区内，可以安全地当作链块访问。
    /// 镜像上读来的块号未经此检查不得用作下标。
    pub fn in_data_area(&self, bid: Bid) -> bool {
        bid.index() >= self.data_start.index() && (bid.raw() as u32) < self.total_blocks
    }

    /// 链中 `bid` 的后继。链尾返回 `None`；
    /// 后继落在保留区或越界即判链损坏。
    pub fn next(&self, img: &Image, bid: Bid) -> Result<Option<Bid>> {
        let next = self.entry(img, bid);
        if next == Bid::END {
            Ok(None)
        } else if !self.in_data_area(next) {
            Err(FsError::CorruptChain)
        } else {
            Ok(Some(next))
        }
    }

    /// 链的最后一块。
    pub fn last(&self, img: &Image, start: Bid) -> Result<Bid> {
        if !self.in_data_area(start) {
            return Err(FsError::CorruptChain);
        }
        let mut cur = start;
        for _ in 0..self.total_blocks {
            match self.next(img, cur)? {
                Some(next) => cur = next,
                None => return Ok(cur),
            }
        }
        // 步数超过总块数，链必然成环
        Err(FsError::CorruptChain)
    }

    /// 从 `start` 数起第 `n` 块（从零计）。链更短时返回 `None`。
    pub fn nth(&self, img: &Image, start: Bid, n: usize) -> Result<Option<Bid>> {
        if start == Bid::FREE {
            return Ok(None);
        }
        if !self.in_data_area(start) {
            return Err(FsError::CorruptChain);
        }
        let mut cur = start;
        let mut steps = 0usize;
        while steps < n {
            if steps >= self.total_blocks as usize {
                return Err(FsError::CorruptChain);
            }
            match self.next(img, cur)? {
                Some(next) => cur = next,
                None => return Ok(None),
            }
            steps += 1;
        }
        Ok(Some(cur))
    }

    /// 分配一个空闲块：表项标成链尾，块内容清零。
    /// 空闲计数随之更新。
    pub fn alloc(&self, img: &mut Image, sb: &mut SuperBlock) -> Result<Bid> {
        for raw in self.data_start.index()..self.total_blocks as usize {
            let bid = Bid::new(raw as u16);
            if self.entry(img, bid) == Bid::FREE {
                self.set_entry(img, bid, Bid::END);
                img.block_mut(bid.index()).fill_zero();
                sb.free_blocks -= 1;
                return Ok(bid);
            }
        }
        Err(FsError::NoSpace)
    }

    /// 把 `next` 接在 `prev` 之后。
    pub fn couple(&self, img: &mut Image, prev: Bid, next: Bid) {
        self.set_entry(img, prev, next);
    }

    /// 释放单块。
    pub fn free_one(&self, img: &mut Image, sb: &mut SuperBlock, bid: Bid) {
        self.set_entry(img, bid, Bid::FREE);
        sb.free_blocks += 1;
    }

    /// 释放整条链，返回释放的块数。
    pub fn free_chain(&self, img: &mut Image, sb: &mut SuperBlock, start: Bid) -> Result<u32> {
        if !self.in_data_area(start) {
            return Err(FsError::CorruptChain);
        }
        let mut cur = start;
        let mut freed = 0;
        loop {
            let next = self.next(img, cur)?;
            self.free_one(img, sb, cur);
            freed += 1;
            match next {
                Some(n) => cur = n,
                None => return Ok(freed),
            }
        }
    }

    /// 沿链迭代块号。起始为 [`Bid::FREE`] 时迭代立即结束；
    /// 每个块号先经数据区校验再产出。
    pub fn chain<'i>(&self, img: &'i Image, start: Bid) -> Chain<'i> {
        Chain {
            fat: *self,
            img,
            cur: (start != Bid::FREE).then_some(start),
            steps: 0,
            failed: false,
        }
    }

    /// 主副本的校验和：按字节滚动累加。
    pub fn checksum(&self, img: &Image) -> u32 {
        let mut sum: u32 = 0;
        for blk in 1..1 + self.fat_blocks as usize {
            for &b in img.block(blk).bytes() {
                sum = sum.rotate_right(1).wrapping_add(b as u32);
            }
        }
        sum
    }

    /// 两份副本是否逐字节一致。
    pub fn mirrors_match(&self, img: &Image) -> bool {
        let fat_blocks = self.fat_blocks as usize;
        (0..fat_blocks).all(|i| img.block(1 + i).bytes() == img.block(1 + i + fat_blocks).bytes())
    }

    /// 数据区中空闲表项的个数。
    pub fn count_free(&self, img: &Image) -> u32 {
        (self.data_start.index()..self.total_blocks as usize)
            .filter(|&raw| self.entry(img, Bid::new(raw as u16)) == Bid::FREE)
            .count() as u32
    }
}

/// 块链迭代器，一次产出一个块号。
pub struct Chain<'i> {
    fat: Fat,
    img: &'i Image,
    cur: Option<Bid>,
    steps: u32,
    failed: bool,
}

impl Iterator for Chain<'_> {
    type Item = Result<Bid>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let cur = self.cur?;
        if !self.fat.in_data_area(cur) || self.steps > self.fat.total_blocks {
            self.failed = true;
            return Some(Err(FsError::CorruptChain));
        }
        self.steps += 1;
        match self.fat.next(self.img, cur) {
            Ok(next) => {
                self.cur = next;
                Some(Ok(cur))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
