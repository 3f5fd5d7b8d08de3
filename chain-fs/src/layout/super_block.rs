//! # 超级块
//!
//! 位于 0 号块起始处，记录镜像的几何参数与主 FAT 的校验和。

use crate::{
    BLOCK_SIZE, MAX_TOTAL_BLOCKS,
    bid::Bid,
    layout::FCBS_PER_BLOCK,
};

const MAGIC: u16 = 0x1510;

/// 超级块。装载时整份复制进会话，保存时写回 0 号块。
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    magic: u16,
    /// 镜像总字节数。
    pub total_size: u32,
    /// 镜像总块数。
    pub total_blocks: u32,
    /// 空闲块数。
    pub free_blocks: u32,
    /// 单份 FAT 占用的块数。
    pub fat_blocks: u32,
    /// 每个目录块可容纳的 FCB 数。
    pub fcbs_per_block: u32,
    /// 数据区起始块号，即根目录块。
    pub data_start: Bid,
    /// 主 FAT 的校验和。
    pub fat_crc: u32,
}

impl SuperBlock {
    /// 按镜像总块数推算几何参数并写入各字段。
    pub fn initialize(&mut self, total_blocks: u32) {
        let fat_blocks = (total_blocks * 2).div_ceil(BLOCK_SIZE as u32);
        let data_start = 1 + 2 * fat_blocks;
        *self = Self {
            magic: MAGIC,
            total_size: total_blocks * BLOCK_SIZE as u32,
            total_blocks,
            // 保留区之外，根目录还占一块
            free_blocks: total_blocks - data_start - 1,
            fat_blocks,
            fcbs_per_block: FCBS_PER_BLOCK as u32,
            data_start: Bid::new(data_start as u16),
            fat_crc: 0,
        };
    }

    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 几何参数是否自洽，且与镜像实际块数吻合。
    pub fn geometry_matches(&self, image_blocks: usize) -> bool {
        // 先约束总块数，后续运算才不会溢出
        if self.total_blocks as usize != image_blocks || self.total_blocks as usize > MAX_TOTAL_BLOCKS
        {
            return false;
        }
        let fat_blocks = (self.total_blocks * 2).div_ceil(BLOCK_SIZE as u32);
        self.fat_blocks == fat_blocks
            && self.data_start.raw() as u32 == 1 + 2 * fat_blocks
            && (self.data_start.raw() as u32) < self.total_blocks
            && self.fcbs_per_block as usize == FCBS_PER_BLOCK
            && self.total_size == self.total_blocks * BLOCK_SIZE as u32
            && self.free_blocks <= self.total_blocks - self.data_start.raw() as u32 - 1
    }

    /// 根目录固定占据数据区第一块。
    pub fn root(&self) -> Bid {
        self.data_start
    }
}
