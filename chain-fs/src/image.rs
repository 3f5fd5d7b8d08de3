//! # 镜像层
//!
//! 整个卷以 4096 字节块的平坦数组驻留内存，读写直接落在块数组上，
//! 持久化时整体写回宿主机文件。

use std::{
    fs,
    io::Write,
    mem,
    path::Path,
};

use crate::{
    BLOCK_SIZE, MAX_TOTAL_BLOCKS,
    error::{FsError, Result},
};

/// 一个 4096 字节的块。
///
/// 8 字节对齐，使块内按对齐偏移存放的磁盘结构可以原地定型访问。
#[repr(C, align(8))]
#[derive(Clone)]
pub struct Block([u8; BLOCK_SIZE]);

impl Block {
    pub const fn zeroed() -> Self {
        Self([0; BLOCK_SIZE])
    }

    /// 获取块内某偏移处的不可变定型视图。
    ///
    /// `T` 须为任意位模式均合法的 `repr(C)` 磁盘结构。
    pub fn get<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        assert!(mem::align_of::<T>() <= mem::align_of::<Self>());
        assert_eq!(offset % mem::align_of::<T>(), 0);
        assert!(offset + mem::size_of::<T>() <= BLOCK_SIZE);
        unsafe { &*self.0.as_ptr().add(offset).cast() }
    }

    /// 获取块内某偏移处的可变定型视图。
    pub fn get_mut<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        assert!(mem::align_of::<T>() <= mem::align_of::<Self>());
        assert_eq!(offset % mem::align_of::<T>(), 0);
        assert!(offset + mem::size_of::<T>() <= BLOCK_SIZE);
        unsafe { &mut *self.0.as_mut_ptr().add(offset).cast() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn fill_zero(&mut self) {
        self.0.fill(0);
    }
}

/// 驻留内存的整个卷。
pub struct Image {
    blocks: Vec<Block>,
}

impl Image {
    /// 全零镜像。
    pub fn blank(total_blocks: usize) -> Self {
        Self {
            blocks: vec![Block::zeroed(); total_blocks],
        }
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: usize) -> &Block {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: usize) -> &mut Block {
        &mut self.blocks[id]
    }

    /// 以定型视图读取某块内偏移处的数据。
    pub fn map<T, V>(&self, id: usize, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.blocks[id].get(offset))
    }

    /// 以定型视图修改某块内偏移处的数据。
    pub fn map_mut<T, V>(&mut self, id: usize, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.blocks[id].get_mut(offset))
    }

    /// 从宿主机文件读入整个镜像。
    ///
    /// 此处只校验文件长度，其余合法性由装载方检查。
    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        if raw.is_empty() || raw.len() % BLOCK_SIZE != 0 || raw.len() / BLOCK_SIZE > MAX_TOTAL_BLOCKS
        {
            return Err(FsError::BadImage);
        }

        let mut blocks = vec![Block::zeroed(); raw.len() / BLOCK_SIZE];
        for (block, chunk) in blocks.iter_mut().zip(raw.chunks_exact(BLOCK_SIZE)) {
            block.bytes_mut().copy_from_slice(chunk);
        }
        Ok(Self { blocks })
    }

    /// 把整个镜像写到宿主机文件，已存在则截断覆盖。
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file = fs::File::create(path)?;
        for block in &self.blocks {
            file.write_all(block.bytes())?;
        }
        Ok(())
    }
}
