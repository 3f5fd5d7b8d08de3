//! # 会话层
//!
//! [`ChainFileSystem`] 是装载一个镜像后的完整会话：持有镜像、
//! 超级块副本、FAT 几何、当前目录与打开文件表。所有修改只落在
//! 内存镜像上，显式 [`save`](ChainFileSystem::save) 时整体写回宿主机文件。

use std::path::Path;

use crate::{
    BLOCK_SIZE, MAX_TOTAL_BLOCKS,
    bid::Bid,
    dir::Slot,
    error::{FsError, Result},
    fat::Fat,
    file::{MAX_OPEN_FILES, OpenFile},
    image::Image,
    layout::{DirHeader, FCBS_PER_BLOCK, SuperBlock},
};

/// 可格式化的最小块数，保证放得下超级块、两份 FAT 与根目录。
pub const MIN_TOTAL_BLOCKS: usize = 8;

/// 单用户、单进程的链式文件系统会话。
pub struct ChainFileSystem {
    pub(crate) image: Image,
    pub(crate) sb: SuperBlock,
    pub(crate) fat: Fat,
    pub(crate) cur_dir: Bid,
    pub(crate) files: [Option<OpenFile>; MAX_OPEN_FILES],
}

/// 镜像概览，供上层展示。
#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    pub total_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub fat_blocks: u32,
    pub fcbs_per_block: u32,
    pub data_start: Bid,
}

impl ChainFileSystem {
    /// 在内存中格式化一卷全新镜像。
    pub fn format(total_blocks: usize) -> Result<Self> {
        if !(MIN_TOTAL_BLOCKS..=MAX_TOTAL_BLOCKS).contains(&total_blocks) {
            return Err(FsError::BadImage);
        }

        let mut image = Image::blank(total_blocks);
        let sb = {
            let sb = image.block_mut(0).get_mut::<SuperBlock>(0);
            sb.initialize(total_blocks as u32);
            *sb
        };
        let fat = Fat::new(&sb);

        // 超级块与两份 FAT 占的块登记为链尾，永不参与分配
        for raw in 0..sb.data_start.raw() {
            fat.set_entry(&mut image, Bid::new(raw), Bid::END);
        }
        let root = sb.root();
        fat.set_entry(&mut image, root, Bid::END);
        image
            .block_mut(root.index())
            .get_mut::<DirHeader>(0)
            .initialize(root, Bid::FREE);

        log::info!("formatted image: {total_blocks} blocks, root at {root}");

        Ok(Self {
            image,
            sb,
            fat,
            cur_dir: root,
            files: [const { None }; MAX_OPEN_FILES],
        })
    }

    /// 从宿主机文件装载镜像并校验。
    pub fn load(path: &Path) -> Result<Self> {
        let image = Image::read_from(path)?;
        let sb = *image.block(0).get::<SuperBlock>(0);
        if !sb.is_valid() || !sb.geometry_matches(image.total_blocks()) {
            return Err(FsError::BadImage);
        }

        let fat = Fat::new(&sb);
        if fat.checksum(&image) != sb.fat_crc {
            return Err(FsError::BadImage);
        }

        let fs = Self {
            image,
            sb,
            fat,
            cur_dir: sb.root(),
            files: [const { None }; MAX_OPEN_FILES],
        };
        fs.verify()?;

        log::info!(
            "loaded image from {}: {} blocks, {} free",
            path.display(),
            fs.sb.total_blocks,
            fs.sb.free_blocks
        );
        Ok(fs)
    }

    /// 把会话状态写回镜像并持久化到宿主机文件。
    ///
    /// 先把脏句柄缓存的 FCB 刷回目录项，再写超级块与校验和；
    /// 打开文件表本身不持久化，描述符保持可用。
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.flush_handles();
        self.sb.fat_crc = self.fat.checksum(&self.image);
        *self.image.block_mut(0).get_mut::<SuperBlock>(0) = self.sb;
        self.image.write_to(path)?;
        log::info!("saved image to {}", path.display());
        Ok(())
    }

    pub fn info(&self) -> FsInfo {
        FsInfo {
            total_size: self.sb.total_size,
            total_blocks: self.sb.total_blocks,
            free_blocks: self.sb.free_blocks,
            fat_blocks: self.sb.fat_blocks,
            fcbs_per_block: self.sb.fcbs_per_block,
            data_start: self.sb.data_start,
        }
    }

    /// 当前目录换到 `path` 指向的目录。
    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.cur_dir = self.resolve_dir(path)?;
        Ok(())
    }

    /// 当前目录的绝对路径。
    pub fn cwd_path(&self) -> Result<String> {
        let mut names = Vec::new();
        let mut cur = self.cur_dir;
        let root = self.sb.root();
        while cur != root {
            let parent = self.dir_header(cur)?.parent();
            names.push(self.dir_name_of(parent, cur)?);
            cur = parent;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// 解析路径到目录链首块。`/` 开头从根出发，否则从当前目录出发；
    /// `.` 与 `..` 分别指向本目录与父目录，根的父目录仍是根。
    pub(crate) fn resolve_dir(&self, path: &str) -> Result<Bid> {
        let mut cur = if path.starts_with('/') {
            self.sb.root()
        } else {
            self.cur_dir
        };
        for comp in path.split('/').filter(|c| !c.is_empty()) {
            cur = self.step_into(cur, comp)?;
        }
        Ok(cur)
    }

    /// 目录树内前进一步。
    fn step_into(&self, dir: Bid, comp: &str) -> Result<Bid> {
        match comp {
            "." => Ok(dir),
            ".." => {
                let parent = self.dir_header(dir)?.parent();
                Ok(if parent == Bid::FREE { dir } else { parent })
            }
            name => {
                let (_, fcb) = self.find_entry(dir, name)?.ok_or(FsError::NotFound)?;
                if !fcb.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                Ok(fcb.start())
            }
        }
    }

    /// 把路径拆成父目录（解析到块号）与叶名。
    pub(crate) fn resolve_parent<'p>(&self, path: &'p str) -> Result<(Bid, &'p str)> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            // 空路径，或者整条路径只有斜杠
            return Err(FsError::NotFound);
        }
        let (dir_part, leaf) = match trimmed.rsplit_once('/') {
            Some(("", leaf)) => ("/", leaf),
            Some(parts) => parts,
            None => ("", trimmed),
        };
        Ok((self.resolve_dir(dir_part)?, leaf))
    }

    /// 在 `parent` 中找到指向 `child` 目录的条目名。
    fn dir_name_of(&self, parent: Bid, child: Bid) -> Result<String> {
        for bid in self.fat.chain(&self.image, parent) {
            let bid = bid?;
            for nth in 0..FCBS_PER_BLOCK {
                let fcb = self.read_slot(Slot { bid, nth });
                if fcb.exists() && fcb.is_dir() && fcb.start() == child {
                    return Ok(fcb.name().to_owned());
                }
            }
        }
        Err(FsError::BadImage)
    }

    /// 全镜像一致性检查。
    ///
    /// 从根目录出发遍历所有目录与文件：每条链必须终结、互不相交、
    /// 不踏入保留区；目录头计数与在用条目数一致，父块号指回所在
    /// 目录；文件链长与登记的长度吻合；两份 FAT 一致；空闲计数
    /// 满足守恒：空闲 + 占用 + 保留 = 总块数。
    pub fn verify(&self) -> Result<()> {
        let total = self.sb.total_blocks as usize;
        let mut seen = vec![false; total];
        let mut live = 0u32;

        let mut stack = vec![(self.sb.root(), Bid::FREE)];
        while let Some((dir, parent)) = stack.pop() {
            let header = self.dir_header(dir)?;
            if header.parent() != parent {
                return Err(FsError::BadImage);
            }
            let blocks = self.dir_blocks(dir)?;
            for &bid in &blocks {
                let h = *self.image.block(bid.index()).get::<DirHeader>(0);
                if !h.is_valid() || h.bid() != bid {
                    return Err(FsError::BadImage);
                }
                if std::mem::replace(&mut seen[bid.index()], true) {
                    return Err(FsError::CorruptChain);
                }
                live += 1;
            }

            let mut items = 0;
            for &bid in &blocks {
                for nth in 0..FCBS_PER_BLOCK {
                    let slot = Slot { bid, nth };
                    let fcb = self.read_slot(slot);
                    if !fcb.exists() {
                        continue;
                    }
                    items += 1;
                    if fcb.is_dir() {
                        stack.push((fcb.start(), dir));
                        continue;
                    }

                    let mut count = 0u64;
                    if fcb.start() != Bid::FREE {
                        for data in self.fat.chain(&self.image, fcb.start()) {
                            let data = data?;
                            if std::mem::replace(&mut seen[data.index()], true) {
                                return Err(FsError::CorruptChain);
                            }
                            live += 1;
                            count += 1;
                        }
                    }
                    // 脏句柄的长度还没刷回，此时链长允许超前
                    let open = self.files.iter().flatten().any(|of| of.slot == slot);
                    if !open && count != (fcb.size() as u64).div_ceil(BLOCK_SIZE as u64) {
                        return Err(FsError::BadImage);
                    }
                }
            }
            if items != header.item_num() {
                return Err(FsError::BadImage);
            }
        }

        if !self.fat.mirrors_match(&self.image) {
            return Err(FsError::BadImage);
        }
        let reserved = self.sb.data_start.raw() as u32;
        if self.fat.count_free(&self.image) != self.sb.free_blocks
            || reserved + live + self.sb.free_blocks != self.sb.total_blocks
        {
            return Err(FsError::BadImage);
        }
        Ok(())
    }
}
