//! # 目录操作层
//!
//! 目录的一切落在 FCB 槽位上：查找按名字逐槽比对，
//! 新建找第一个空槽，链上无空槽时为目录追加一个续块。
//! 续块与链首同构，但条目计数只在链首维护。

use crate::{
    bid::Bid,
    error::{FsError, Result},
    fs::ChainFileSystem,
    layout::{DirHeader, FCBS_PER_BLOCK, Fcb, NAME_LENGTH, slot_offset, unix_now},
};

/// 目录项的位置：所在块与块内槽号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub bid: Bid,
    pub nth: usize,
}

/// 目录项种类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// 列目录产出的一行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub kind: EntryKind,
    pub size: u32,
    pub created: i64,
    pub modified: i64,
}

impl From<&Fcb> for EntryInfo {
    fn from(fcb: &Fcb) -> Self {
        Self {
            name: fcb.name().to_owned(),
            kind: if fcb.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: fcb.size(),
            created: fcb.created(),
            modified: fcb.modified(),
        }
    }
}

/// 目录的一份快照。
#[derive(Debug, Clone)]
pub struct DirStat {
    /// 目录链首块。
    pub bid: Bid,
    /// 父目录链首块，根目录时为自身。
    pub parent: Bid,
    /// 在用条目数。
    pub items: u32,
    /// 目录链占用的块数。
    pub blocks: u32,
    /// 链上全部槽位数。
    pub capacity: u32,
    /// 各条目的详细信息。
    pub entries: Vec<EntryInfo>,
}

/// 惰性列目录迭代器，跳过空槽。
pub struct DirEntries<'a> {
    fs: &'a ChainFileSystem,
    blocks: Vec<Bid>,
    block: usize,
    nth: usize,
}

impl Iterator for DirEntries<'_> {
    type Item = EntryInfo;

    fn next(&mut self) -> Option<Self::Item> {
        while self.block < self.blocks.len() {
            if self.nth == FCBS_PER_BLOCK {
                self.block += 1;
                self.nth = 0;
                continue;
            }
            let slot = Slot {
                bid: self.blocks[self.block],
                nth: self.nth,
            };
            self.nth += 1;
            let fcb = self.fs.read_slot(slot);
            if fcb.exists() {
                return Some(EntryInfo::from(&fcb));
            }
        }
        None
    }
}

impl ChainFileSystem {
    /// 列出当前目录的在用条目。
    ///
    /// 打开文件未刷回的长度变更在关闭或保存前不反映在结果里。
    pub fn ls(&self) -> Result<DirEntries<'_>> {
        let blocks = self.dir_blocks(self.cur_dir)?;
        Ok(DirEntries {
            fs: self,
            blocks,
            block: 0,
            nth: 0,
        })
    }

    /// 当前目录的快照，含每个条目的详细信息。
    pub fn stat(&self) -> Result<DirStat> {
        let header = self.dir_header(self.cur_dir)?;
        let blocks = self.dir_blocks(self.cur_dir)?.len() as u32;
        let parent = if header.parent() == Bid::FREE {
            self.cur_dir
        } else {
            header.parent()
        };
        Ok(DirStat {
            bid: self.cur_dir,
            parent,
            items: header.item_num(),
            blocks,
            capacity: blocks * FCBS_PER_BLOCK as u32,
            entries: self.ls()?.collect(),
        })
    }

    /// 创建子目录。
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        Self::validate_name(name)?;
        if self.find_entry(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        let block = self.fat.alloc(&mut self.image, &mut self.sb)?;
        self.image
            .block_mut(block.index())
            .get_mut::<DirHeader>(0)
            .initialize(block, parent);

        let slot = match self.free_slot(parent) {
            Ok(slot) => slot,
            Err(e) => {
                // 槽位分配失败，收回刚建的目录块
                self.fat.free_one(&mut self.image, &mut self.sb, block);
                return Err(e);
            }
        };
        self.write_slot(slot, &Fcb::new_dir(name, block, unix_now()));
        self.bump_items(parent, 1);
        log::debug!("mkdir {path}: block {block}, parent {parent}");
        Ok(())
    }

    /// 删除空目录。删除的恰是当前目录时，退回其父目录。
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (slot, fcb) = self.find_entry(parent, name)?.ok_or(FsError::NotFound)?;
        if !fcb.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let dir = fcb.start();
        if self.dir_header(dir)?.item_num() != 0 {
            return Err(FsError::DirectoryNotEmpty);
        }

        self.fat.free_chain(&mut self.image, &mut self.sb, dir)?;
        self.clear_slot(slot);
        self.bump_items(parent, -1);
        if self.cur_dir == dir {
            self.cur_dir = parent;
        }
        log::debug!("rmdir {path}: freed {dir}");
        Ok(())
    }

    /// 改名或移动。同一目录内文件与目录都可改名，
    /// 跨目录移动仅支持文件。
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (old_parent, old_name) = self.resolve_parent(from)?;
        let (slot, mut fcb) = self
            .find_entry(old_parent, old_name)?
            .ok_or(FsError::NotFound)?;
        let (new_parent, new_name) = self.resolve_parent(to)?;
        Self::validate_name(new_name)?;
        if let Some((dest, _)) = self.find_entry(new_parent, new_name)? {
            // 目标就是源自身，同名改名视作无事发生
            if dest != slot {
                return Err(FsError::AlreadyExists);
            }
            return Ok(());
        }

        if old_parent == new_parent {
            fcb.rename(new_name);
            self.write_slot(slot, &fcb);
            self.patch_handles(slot, slot, new_name);
        } else {
            if fcb.is_dir() {
                return Err(FsError::IsADirectory);
            }
            let dest = self.free_slot(new_parent)?;
            fcb.rename(new_name);
            self.write_slot(dest, &fcb);
            self.clear_slot(slot);
            self.bump_items(old_parent, -1);
            self.bump_items(new_parent, 1);
            self.patch_handles(slot, dest, new_name);
        }
        log::debug!("rename {from} -> {to}");
        Ok(())
    }

    /// 目录头的副本。块号越界或块头魔数不符即判镜像损坏。
    pub(crate) fn dir_header(&self, dir: Bid) -> Result<DirHeader> {
        if !self.fat.in_data_area(dir) {
            return Err(FsError::BadImage);
        }
        let header = *self.image.block(dir.index()).get::<DirHeader>(0);
        if !header.is_valid() {
            return Err(FsError::BadImage);
        }
        Ok(header)
    }

    /// 目录的块链。
    pub(crate) fn dir_blocks(&self, dir: Bid) -> Result<Vec<Bid>> {
        self.fat.chain(&self.image, dir).collect()
    }

    pub(crate) fn read_slot(&self, slot: Slot) -> Fcb {
        *self
            .image
            .block(slot.bid.index())
            .get::<Fcb>(slot_offset(slot.nth))
    }

    pub(crate) fn write_slot(&mut self, slot: Slot, fcb: &Fcb) {
        *self
            .image
            .block_mut(slot.bid.index())
            .get_mut::<Fcb>(slot_offset(slot.nth)) = *fcb;
    }

    pub(crate) fn clear_slot(&mut self, slot: Slot) {
        self.image
            .block_mut(slot.bid.index())
            .get_mut::<Fcb>(slot_offset(slot.nth))
            .clear();
    }

    /// 在目录中查找名字精确匹配的在用条目。
    pub(crate) fn find_entry(&self, dir: Bid, name: &str) -> Result<Option<(Slot, Fcb)>> {
        self.dir_header(dir)?;
        for bid in self.fat.chain(&self.image, dir) {
            let bid = bid?;
            for nth in 0..FCBS_PER_BLOCK {
                let slot = Slot { bid, nth };
                let fcb = self.read_slot(slot);
                if fcb.exists() && fcb.name_matches(name) {
                    return Ok(Some((slot, fcb)));
                }
            }
        }
        Ok(None)
    }

    /// 找一个空槽，整条链都满时为目录追加一个续块。
    pub(crate) fn free_slot(&mut self, dir: Bid) -> Result<Slot> {
        let blocks = self.dir_blocks(dir)?;
        for &bid in &blocks {
            for nth in 0..FCBS_PER_BLOCK {
                let slot = Slot { bid, nth };
                if !self.read_slot(slot).exists() {
                    return Ok(slot);
                }
            }
        }

        let parent = self.dir_header(dir)?.parent();
        let tail = blocks.last().copied().ok_or(FsError::CorruptChain)?;
        let fresh = self.fat.alloc(&mut self.image, &mut self.sb)?;
        self.fat.couple(&mut self.image, tail, fresh);
        self.image
            .block_mut(fresh.index())
            .get_mut::<DirHeader>(0)
            .initialize(fresh, parent);
        log::debug!("dir {dir} grew a block: {fresh}");
        Ok(Slot {
            bid: fresh,
            nth: 0,
        })
    }

    /// 链首块头里的条目计数增减。
    pub(crate) fn bump_items(&mut self, dir: Bid, delta: i32) {
        self.image
            .block_mut(dir.index())
            .get_mut::<DirHeader>(0)
            .add_items(delta);
    }

    /// 校验新名字：非空、不超长，也不得是 `.` 或 `..`。
    pub(crate) fn validate_name(name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(FsError::AlreadyExists);
        }
        if name.is_empty() {
            return Err(FsError::NotFound);
        }
        if name.len() > NAME_LENGTH {
            return Err(FsError::NameTooLong);
        }
        Ok(())
    }
}
