//! # 文件操作层
//!
//! 打开文件表最多十六项，文件描述符就是表内下标。每项缓存一份
//! FCB、读写游标与游标所在的链块；写入只改数据块与缓存，
//! 关闭或保存时才把脏 FCB 刷回目录项。
//! 同一文件被多个描述符打开时，各句柄共享同一份缓存状态。

use std::io::SeekFrom;

use crate::{
    BLOCK_SIZE,
    bid::Bid,
    dir::Slot,
    error::{FsError, Result},
    fs::ChainFileSystem,
    layout::{Fcb, unix_now},
};

/// 打开文件表容量。
pub const MAX_OPEN_FILES: usize = 16;

/// 打开文件表的一项。
///
/// `at` 始终是游标所在的链块：游标落在第 `off / 4096` 块上，
/// 越过文件末尾时停在链尾块；文件还没有块时为 [`Bid::FREE`]。
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub fcb: Fcb,
    pub slot: Slot,
    pub off: u64,
    pub at: Bid,
    pub dirty: bool,
}

/// 文件长度折算的链块数。
fn block_count(size: u32) -> u64 {
    (size as u64).div_ceil(BLOCK_SIZE as u64)
}

impl ChainFileSystem {
    /// 新建空文件并打开，返回文件描述符。
    pub fn create(&mut self, path: &str) -> Result<usize> {
        let (parent, name) = self.resolve_parent(path)?;
        Self::validate_name(name)?;
        if self.find_entry(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        let fd = self.fd_slot()?;
        let slot = self.free_slot(parent)?;
        let fcb = Fcb::new_file(name, unix_now());
        self.write_slot(slot, &fcb);
        self.bump_items(parent, 1);
        self.files[fd] = Some(OpenFile {
            fcb,
            slot,
            off: 0,
            at: Bid::FREE,
            dirty: false,
        });
        log::debug!("create {path}: fd {fd}");
        Ok(fd)
    }

    /// 打开既有文件，返回文件描述符。游标置于文件开头。
    pub fn open(&mut self, path: &str) -> Result<usize> {
        let (parent, name) = self.resolve_parent(path)?;
        let (slot, mut fcb) = self.find_entry(parent, name)?.ok_or(FsError::NotFound)?;
        if fcb.is_dir() {
            return Err(FsError::IsADirectory);
        }
        // 同一文件已被打开时以现有句柄的缓存为准
        if let Some(live) = self.files.iter().flatten().find(|of| of.slot == slot) {
            fcb = live.fcb;
        }

        let fd = self.fd_slot()?;
        let at = fcb.start();
        self.files[fd] = Some(OpenFile {
            fcb,
            slot,
            off: 0,
            at,
            dirty: false,
        });
        log::debug!("open {path}: fd {fd}");
        Ok(fd)
    }

    /// 关闭描述符，脏 FCB 写回目录项。
    pub fn close(&mut self, fd: usize) -> Result<()> {
        let of = self
            .files
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FsError::InvalidDescriptor)?;
        if of.dirty {
            self.write_slot(of.slot, &of.fcb);
        }
        log::debug!("close fd {fd}");
        Ok(())
    }

    /// 移动读写游标，返回新偏移。
    ///
    /// 允许越过文件末尾，空洞在随后的写入中补零；负偏移报错。
    pub fn seek(&mut self, fd: usize, pos: SeekFrom) -> Result<u64> {
        let of = self.handle(fd)?;
        let size = of.fcb.size() as i64;
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).map_err(|_| FsError::InvalidOffset)?,
            SeekFrom::Current(d) => (of.off as i64)
                .checked_add(d)
                .ok_or(FsError::InvalidOffset)?,
            SeekFrom::End(d) => size.checked_add(d).ok_or(FsError::InvalidOffset)?,
        };
        if target < 0 {
            return Err(FsError::InvalidOffset);
        }
        let off = target as u64;

        let fcb = of.fcb;
        let at = self.cursor_block(&fcb, off)?;

        let of = self.handle_mut(fd)?;
        of.off = off;
        of.at = at;
        Ok(off)
    }

    /// 从游标处读至多 `n` 字节，游标随之前移。
    /// 游标已在文件末尾之后时返回空。
    pub fn read(&mut self, fd: usize, n: usize) -> Result<Vec<u8>> {
        let of = self.handle(fd)?;
        let size = of.fcb.size() as u64;
        let (mut off, mut at) = (of.off, of.at);

        let len = (n as u64).min(size.saturating_sub(off)) as usize;
        let mut buf = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let in_block = (off % BLOCK_SIZE as u64) as usize;
            let take = (BLOCK_SIZE - in_block).min(len - done);
            buf[done..done + take]
                .copy_from_slice(&self.image.block(at.index()).bytes()[in_block..in_block + take]);
            done += take;
            off += take as u64;
            // 停在块边界且后面还有数据时，游标块前进一格
            if off % BLOCK_SIZE as u64 == 0 && off < size {
                at = self.fat.next(&self.image, at)?.ok_or(FsError::CorruptChain)?;
            }
        }

        let of = self.handle_mut(fd)?;
        of.off = off;
        of.at = at;
        Ok(buf)
    }

    /// 从游标处写入整个缓冲区，返回实际写入的字节数。
    ///
    /// 空间不足时写到哪算哪；一个字节都写不进时报 `NoSpace`，
    /// 且不留下多分配的块。新块在分配时清零，
    /// 所以游标越过旧末尾留下的空洞天然为零。
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            self.handle(fd)?;
            return Ok(0);
        }
        let of = self.handle(fd)?;
        let size = of.fcb.size() as u64;
        let off = of.off;
        let cached_at = of.at;

        let have = block_count(of.fcb.size());
        let need = (off + buf.len() as u64).div_ceil(BLOCK_SIZE as u64);

        // 先补齐链上缺的块；中途分配失败就止步，能写多少写多少
        let mut chain_start = of.fcb.start();
        let mut blocks = have;
        let mut appended: Vec<Bid> = Vec::new();
        if need > have {
            let old_tail = if have == 0 {
                Bid::FREE
            } else {
                self.fat.last(&self.image, chain_start)?
            };
            let mut tail = old_tail;
            while blocks < need {
                match self.fat.alloc(&mut self.image, &mut self.sb) {
                    Ok(fresh) => {
                        if tail == Bid::FREE {
                            chain_start = fresh;
                        } else {
                            self.fat.couple(&mut self.image, tail, fresh);
                        }
                        appended.push(fresh);
                        tail = fresh;
                        blocks += 1;
                    }
                    Err(FsError::NoSpace) => break,
                    Err(e) => return Err(e),
                }
            }

            if blocks * BLOCK_SIZE as u64 <= off {
                // 一个字节都放不下，回滚刚追加的块
                for &bid in &appended {
                    self.fat.free_one(&mut self.image, &mut self.sb, bid);
                }
                if old_tail != Bid::FREE {
                    self.fat.set_entry(&mut self.image, old_tail, Bid::END);
                }
                return Err(FsError::NoSpace);
            }
        }

        let capacity = blocks * BLOCK_SIZE as u64;
        let writable = (capacity - off).min(buf.len() as u64) as usize;

        let first_idx = off / BLOCK_SIZE as u64;
        let mut at = if first_idx >= have {
            appended[(first_idx - have) as usize]
        } else {
            cached_at
        };

        let mut done = 0usize;
        let mut cursor = off;
        while done < writable {
            let in_block = (cursor % BLOCK_SIZE as u64) as usize;
            let take = (BLOCK_SIZE - in_block).min(writable - done);
            self.image.block_mut(at.index()).bytes_mut()[in_block..in_block + take]
                .copy_from_slice(&buf[done..done + take]);
            done += take;
            cursor += take as u64;
            if cursor % BLOCK_SIZE as u64 == 0 && done < writable {
                at = self.fat.next(&self.image, at)?.ok_or(FsError::CorruptChain)?;
            }
        }

        // 停在块边界且不是新末尾时，游标块归位到边界后那一块
        let new_size = size.max(off + writable as u64);
        if cursor % BLOCK_SIZE as u64 == 0 && cursor < new_size {
            at = self.fat.next(&self.image, at)?.ok_or(FsError::CorruptChain)?;
        }

        let now = unix_now();
        let of = self.handle_mut(fd)?;
        of.off = cursor;
        of.at = at;
        of.fcb.set_start(chain_start);
        of.fcb.set_size(new_size as u32);
        of.fcb.touch(now);
        of.dirty = true;
        let (slot, fcb) = (of.slot, of.fcb);
        self.share_fcb(fd, slot, &fcb)?;
        log::trace!("write fd {fd}: {writable} bytes at {off}");
        Ok(writable)
    }

    /// 删除文件并释放其块链。文件还开着时拒绝。
    pub fn rm(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let (slot, fcb) = self.find_entry(parent, name)?.ok_or(FsError::NotFound)?;
        if fcb.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if self.files.iter().flatten().any(|of| of.slot == slot) {
            return Err(FsError::FileIsOpen);
        }

        if fcb.start() != Bid::FREE {
            self.fat
                .free_chain(&mut self.image, &mut self.sb, fcb.start())?;
        }
        self.clear_slot(slot);
        self.bump_items(parent, -1);
        log::debug!("rm {path}");
        Ok(())
    }

    /// 把所有脏句柄的 FCB 刷回目录项，描述符保持打开。
    pub(crate) fn flush_handles(&mut self) {
        for fd in 0..MAX_OPEN_FILES {
            let Some(of) = &self.files[fd] else { continue };
            if !of.dirty {
                continue;
            }
            let (slot, fcb) = (of.slot, of.fcb);
            self.write_slot(slot, &fcb);
            if let Some(of) = &mut self.files[fd] {
                of.dirty = false;
            }
        }
    }

    /// 目录项挪了位置或改了名后，同步所有指向它的句柄。
    pub(crate) fn patch_handles(&mut self, old: Slot, new: Slot, name: &str) {
        for of in self.files.iter_mut().flatten() {
            if of.slot == old {
                of.slot = new;
                of.fcb.rename(name);
            }
        }
    }

    /// 同一槽位可能有多个打开的句柄；文件状态变了之后，
    /// 其余句柄换上新的 FCB，并按各自游标重算所在链块。
    fn share_fcb(&mut self, writer: usize, slot: Slot, fcb: &Fcb) -> Result<()> {
        for fd in 0..MAX_OPEN_FILES {
            if fd == writer {
                continue;
            }
            let Some(of) = &self.files[fd] else { continue };
            if of.slot != slot {
                continue;
            }
            let at = self.cursor_block(fcb, of.off)?;
            if let Some(of) = &mut self.files[fd] {
                of.fcb = *fcb;
                of.at = at;
            }
        }
        Ok(())
    }

    /// 游标所在的链块：第 `off / 4096` 块，越过末尾停在链尾，
    /// 文件没有块时为 [`Bid::FREE`]。
    fn cursor_block(&self, fcb: &Fcb, off: u64) -> Result<Bid> {
        let blocks = block_count(fcb.size());
        if blocks == 0 {
            return Ok(Bid::FREE);
        }
        let idx = (off / BLOCK_SIZE as u64).min(blocks - 1);
        self.fat
            .nth(&self.image, fcb.start(), idx as usize)?
            .ok_or(FsError::CorruptChain)
    }

    fn fd_slot(&self) -> Result<usize> {
        self.files
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)
    }

    fn handle(&self, fd: usize) -> Result<&OpenFile> {
        self.files
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(FsError::InvalidDescriptor)
    }

    fn handle_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.files
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(FsError::InvalidDescriptor)
    }
}
