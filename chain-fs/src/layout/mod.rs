//! # 磁盘数据结构层
//!
//! 镜像上三类块的内部布局：超级块、目录块与其中的 FCB。
//! 各结构皆为 `repr(C)`，直接在镜像块上原地读写。

mod dir;
mod fcb;
mod super_block;

pub use self::{
    dir::{DirHeader, FCBS_PER_BLOCK, slot_offset},
    fcb::{Fcb, FcbAttr, NAME_LENGTH, unix_now},
    super_block::SuperBlock,
};
