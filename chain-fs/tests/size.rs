use std::mem;

use chain_fs::{BLOCK_SIZE, Bid, DirHeader, FCBS_PER_BLOCK, Fcb, SuperBlock};

#[test]
fn layout() {
    assert_eq!(2, mem::size_of::<Bid>());
    assert_eq!(32, mem::size_of::<SuperBlock>());
    assert_eq!(32, mem::size_of::<Fcb>());
    assert_eq!(8, mem::align_of::<Fcb>());
    assert_eq!(12, mem::size_of::<DirHeader>());
}

#[test]
fn capacity() {
    // 块头占 16 字节，剩余空间装整数个 FCB
    assert_eq!(127, FCBS_PER_BLOCK);
    assert_eq!((BLOCK_SIZE - 16) / mem::size_of::<Fcb>(), FCBS_PER_BLOCK);
}
