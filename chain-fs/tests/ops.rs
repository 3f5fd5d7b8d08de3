use chain_fs::{
    BLOCK_SIZE, ChainFileSystem, EntryKind, FsError, MAX_OPEN_FILES, SeekFrom,
};

fn fresh(blocks: usize) -> ChainFileSystem {
    ChainFileSystem::format(blocks).expect("format")
}

fn put_file(fs: &mut ChainFileSystem, path: &str, data: &[u8]) {
    let fd = fs.create(path).expect("create");
    if !data.is_empty() {
        assert_eq!(data.len(), fs.write(fd, data).expect("write"));
    }
    fs.close(fd).expect("close");
}

fn read_all(fs: &mut ChainFileSystem, path: &str) -> Vec<u8> {
    let fd = fs.open(path).expect("open");
    let size = fs.seek(fd, SeekFrom::End(0)).expect("seek end");
    fs.seek(fd, SeekFrom::Start(0)).expect("seek start");
    let data = fs.read(fd, size as usize).expect("read");
    fs.close(fd).expect("close");
    data
}

fn names(fs: &ChainFileSystem) -> Vec<String> {
    fs.ls().expect("ls").map(|e| e.name).collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn format_geometry() {
    let fs = fresh(4096);
    let info = fs.info();
    assert_eq!(4096, info.total_blocks);
    assert_eq!(4096 * BLOCK_SIZE as u32, info.total_size);
    assert_eq!(2, info.fat_blocks);
    assert_eq!(5, info.data_start.raw());
    assert_eq!(4096 - 5 - 1, info.free_blocks);
    assert_eq!(127, info.fcbs_per_block);
    assert_eq!("/", fs.cwd_path().expect("cwd"));
    fs.verify().expect("fresh image is consistent");
}

#[test]
fn format_rejects_bad_sizes() {
    assert!(matches!(ChainFileSystem::format(0), Err(FsError::BadImage)));
    assert!(matches!(ChainFileSystem::format(4), Err(FsError::BadImage)));
    assert!(matches!(
        ChainFileSystem::format(65537),
        Err(FsError::BadImage)
    ));
}

#[test]
fn mkdir_rmdir_inverse() {
    let mut fs = fresh(64);
    let free = fs.info().free_blocks;

    fs.mkdir("docs").expect("mkdir");
    assert_eq!(vec!["docs"], names(&fs));
    assert_eq!(free - 1, fs.info().free_blocks);

    fs.rmdir("docs").expect("rmdir");
    assert!(names(&fs).is_empty());
    assert_eq!(free, fs.info().free_blocks);
    fs.verify().expect("consistent");
}

#[test]
fn nested_dirs_and_cd() {
    let mut fs = fresh(64);
    fs.mkdir("a").expect("mkdir a");
    fs.cd("a").expect("cd a");
    fs.mkdir("b").expect("mkdir b");
    fs.cd("b").expect("cd b");
    assert_eq!("/a/b", fs.cwd_path().expect("cwd"));

    fs.cd("..").expect("cd ..");
    assert_eq!("/a", fs.cwd_path().expect("cwd"));
    fs.cd("b/../../a/./b").expect("winding path");
    assert_eq!("/a/b", fs.cwd_path().expect("cwd"));

    fs.cd("/").expect("cd /");
    assert_eq!("/", fs.cwd_path().expect("cwd"));
    // 根的父目录仍是根
    fs.cd("..").expect("cd .. at root");
    assert_eq!("/", fs.cwd_path().expect("cwd"));
}

#[test]
fn cd_rejects() {
    let mut fs = fresh(64);
    assert!(matches!(fs.cd("missing"), Err(FsError::NotFound)));
    put_file(&mut fs, "f", b"x");
    assert!(matches!(fs.cd("f"), Err(FsError::NotADirectory)));
    assert!(matches!(fs.mkdir("f/sub"), Err(FsError::NotADirectory)));
}

#[test]
fn duplicate_names_rejected() {
    let mut fs = fresh(64);
    fs.mkdir("x").expect("mkdir");
    assert!(matches!(fs.mkdir("x"), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.create("x"), Err(FsError::AlreadyExists)));

    put_file(&mut fs, "f", b"");
    assert!(matches!(fs.create("f"), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.mkdir("f"), Err(FsError::AlreadyExists)));
}

#[test]
fn name_length_limit() {
    let mut fs = fresh(64);
    put_file(&mut fs, "exactly9!", b"ok");
    assert!(matches!(fs.create("morethan9!"), Err(FsError::NameTooLong)));
    assert!(matches!(fs.mkdir("alsolong10"), Err(FsError::NameTooLong)));
    // 名字按字节计长，多字节字符同样受限
    fs.mkdir("数据").expect("six-byte name");
    assert!(matches!(fs.mkdir("数据目录"), Err(FsError::NameTooLong)));
}

#[test]
fn dot_names_rejected() {
    let mut fs = fresh(64);
    assert!(matches!(fs.mkdir("."), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.mkdir(".."), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.create("."), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.mkdir(""), Err(FsError::NotFound)));
    assert!(matches!(fs.mkdir("/"), Err(FsError::NotFound)));
}

#[test]
fn write_then_read_back() {
    let mut fs = fresh(64);
    let fd = fs.create("notes").expect("create");
    assert_eq!(11, fs.write(fd, b"hello world").expect("write"));
    fs.seek(fd, SeekFrom::Start(0)).expect("rewind");
    assert_eq!(b"hello world".to_vec(), fs.read(fd, 64).expect("read"));
    fs.close(fd).expect("close");

    let entry = fs.ls().expect("ls").next().expect("one entry");
    assert_eq!("notes", entry.name);
    assert_eq!(EntryKind::File, entry.kind);
    assert_eq!(11, entry.size);
    assert!(entry.created <= entry.modified);

    assert_eq!(b"hello world".to_vec(), read_all(&mut fs, "notes"));
    fs.verify().expect("consistent");
}

#[test]
fn multi_block_io_and_boundaries() {
    let mut fs = fresh(64);
    let data = pattern(3 * BLOCK_SIZE + 100);
    let free = fs.info().free_blocks;
    put_file(&mut fs, "big", &data);
    assert_eq!(free - 4, fs.info().free_blocks);
    assert_eq!(data, read_all(&mut fs, "big"));

    let fd = fs.open("big").expect("open");
    // 跨块读
    fs.seek(fd, SeekFrom::Start(BLOCK_SIZE as u64 - 1)).expect("seek");
    assert_eq!(
        data[BLOCK_SIZE - 1..BLOCK_SIZE + 1].to_vec(),
        fs.read(fd, 2).expect("read across boundary")
    );
    // 整块读
    fs.seek(fd, SeekFrom::Start(BLOCK_SIZE as u64)).expect("seek");
    assert_eq!(
        data[BLOCK_SIZE..2 * BLOCK_SIZE].to_vec(),
        fs.read(fd, BLOCK_SIZE).expect("read one block")
    );
    // 从末尾倒数
    fs.seek(fd, SeekFrom::End(-100)).expect("seek from end");
    assert_eq!(
        data[3 * BLOCK_SIZE..].to_vec(),
        fs.read(fd, 1000).expect("read clamped at eof")
    );
    // 游标在末尾，读到空
    assert_eq!(data.len() as u64, fs.seek(fd, SeekFrom::End(0)).expect("seek"));
    assert!(fs.read(fd, 10).expect("read at eof").is_empty());
    fs.close(fd).expect("close");
    fs.verify().expect("consistent");
}

#[test]
fn overwrite_keeps_length() {
    let mut fs = fresh(64);
    put_file(&mut fs, "f", &pattern(2 * BLOCK_SIZE));
    let free = fs.info().free_blocks;

    let fd = fs.open("f").expect("open");
    fs.seek(fd, SeekFrom::Start(10)).expect("seek");
    assert_eq!(4, fs.write(fd, b"XYZW").expect("overwrite"));
    fs.close(fd).expect("close");

    // 覆写不分配新块，长度不变
    assert_eq!(free, fs.info().free_blocks);
    let data = read_all(&mut fs, "f");
    assert_eq!(2 * BLOCK_SIZE, data.len());
    assert_eq!(b"XYZW"[..], data[10..14]);
    fs.verify().expect("consistent");
}

#[test]
fn seek_rules() {
    let mut fs = fresh(64);
    let fd = fs.create("f").expect("create");
    fs.write(fd, b"0123456789").expect("write");

    assert!(matches!(
        fs.seek(fd, SeekFrom::Current(-11)),
        Err(FsError::InvalidOffset)
    ));
    assert!(matches!(
        fs.seek(fd, SeekFrom::End(-11)),
        Err(FsError::InvalidOffset)
    ));
    assert!(matches!(
        fs.seek(99, SeekFrom::Start(0)),
        Err(FsError::InvalidDescriptor)
    ));

    // 越过末尾合法，读返回空
    assert_eq!(1 << 20, fs.seek(fd, SeekFrom::Start(1 << 20)).expect("seek far"));
    assert!(fs.read(fd, 8).expect("read past eof").is_empty());

    assert_eq!(5, fs.seek(fd, SeekFrom::Start(5)).expect("seek"));
    assert_eq!(7, fs.seek(fd, SeekFrom::Current(2)).expect("seek"));
    assert_eq!(b"789".to_vec(), fs.read(fd, 100).expect("read tail"));
    fs.close(fd).expect("close");
}

#[test]
fn sparse_gap_reads_zero() {
    let mut fs = fresh(64);
    let fd = fs.create("sparse").expect("create");
    fs.write(fd, b"AB").expect("write head");
    fs.seek(fd, SeekFrom::Start(5000)).expect("seek into hole");
    assert_eq!(1, fs.write(fd, b"Z").expect("write tail"));
    fs.close(fd).expect("close");

    let data = read_all(&mut fs, "sparse");
    assert_eq!(5001, data.len());
    assert_eq!(b"AB"[..], data[..2]);
    assert!(data[2..5000].iter().all(|&b| b == 0));
    assert_eq!(b'Z', data[5000]);
    fs.verify().expect("consistent");
}

#[test]
fn disk_full_then_recover() {
    let mut fs = fresh(8);
    // 8 块：超级块 + 两份 FAT + 根目录，剩 4 块数据
    assert_eq!(4, fs.info().free_blocks);

    let fd = fs.create("hog").expect("create");
    let huge = vec![7u8; 5 * BLOCK_SIZE];
    // 只够 4 块，写入在此截断
    assert_eq!(4 * BLOCK_SIZE, fs.write(fd, &huge).expect("partial write"));
    assert_eq!(0, fs.info().free_blocks);
    // 链上再无处可写
    assert!(matches!(fs.write(fd, b"x"), Err(FsError::NoSpace)));
    fs.close(fd).expect("close");
    assert!(matches!(fs.mkdir("d"), Err(FsError::NoSpace)));
    fs.verify().expect("consistent when full");

    fs.rm("hog").expect("rm");
    assert_eq!(4, fs.info().free_blocks);
    fs.mkdir("d").expect("mkdir after recovery");
    fs.verify().expect("consistent");
}

#[test]
fn failed_sparse_write_rolls_back() {
    let mut fs = fresh(8);
    let fd = fs.create("f").expect("create");
    fs.write(fd, b"seed").expect("write");
    let free = fs.info().free_blocks;

    // 空洞远超剩余空间，一个字节都写不进
    fs.seek(fd, SeekFrom::Start(1 << 20)).expect("seek far");
    assert!(matches!(fs.write(fd, b"x"), Err(FsError::NoSpace)));
    // 追加的块全部收回
    assert_eq!(free, fs.info().free_blocks);
    fs.close(fd).expect("close");
    assert_eq!(b"seed".to_vec(), read_all(&mut fs, "f"));
    fs.verify().expect("consistent");
}

#[test]
fn descriptor_exhaustion() {
    let mut fs = fresh(256);
    let mut fds = Vec::new();
    for i in 0..MAX_OPEN_FILES {
        fds.push(fs.create(&format!("f{i}")).expect("create"));
    }
    assert!(matches!(fs.create("spill"), Err(FsError::TooManyOpenFiles)));
    // 表满时连目录项都不该留下
    assert_eq!(MAX_OPEN_FILES, names(&fs).len());

    fs.close(fds[3]).expect("close");
    assert_eq!(fds[3], fs.open("f0").expect("reopen"));
    for fd in [0, 1, 2].into_iter().chain(4..MAX_OPEN_FILES) {
        fs.close(fd).expect("close rest");
    }
    fs.close(fds[3]).expect("close reopened");
    fs.verify().expect("consistent");
}

#[test]
fn descriptor_misuse() {
    let mut fs = fresh(64);
    assert!(matches!(fs.close(0), Err(FsError::InvalidDescriptor)));
    assert!(matches!(fs.close(999), Err(FsError::InvalidDescriptor)));
    assert!(matches!(fs.read(0, 1), Err(FsError::InvalidDescriptor)));
    assert!(matches!(fs.write(0, b"x"), Err(FsError::InvalidDescriptor)));

    let fd = fs.create("f").expect("create");
    fs.close(fd).expect("close");
    assert!(matches!(fs.close(fd), Err(FsError::InvalidDescriptor)));
    assert!(matches!(fs.read(fd, 1), Err(FsError::InvalidDescriptor)));
}

#[test]
fn two_handles_same_file() {
    let mut fs = fresh(64);
    put_file(&mut fs, "shared", b"0123456789");
    let a = fs.open("shared").expect("open a");
    let b = fs.open("shared").expect("open b");
    assert_ne!(a, b);

    // 两个游标互不影响
    assert_eq!(b"0123".to_vec(), fs.read(a, 4).expect("read a"));
    assert_eq!(b"01".to_vec(), fs.read(b, 2).expect("read b"));
    assert_eq!(b"456".to_vec(), fs.read(a, 3).expect("read a again"));
    fs.close(a).expect("close a");
    fs.close(b).expect("close b");
}

#[test]
fn handles_share_file_state() {
    let mut fs = fresh(64);
    put_file(&mut fs, "f", b"");
    let free = fs.info().free_blocks;

    let a = fs.open("f").expect("open a");
    let b = fs.open("f").expect("open b");
    fs.write(a, b"first").expect("write a");
    // b 的缓存跟着 a 的写入走，不会另起一条链
    fs.write(b, b"SECOND").expect("write b");
    fs.close(a).expect("close a");
    fs.close(b).expect("close b");

    assert_eq!(free - 1, fs.info().free_blocks);
    assert_eq!(b"SECOND".to_vec(), read_all(&mut fs, "f"));
    fs.verify().expect("consistent");
}

#[test]
fn open_sees_unflushed_write() {
    let mut fs = fresh(64);
    let a = fs.create("f").expect("create");
    fs.write(a, b"not yet flushed").expect("write");

    // 目录项还没刷回，后开的句柄也要看到最新状态
    let b = fs.open("f").expect("open b");
    assert_eq!(15, fs.seek(b, SeekFrom::End(0)).expect("seek end"));
    fs.seek(b, SeekFrom::Start(0)).expect("rewind");
    assert_eq!(b"not yet flushed".to_vec(), fs.read(b, 64).expect("read"));
    fs.close(b).expect("close b");
    fs.close(a).expect("close a");
    fs.verify().expect("consistent");
}

#[test]
fn rm_rules() {
    let mut fs = fresh(64);
    fs.mkdir("d").expect("mkdir");
    assert!(matches!(fs.rm("d"), Err(FsError::IsADirectory)));
    assert!(matches!(fs.rm("missing"), Err(FsError::NotFound)));
    assert!(matches!(fs.rmdir("missing"), Err(FsError::NotFound)));

    put_file(&mut fs, "f", b"data");
    assert!(matches!(fs.rmdir("f"), Err(FsError::NotADirectory)));

    fs.cd("d").expect("cd");
    put_file(&mut fs, "inner", b"x");
    fs.cd("/").expect("cd /");
    assert!(matches!(fs.rmdir("d"), Err(FsError::DirectoryNotEmpty)));
    fs.rm("d/inner").expect("rm inner");
    fs.rmdir("d").expect("rmdir now empty");
    fs.verify().expect("consistent");
}

#[test]
fn rm_open_file_rejected() {
    let mut fs = fresh(64);
    let fd = fs.create("busy").expect("create");
    fs.write(fd, b"held").expect("write");
    assert!(matches!(fs.rm("busy"), Err(FsError::FileIsOpen)));
    fs.close(fd).expect("close");
    fs.rm("busy").expect("rm after close");
    fs.verify().expect("consistent");
}

#[test]
fn rename_in_place() {
    let mut fs = fresh(64);
    put_file(&mut fs, "old", b"content");
    fs.mkdir("dir1").expect("mkdir");

    fs.rename("old", "new").expect("rename file");
    fs.rename("dir1", "dir2").expect("rename dir");
    let mut listed = names(&fs);
    listed.sort();
    assert_eq!(vec!["dir2", "new"], listed);
    assert_eq!(b"content".to_vec(), read_all(&mut fs, "new"));
    fs.cd("dir2").expect("cd renamed dir");
    assert_eq!("/dir2", fs.cwd_path().expect("cwd"));
}

#[test]
fn rename_collisions() {
    let mut fs = fresh(64);
    put_file(&mut fs, "a", b"1");
    put_file(&mut fs, "b", b"2");
    assert!(matches!(fs.rename("a", "b"), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.rename("missing", "c"), Err(FsError::NotFound)));
    assert!(matches!(fs.rename("a", "waytoolong10"), Err(FsError::NameTooLong)));
}

#[test]
fn rename_to_same_name_is_noop() {
    let mut fs = fresh(64);
    put_file(&mut fs, "a", b"keep");
    fs.mkdir("d").expect("mkdir");

    // 目标就是源自身时不算冲突
    fs.rename("a", "a").expect("rename file to itself");
    fs.rename("d", "d").expect("rename dir to itself");
    let mut listed = names(&fs);
    listed.sort();
    assert_eq!(vec!["a", "d"], listed);
    assert_eq!(b"keep".to_vec(), read_all(&mut fs, "a"));
    // 真正的重名仍要拒绝
    assert!(matches!(fs.rename("a", "d"), Err(FsError::AlreadyExists)));
    fs.verify().expect("consistent");
}

#[test]
fn rename_across_dirs() {
    let mut fs = fresh(64);
    fs.mkdir("sub").expect("mkdir");
    put_file(&mut fs, "f", b"move me");

    fs.rename("f", "sub/g").expect("move file");
    assert_eq!(vec!["sub"], names(&fs));
    assert_eq!(b"move me".to_vec(), read_all(&mut fs, "sub/g"));

    // 目录不支持跨目录移动
    fs.mkdir("d").expect("mkdir");
    assert!(matches!(fs.rename("d", "sub/d2"), Err(FsError::IsADirectory)));
    fs.verify().expect("consistent");
}

#[test]
fn rename_follows_open_handle() {
    let mut fs = fresh(64);
    fs.mkdir("sub").expect("mkdir");
    let fd = fs.create("f").expect("create");
    fs.write(fd, b"live").expect("write");

    fs.rename("f", "sub/g").expect("move while open");
    fs.write(fd, b" data").expect("write after move");
    fs.close(fd).expect("close");

    assert!(matches!(fs.open("f"), Err(FsError::NotFound)));
    assert_eq!(b"live data".to_vec(), read_all(&mut fs, "sub/g"));
    fs.verify().expect("consistent");
}

#[test]
fn rmdir_of_cwd_moves_up() {
    let mut fs = fresh(64);
    fs.mkdir("a").expect("mkdir a");
    fs.cd("a").expect("cd a");
    fs.mkdir("b").expect("mkdir b");
    fs.cd("b").expect("cd b");

    fs.rmdir("/a/b").expect("rmdir cwd");
    assert_eq!("/a", fs.cwd_path().expect("cwd"));
    fs.rmdir("/a").expect("rmdir cwd again");
    assert_eq!("/", fs.cwd_path().expect("cwd"));
    fs.verify().expect("consistent");
}

#[test]
fn directory_grows_past_one_block() {
    let mut fs = fresh(64);
    let free = fs.info().free_blocks;
    // 一个目录块装 127 项，再多一项就得追加续块
    for i in 0..130 {
        let fd = fs.create(&format!("f{i}")).expect("create");
        fs.close(fd).expect("close");
    }
    assert_eq!(130, fs.ls().expect("ls").count());
    assert_eq!(free - 1, fs.info().free_blocks);

    let st = fs.stat().expect("stat");
    assert_eq!(130, st.items);
    assert_eq!(2, st.blocks);
    assert_eq!(254, st.capacity);

    for i in 0..130 {
        fs.rm(&format!("f{i}")).expect("rm");
    }
    assert_eq!(0, fs.ls().expect("ls").count());
    assert_eq!(0, fs.stat().expect("stat").items);
    fs.verify().expect("consistent");
}

#[test]
fn ls_is_idempotent() {
    let mut fs = fresh(64);
    fs.mkdir("d").expect("mkdir");
    put_file(&mut fs, "f", b"abc");

    let first: Vec<_> = fs.ls().expect("ls").collect();
    let second: Vec<_> = fs.ls().expect("ls").collect();
    assert_eq!(first, second);
    assert_eq!(2, first.len());

    let dir = first.iter().find(|e| e.name == "d").expect("dir entry");
    assert_eq!(EntryKind::Directory, dir.kind);
    assert_eq!(0, dir.size);
    let file = first.iter().find(|e| e.name == "f").expect("file entry");
    assert_eq!(EntryKind::File, file.kind);
    assert_eq!(3, file.size);
}

#[test]
fn stat_snapshot() {
    let mut fs = fresh(64);
    let root = fs.info().data_start;
    let st = fs.stat().expect("stat");
    assert_eq!(root, st.bid);
    assert_eq!(root, st.parent);
    assert_eq!(0, st.items);
    assert_eq!(1, st.blocks);
    assert_eq!(127, st.capacity);

    fs.mkdir("sub").expect("mkdir");
    fs.cd("sub").expect("cd");
    let st = fs.stat().expect("stat");
    assert_eq!(root, st.parent);
    assert_eq!(0, st.items);
    assert!(st.entries.is_empty());
}

#[test]
fn empty_file() {
    let mut fs = fresh(64);
    put_file(&mut fs, "empty", b"");
    assert!(read_all(&mut fs, "empty").is_empty());

    let fd = fs.open("empty").expect("open");
    assert_eq!(0, fs.write(fd, b"").expect("empty write"));
    assert!(fs.read(fd, 100).expect("read").is_empty());
    fs.close(fd).expect("close");

    let entry = fs.ls().expect("ls").next().expect("entry");
    assert_eq!(0, entry.size);
    // 空文件不占数据块
    assert_eq!(64 - 3 - 1, fs.info().free_blocks);
    fs.verify().expect("consistent");
}
