mod cli;

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::str::SplitWhitespace;

use chain_fs::{
    BLOCK_SIZE, ChainFileSystem, EntryKind, FsError, Result, SeekFrom,
};
use clap::Parser;
use log::info;
use typed_bytesize::ByteSizeSi;

use self::cli::Cli;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut fs = match cli.format {
        Some(blocks) => {
            let fs = ChainFileSystem::format(blocks)?;
            info!("formatted {blocks} blocks for {}", cli.img.display());
            fs
        }
        None => ChainFileSystem::load(&cli.img)?,
    };

    repl(&mut fs, &cli.img)?;
    fs.save(&cli.img)
}

enum Flow {
    Continue,
    Quit,
}

/// Command loop; the image is saved after it returns.
fn repl(fs: &mut ChainFileSystem, img: &Path) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}> ", fs.cwd_path()?);
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF behaves like `exit`
            return Ok(());
        }
        match run(fs, img, line.trim_end()) {
            Ok(Flow::Quit) => return Ok(()),
            Ok(Flow::Continue) => {}
            Err(e) => println!("error: {e}"),
        }
    }
}

fn run(fs: &mut ChainFileSystem, img: &Path, line: &str) -> Result<Flow> {
    let mut args = line.split_whitespace();
    let Some(cmd) = args.next() else {
        return Ok(Flow::Continue);
    };

    match cmd {
        "ls" => {
            for entry in fs.ls()? {
                match entry.kind {
                    EntryKind::Directory => println!("{:<9}  <dir>", entry.name),
                    EntryKind::File => {
                        println!("{:<9}  {}", entry.name, ByteSizeSi(entry.size.into()))
                    }
                }
            }
        }
        "stat" => {
            let stat = fs.stat()?;
            println!(
                "block {}  parent {}  items {}  blocks {}  capacity {}",
                stat.bid, stat.parent, stat.items, stat.blocks, stat.capacity
            );
            for e in &stat.entries {
                let kind = match e.kind {
                    EntryKind::Directory => "dir",
                    EntryKind::File => "file",
                };
                println!(
                    "{:<9}  {:<4}  {:>10}  {}  {}",
                    e.name,
                    kind,
                    ByteSizeSi(e.size.into()).to_string(),
                    fmt_time(e.created),
                    fmt_time(e.modified),
                );
            }
        }
        "info" => {
            let info = fs.info();
            println!(
                "total  {} ({} blocks)",
                ByteSizeSi(info.total_size.into()),
                info.total_blocks
            );
            println!(
                "free   {} ({} blocks)",
                ByteSizeSi(u64::from(info.free_blocks) * BLOCK_SIZE as u64),
                info.free_blocks
            );
            println!(
                "fat    {} blocks x2, data from block {}",
                info.fat_blocks, info.data_start
            );
        }
        "pwd" => println!("{}", fs.cwd_path()?),
        "cd" => {
            let Some(path) = args.next() else {
                return usage("cd PATH");
            };
            fs.cd(path)?;
        }
        "mkdir" => {
            let Some(path) = args.next() else {
                return usage("mkdir PATH");
            };
            fs.mkdir(path)?;
        }
        "rmdir" => {
            let Some(path) = args.next() else {
                return usage("rmdir PATH");
            };
            fs.rmdir(path)?;
        }
        "create" => {
            let Some(path) = args.next() else {
                return usage("create PATH");
            };
            println!("fd {}", fs.create(path)?);
        }
        "open" => {
            let Some(path) = args.next() else {
                return usage("open PATH");
            };
            println!("fd {}", fs.open(path)?);
        }
        "close" => {
            let Some(fd) = num(&mut args) else {
                return usage("close FD");
            };
            fs.close(fd)?;
        }
        "seek" => {
            let (Some(fd), Some(off)) = (num::<usize>(&mut args), num::<i64>(&mut args)) else {
                return usage("seek FD OFFSET [set|cur|end]");
            };
            let pos = match args.next().unwrap_or("set") {
                "set" => SeekFrom::Start(off.try_into().map_err(|_| FsError::InvalidOffset)?),
                "cur" => SeekFrom::Current(off),
                "end" => SeekFrom::End(off),
                _ => return usage("seek FD OFFSET [set|cur|end]"),
            };
            println!("{}", fs.seek(fd, pos)?);
        }
        "read" => {
            let (Some(fd), Some(n)) = (num(&mut args), num(&mut args)) else {
                return usage("read FD BYTES");
            };
            let data = fs.read(fd, n)?;
            println!("{}", String::from_utf8_lossy(&data));
            println!("({} bytes)", data.len());
        }
        "write" => {
            let Some(fd) = num(&mut args) else {
                return usage("write FD TEXT");
            };
            // Everything after the fd token is the payload, whitespace included.
            let payload = line.splitn(3, char::is_whitespace).nth(2).unwrap_or("");
            println!("{} bytes", fs.write(fd, payload.as_bytes())?);
        }
        "rm" => {
            let Some(path) = args.next() else {
                return usage("rm PATH");
            };
            fs.rm(path)?;
        }
        "rename" => {
            let (Some(from), Some(to)) = (args.next(), args.next()) else {
                return usage("rename FROM TO");
            };
            fs.rename(from, to)?;
        }
        "fsck" => {
            fs.verify()?;
            println!("ok");
        }
        "save" => fs.save(img)?,
        "help" => help(),
        "exit" | "quit" => return Ok(Flow::Quit),
        _ => println!("unknown command; try `help`"),
    }

    Ok(Flow::Continue)
}

fn num<T: std::str::FromStr>(args: &mut SplitWhitespace<'_>) -> Option<T> {
    args.next().and_then(|s| s.parse().ok())
}

fn usage(text: &str) -> Result<Flow> {
    println!("usage: {text}");
    Ok(Flow::Continue)
}

fn fmt_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".into())
}

fn help() {
    println!(
        "\
commands:
  ls                            list the current directory
  stat                          current directory details
  info                          volume usage
  pwd                           print the current directory
  cd PATH                       change the current directory
  mkdir PATH                    create a directory
  rmdir PATH                    remove an empty directory
  create PATH                   create a file and open it, prints the fd
  open PATH                     open an existing file, prints the fd
  close FD                      close a file
  seek FD OFFSET [set|cur|end]  move the cursor, prints the new offset
  read FD BYTES                 read at the cursor
  write FD TEXT                 write at the cursor
  rm PATH                       delete a file
  rename FROM TO                rename, or move a file between directories
  fsck                          consistency check
  save                          write the image out now
  exit                          save and quit"
    );
}
