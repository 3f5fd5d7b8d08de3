use clap::Parser;
use std::path::PathBuf;

/// Interactive shell over a chain-fs disk image
#[derive(Parser)]
pub struct Cli {
    /// Disk image file
    pub img: PathBuf,

    /// Format a fresh image with this many blocks instead of loading one
    #[arg(long, value_name = "BLOCKS")]
    pub format: Option<usize>,
}
