//! Command-line argument parsing for the `vma-extract` binary.
//!
//! Uses `clap`'s derive API to declare the CLI surface directly on a
//! `Parser` struct rather than hand-rolling a parse loop.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "vma-extract", about = "Extracts a Proxmox VE VMA backup archive into configs and raw disk images")]
pub struct Cli {
    /// Path to the archive file to extract.
    pub source: PathBuf,

    /// Directory to write configuration files and `<device>.raw` images into.
    pub output_dir: PathBuf,

    /// Skip MD5 verification of the header and every extent.
    #[arg(long)]
    pub skip_hash: bool,

    /// Number of write-pool worker threads. Defaults to available parallelism.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Create `output_dir` if needed and proceed even if it already contains files.
    #[arg(long)]
    pub force: bool,

    /// Increase diagnostic output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
