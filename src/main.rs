//! Binary entry point for the `vma-extract` command-line tool.
//!
//! Handles argument parsing, output-directory creation/overwrite policy, and
//! mapping the core library's result onto the exit-code contract: 0 success,
//! 1 usage error, 2 checksum mismatch, 3 format/parse error, 4 I/O error.

use std::path::Path;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

use vma_extract::cli::args::Cli;
use vma_extract::cli::constants::set_display_level;
use vma_extract::displaylevel;
use vma_extract::extractor::{extract, Options};
use vma_extract::progress::Progress;

fn human_rate(p: &Progress) -> String {
    let mb_per_sec = p.rate_bytes_per_sec() / (1024.0 * 1024.0);
    format!("{:.1} MiB/s", mb_per_sec)
}

/// Creates `output_dir` if absent and enforces the overwrite policy that is
/// explicitly out of the core library's scope: a pre-existing non-empty
/// directory is rejected unless `force` is set.
fn prepare_output_dir(output_dir: &Path, force: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir).context("cannot create output directory")?;

    let non_empty = std::fs::read_dir(output_dir)
        .context("cannot inspect output directory")?
        .next()
        .is_some();
    if non_empty && !force {
        anyhow::bail!("output directory is not empty (pass --force to proceed anyway)");
    }
    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Clap's own exit code for a malformed invocation is 2, which
            // collides with this crate's "checksum mismatch" exit code.
            // Help and version output are not usage errors, so they still
            // exit 0.
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => std::process::exit(0),
                _ => std::process::exit(1),
            }
        }
    };
    set_display_level(2 + cli.verbose as u32);

    if let Err(e) = prepare_output_dir(&cli.output_dir, cli.force) {
        eprintln!("vma-extract: {e:#}");
        std::process::exit(1);
    }

    let options = Options {
        skip_hash: cli.skip_hash,
        worker_count: cli.workers,
        progress_sink: Some(Box::new(|p: &Progress| {
            displaylevel!(
                2,
                "\r{:>10} read, {:>10} written, {}",
                p.bytes_read,
                p.bytes_written,
                human_rate(p)
            );
        })),
    };

    match extract(&cli.source, &cli.output_dir, options) {
        Ok(summary) => {
            displaylevel!(2, "\n");
            displaylevel!(
                3,
                "extracted {} device(s), {} config file(s)\n",
                summary.devices.len(),
                summary.configs.len()
            );
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("vma-extract: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
