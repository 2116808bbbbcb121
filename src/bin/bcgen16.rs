// SPDX-License-Identifier: MIT
// Copyright (c) 2021 Ed Harry, Wellcome Sanger Institute, Genome Research Limited
// See LICENSE for the full notice.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use haplotag_rs::bcgen16::{self, Options, PROGRAM_NAME};
use haplotag_rs::buffer_pool::{BUFFER_SIZE, MIN_BUFFER_SIZE};
use haplotag_rs::errors::{exit_with_error, ErrorKind, HaplotagError};
use haplotag_rs::logging::init_logger;

/// Reads FASTQ on stdin and writes it to stdout with the 16-base form of each
/// read's BX haplotag barcode, plus 7 joining bases, prepended to the sequence.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Optional prefix for the log file name ('<prefix>_HaploTag_to_16BaseBCs')
    #[clap(value_parser)]
    prefix: Option<String>,

    /// Directory the log file is written to
    #[clap(long, default_value = ".", value_parser)]
    out_dir: PathBuf,

    #[clap(long, hide = true, default_value_t = BUFFER_SIZE, value_parser)]
    buffer_size: usize,
}

fn run(args: Args) -> Result<()> {
    let options = Options {
        prefix: args.prefix,
        out_dir: args.out_dir,
        buffer_size: args.buffer_size,
    };
    let (summary, _) = bcgen16::run(&options, std::io::stdin(), std::io::stdout())?;

    log::info!(
        "{} reads processed, {} barcodes added, {} distinct barcodes",
        summary.reads.total_reads,
        summary.reads.bc_added,
        summary.distinct_barcodes
    );
    log::info!("Log written to '{}'", summary.log_path.display());
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logger(PROGRAM_NAME);

    if args.buffer_size < MIN_BUFFER_SIZE {
        exit_with_error(
            ErrorKind::Usage,
            &format!("--buffer-size must be at least {} bytes", MIN_BUFFER_SIZE),
        );
    }

    if let Err(err) = run(args) {
        let kind = err
            .downcast_ref::<HaplotagError>()
            .map_or(ErrorKind::Io, ErrorKind::from);
        exit_with_error(kind, &format!("{:#}", err));
    }
}
