// SPDX-License-Identifier: MIT
// Copyright (c) 2021 Ed Harry, Wellcome Sanger Institute, Genome Research Limited
// See LICENSE for the full notice.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use haplotag_rs::buffer_pool::{BUFFER_SIZE, MIN_BUFFER_SIZE};
use haplotag_rs::errors::{exit_with_error, ErrorKind, HaplotagError};
use haplotag_rs::logging::init_logger;
use haplotag_rs::tenx_spoof::{self, Options, PROGRAM_NAME};

/// Reads FASTQ on stdin and writes it to stdout with a 10x whitelist barcode,
/// plus 7 joining bases, prepended to each read that carries a BX haplotag.
///
/// Haplotag barcodes are given whitelist entries in order of read count, using
/// the clear barcode log written by sam-haplotag.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Clear barcode log ('SamHaplotag_Clear_BC')
    #[clap(value_parser)]
    clear_log: PathBuf,

    /// Optional prefix for the log file name ('<prefix>_10xSpoof_HaploTag_to_10x')
    #[clap(value_parser)]
    prefix: Option<String>,

    /// 10x barcode whitelist, one 16-base barcode per line
    #[clap(short, long, value_parser)]
    whitelist: PathBuf,

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
        clear_log: args.clear_log,
        whitelist: args.whitelist,
    };

    let (summary, _) = tenx_spoof::run(&options, std::io::stdin(), std::io::stdout())?;

    log::info!(
        "{} of {} clear barcodes assigned a 10x barcode",
        summary.assigned,
        summary.clear_barcodes
    );
    log::info!(
        "{} reads processed, {} barcodes added",
        summary.reads.total_reads,
        summary.reads.bc_added
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
