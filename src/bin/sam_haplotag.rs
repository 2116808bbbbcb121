// SPDX-License-Identifier: MIT
// Copyright (c) 2021 Ed Harry, Wellcome Sanger Institute, Genome Research Limited
// See LICENSE for the full notice.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use haplotag_rs::buffer_pool::{BUFFER_SIZE, MIN_BUFFER_SIZE};
use haplotag_rs::errors::{exit_with_error, ErrorKind, HaplotagError};
use haplotag_rs::logging::init_logger;
use haplotag_rs::sam_haplotag::{self, Options, PROGRAM_NAME};

/// Reads SAM on stdin and writes it to stdout with RX, QX and BX haplotag tags
/// built from the BC and QT tags of every first-of-pair read.
///
/// Three logs are written: clear barcodes, unclear barcodes, and the names of
/// reads missing their BC/QT tags.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Optional prefix for the log file names
    #[clap(value_parser)]
    prefix: Option<String>,

    /// Segment table used to decode the barcode segments
    #[clap(short, long, value_parser)]
    segments: PathBuf,

    /// Directory the log files are written to
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
        segments: args.segments,
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
    };

    let (summary, _) = sam_haplotag::run(&options, std::io::stdin(), std::io::stdout())?;

    log::info!(
        "{} reads processed, {} first-of-pair, {} tagged",
        summary.reads.total_reads,
        summary.reads.first_of_pair,
        summary.reads.tagged
    );
    log::info!(
        "{} clear and {} unclear barcodes",
        summary.clear_barcodes,
        summary.unclear_barcodes
    );
    for path in [&summary.clear_log, &summary.unclear_log, &summary.missing_log] {
        log::info!("Log written to '{}'", path.display());
    }
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
