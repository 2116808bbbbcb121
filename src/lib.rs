// SPDX-License-Identifier: MIT
// Copyright (c) 2021 Ed Harry, Wellcome Sanger Institute, Genome Research Limited
// See LICENSE for the full notice.

//! Streaming filters that extract, correct, rank and re-encode haplotag
//! barcodes in FASTQ and SAM read streams.

pub mod arena;
pub mod buffer_pool;
pub mod clear_log;
pub mod codec;
pub mod decoder;
pub mod errors;
pub mod fastq_tagger;
pub mod hash_table;
pub mod logging;
pub mod logs;
pub mod progress;
pub mod sam_tagger;
pub mod tag_scanner;
pub mod utilities;
pub mod wavl_tree;
pub mod whitelist;

pub mod bcgen16;
pub mod sam_haplotag;
pub mod tenx_spoof;
