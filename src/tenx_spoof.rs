//! 10x spoofer: ranks haplotag barcodes by read count and gives each one a 10x
//! whitelist barcode, most used first, then prepends that barcode to every
//! read carrying the haplotag.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::buffer_pool::{ReadPool, WritePool, BUFFER_SIZE};
use crate::clear_log::read_clear_log;
use crate::codec::{Barcode, BASE16_LEN};
use crate::errors::{HaplotagError, Result};
use crate::fastq_tagger::{BarcodeMapper, FastqCounters, FastqTagger};
use crate::hash_table::{HashTable, BARCODE_SEED};
use crate::logs::{log_path, LogFile};
use crate::wavl_tree::{Direction, WavlTree};
use crate::whitelist::Whitelist;

pub const PROGRAM_NAME: &str = "10xSpoof";
pub const LOG_NAME: &str = "10xSpoof_HaploTag_to_10x";
const LOG_HEADER: &str = "HaploTag\t10x";

#[derive(Clone, Debug)]
pub struct Options {
    pub prefix: Option<String>,
    pub out_dir: PathBuf,
    pub buffer_size: usize,
    /// Clear-barcode log written by `sam-haplotag`.
    pub clear_log: PathBuf,
    /// 10x whitelist, one 16-base barcode per line.
    pub whitelist: PathBuf,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            prefix: None,
            out_dir: PathBuf::from("."),
            buffer_size: BUFFER_SIZE,
            clear_log: PathBuf::new(),
            whitelist: PathBuf::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Summary {
    pub reads: FastqCounters,
    /// Barcodes listed in the clear-barcode log.
    pub clear_barcodes: u64,
    /// Barcodes given a whitelist entry.
    pub assigned: usize,
    /// Barcodes left without one, because the whitelist ran out or they
    /// have no reads.
    pub discarded: u64,
    pub log_path: PathBuf,
}

/// Haplotag barcode to whitelist index (1-based), in rank order.
pub struct Assignment {
    whitelist: Whitelist,
    indices: HashTable<u32, u32>,
}

impl Assignment {
    pub fn index_of(&self, barcode: Barcode) -> Option<u32> {
        self.indices.get(&barcode.raw()).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

impl BarcodeMapper for Assignment {
    fn map(&mut self, barcode: Barcode) -> Result<Option<[u8; BASE16_LEN]>> {
        Ok(self
            .index_of(barcode)
            .and_then(|index| self.whitelist.sequence(index)))
    }
}

/// Ranks the barcodes of a clear log by read count (highest first) and
/// assigns whitelist entries in that order, writing each assignment to `log`.
/// Returns the assignment and the number of barcodes in the clear log.
pub fn assign_barcodes<R>(
    clear_log: R,
    whitelist: Whitelist,
    buffer_size: usize,
    log: &mut LogFile,
) -> Result<(Assignment, u64)>
where
    R: Read + Send + 'static,
{
    let mut tree = WavlTree::new();
    let rows = read_clear_log(clear_log, buffer_size, |row| {
        tree.insert(row.reads(), row.barcode.raw())
    })?;
    log::info!("Barcode count: {}", rows);

    let capacity = whitelist.len() as u64;
    if rows > capacity {
        log::warn!(
            "Barcode count > 10x count, {} barcodes will be discarded!",
            rows - capacity
        );
    }

    let ranked = tree.freeze(Direction::Descending);
    let mut indices: HashTable<u32, u32> =
        HashTable::with_expected_entries(rows.min(capacity) as usize, BARCODE_SEED);
    // barcodes with no reads get no whitelist entry
    let used = ranked
        .iter()
        .take_while(|node| node.key() > 0)
        .flat_map(|node| node.values());
    for ((raw, code), index) in used.zip(whitelist.sequences()).zip(1u32..) {
        *indices.insert_or_fetch(raw) = index;
        log.write_bytes(&Barcode::from_raw(raw).to_text())?;
        log.write_bytes(b"\t")?;
        log.write_line(&code)?;
    }

    Ok((Assignment { whitelist, indices }, rows))
}

/// Loads the whitelist and clear log named in `options`, then streams FASTQ
/// from `input` to `output`.
pub fn run<R, W>(options: &Options, input: R, output: W) -> Result<(Summary, W)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let path = log_path(&options.out_dir, options.prefix.as_deref(), LOG_NAME);
    let mut log = LogFile::create(path, LOG_HEADER)?;

    log::info!("Clear Barcode log: {}", options.clear_log.display());
    let clear_log = File::open(&options.clear_log).map_err(|source| HaplotagError::Open {
        path: options.clear_log.clone(),
        source,
    })?;
    let whitelist = Whitelist::from_path(&options.whitelist)?;

    let (assignment, clear_barcodes) =
        assign_barcodes(clear_log, whitelist, options.buffer_size, &mut log)?;
    let log_path = log.finish()?;
    let assigned = assignment.len();

    let mut tagger = FastqTagger::new(assignment);
    let mut reads = ReadPool::from_reader(input, options.buffer_size)?;
    let mut writes = WritePool::from_writer(output, options.buffer_size)?;

    reads.for_each_chunk(|chunk| tagger.process(chunk, &mut writes))?;
    reads.finish()?;
    let output = writes.finish()?.into_inner();

    let (_, counters) = tagger.finish()?;
    if counters.missing_tags > 0 {
        log::warn!(
            "{} of {} reads had no valid BX tag",
            counters.missing_tags,
            counters.total_reads
        );
    }
    if counters.unmapped > 0 {
        log::warn!(
            "{} reads carried a barcode with no 10x assignment",
            counters.unmapped
        );
    }

    let summary = Summary {
        reads: counters,
        clear_barcodes,
        assigned,
        discarded: clear_barcodes.saturating_sub(assigned as u64),
        log_path,
    };
    Ok((summary, output))
}
