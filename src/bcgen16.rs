//! 16-base barcode generator: prepends the raw 16-base form of each read's
//! haplotag barcode and logs every distinct barcode with its code.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::buffer_pool::{
    barcodes, BarcodeSink, Buffer, BufferTask, ReadPool, SinkPool, WritePool, BUFFER_SIZE,
};
use crate::codec::{Barcode, BASE16_LEN};
use crate::errors::Result;
use crate::fastq_tagger::{BarcodeMapper, FastqCounters, FastqTagger};
use crate::hash_table::{HashTable, BARCODE_SEED, BARCODE_TABLE_BUCKETS};
use crate::logs::{log_path, LogFile};
use crate::wavl_tree::{Direction, WavlTree};

pub const PROGRAM_NAME: &str = "16BaseBCGen";
pub const LOG_NAME: &str = "HaploTag_to_16BaseBCs";
const LOG_HEADER: &str = "HaploTag\t16 Base BC";

#[derive(Clone, Debug)]
pub struct Options {
    /// Prefix for the log file name.
    pub prefix: Option<String>,
    pub out_dir: PathBuf,
    pub buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            prefix: None,
            out_dir: PathBuf::from("."),
            buffer_size: BUFFER_SIZE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Summary {
    pub reads: FastqCounters,
    pub distinct_barcodes: usize,
    pub log_path: PathBuf,
}

/// Aggregation task: keeps the first sighting of every barcode, ordered by
/// packed value.
struct DistinctBarcodes {
    seen: HashTable<u32, ()>,
    tree: WavlTree,
}

impl DistinctBarcodes {
    fn new() -> Self {
        DistinctBarcodes {
            seen: HashTable::with_buckets(BARCODE_TABLE_BUCKETS, BARCODE_SEED),
            tree: WavlTree::new(),
        }
    }
}

impl BufferTask for DistinctBarcodes {
    fn run(&mut self, buffer: &mut Buffer) -> Result<()> {
        for raw in barcodes(buffer) {
            if !self.seen.contains(&raw) {
                self.seen.insert_or_fetch(raw);
                self.tree.insert(raw, raw);
            }
        }
        buffer.clear();
        Ok(())
    }
}

/// Sends every barcode to the aggregation pool and writes its raw 16-base form.
struct Raw16Mapper<S> {
    barcodes: S,
}

impl<S: BarcodeSink> BarcodeMapper for Raw16Mapper<S> {
    fn map(&mut self, barcode: Barcode) -> Result<Option<[u8; BASE16_LEN]>> {
        self.barcodes.push_barcode(barcode.raw())?;
        Ok(Some(barcode.to_16base()))
    }
}

/// Streams FASTQ from `input` to `output` and writes the barcode log.
/// Returns the run summary and the output sink.
pub fn run<R, W>(options: &Options, input: R, output: W) -> Result<(Summary, W)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let path = log_path(&options.out_dir, options.prefix.as_deref(), LOG_NAME);
    let mut log = LogFile::create(path, LOG_HEADER)?;

    let aggregator = SinkPool::new("transfer", DistinctBarcodes::new(), options.buffer_size)?;
    let mut tagger = FastqTagger::new(Raw16Mapper {
        barcodes: aggregator,
    });
    let mut reads = ReadPool::from_reader(input, options.buffer_size)?;
    let mut writes = WritePool::from_writer(output, options.buffer_size)?;

    reads.for_each_chunk(|chunk| tagger.process(chunk, &mut writes))?;
    reads.finish()?;
    let output = writes.finish()?.into_inner();

    let (mapper, counters) = tagger.finish()?;
    let distinct = mapper.barcodes.finish()?;
    let tree = distinct.tree.freeze(Direction::Ascending);

    for raw in tree.values() {
        let barcode = Barcode::from_raw(raw);
        log.write_bytes(&barcode.to_text())?;
        log.write_bytes(b"\t")?;
        log.write_line(&barcode.to_16base())?;
    }
    let log_path = log.finish()?;

    if counters.missing_tags > 0 {
        log::warn!(
            "{} of {} reads had no valid BX tag",
            counters.missing_tags,
            counters.total_reads
        );
    }

    let summary = Summary {
        reads: counters,
        distinct_barcodes: tree.len(),
        log_path,
    };
    Ok((summary, output))
}
