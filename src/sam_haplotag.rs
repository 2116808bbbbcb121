//! SAM haplotagger: decodes `BC`/`QT` tags into `RX`/`QX`/`BX` tags and logs how
//! often each barcode was seen, split into clear and unclear barcodes.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::buffer_pool::{
    barcodes, Buffer, BufferTask, ReadPool, SinkPool, WritePool, BUFFER_SIZE,
};
use crate::codec::Barcode;
use crate::decoder::{BarcodeDecoder, SegmentDecoder, CORRECTED, INDEX_MASK};
use crate::errors::Result;
use crate::hash_table::{HashTable, BARCODE_SEED, BARCODE_TABLE_BUCKETS};
use crate::logs::{log_path, LogFile};
use crate::sam_tagger::{ProgramRecord, SamCounters, SamTagger};
use crate::wavl_tree::{Direction, WavlTree};

pub const PROGRAM_NAME: &str = "SamHaplotag";
pub const CLEAR_LOG_NAME: &str = "SamHaplotag_Clear_BC";
pub const UNCLEAR_LOG_NAME: &str = "SamHaplotag_UnClear_BC";
pub const MISSING_LOG_NAME: &str = "SamHaplotag_Missing_BC_QT_tags";

const CLEAR_HEADER: &str = "Barcode\tCorrect Reads\tCorrected Reads";
const UNCLEAR_HEADER: &str = "Barcode\tReads";
const MISSING_HEADER: &str = "Read";

/// Clears the correction flag of every field.
const KEY_MASK: u32 = u32::from_be_bytes([INDEX_MASK; 4]);

#[derive(Clone, Debug)]
pub struct Options {
    pub prefix: Option<String>,
    pub out_dir: PathBuf,
    pub buffer_size: usize,
    /// Segment table for the barcode decoder.
    pub segments: PathBuf,
    /// Recorded in the `CL` field of the added `@PG` line.
    pub command_line: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            prefix: None,
            out_dir: PathBuf::from("."),
            buffer_size: BUFFER_SIZE,
            segments: PathBuf::new(),
            command_line: "sam-haplotag".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BarcodeCounts {
    pub correct: u32,
    pub corrected: u32,
    pub unclear: u32,
}

impl BarcodeCounts {
    fn is_new(&self) -> bool {
        self.correct == 0 && self.corrected == 0 && self.unclear == 0
    }

    pub fn reads(&self) -> u32 {
        self.correct
            .saturating_add(self.corrected)
            .saturating_add(self.unclear)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    Correct,
    Corrected,
    Unclear,
}

/// Classifies decoded fields: any unresolved field makes the barcode unclear,
/// otherwise any corrected field makes it corrected.
pub fn classify(decoded: Barcode) -> Class {
    let fields = decoded.fields();
    if fields.iter().any(|&f| f & INDEX_MASK == 0) {
        Class::Unclear
    } else if fields.iter().any(|&f| f & CORRECTED != 0) {
        Class::Corrected
    } else {
        Class::Correct
    }
}

/// Aggregation task: per-barcode counters, plus every barcode once in packed
/// order.
struct BarcodeTally {
    counts: HashTable<u32, BarcodeCounts>,
    tree: WavlTree,
}

impl BarcodeTally {
    fn new() -> Self {
        BarcodeTally {
            counts: HashTable::with_buckets(BARCODE_TABLE_BUCKETS, BARCODE_SEED),
            tree: WavlTree::new(),
        }
    }

    fn add(&mut self, raw: u32) {
        let key = raw & KEY_MASK;
        let counts = self.counts.insert_or_fetch(key);
        let first = counts.is_new();
        match classify(Barcode::from_raw(raw)) {
            Class::Correct => counts.correct = counts.correct.saturating_add(1),
            Class::Corrected => counts.corrected = counts.corrected.saturating_add(1),
            Class::Unclear => counts.unclear = counts.unclear.saturating_add(1),
        }
        if first {
            self.tree.insert(key, key);
        }
    }
}

impl BufferTask for BarcodeTally {
    fn run(&mut self, buffer: &mut Buffer) -> Result<()> {
        for raw in barcodes(buffer) {
            self.add(raw);
        }
        buffer.clear();
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Summary {
    pub reads: SamCounters,
    pub clear_barcodes: usize,
    pub unclear_barcodes: usize,
    pub clear_log: PathBuf,
    pub unclear_log: PathBuf,
    pub missing_log: PathBuf,
}

/// Loads the segment table named in `options` and runs [`run_with_decoder`].
pub fn run<R, W>(options: &Options, input: R, output: W) -> Result<(Summary, W)>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let decoder = SegmentDecoder::from_path(&options.segments)?;
    run_with_decoder(options, decoder, input, output)
}

/// Streams SAM from `input` to `output` and writes the three barcode logs.
pub fn run_with_decoder<D, R, W>(
    options: &Options,
    decoder: D,
    input: R,
    output: W,
) -> Result<(Summary, W)>
where
    D: BarcodeDecoder,
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let prefix = options.prefix.as_deref();
    let missing_log = LogFile::create(
        log_path(&options.out_dir, prefix, MISSING_LOG_NAME),
        MISSING_HEADER,
    )?;
    let mut clear_log = LogFile::create(
        log_path(&options.out_dir, prefix, CLEAR_LOG_NAME),
        CLEAR_HEADER,
    )?;
    let mut unclear_log = LogFile::create(
        log_path(&options.out_dir, prefix, UNCLEAR_LOG_NAME),
        UNCLEAR_HEADER,
    )?;

    let program = ProgramRecord {
        name: PROGRAM_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        command_line: options.command_line.clone(),
    };
    let tally = SinkPool::new("transfer", BarcodeTally::new(), options.buffer_size)?;
    let mut tagger = SamTagger::new(decoder, tally, missing_log, program);
    let mut reads = ReadPool::from_reader(input, options.buffer_size)?;
    let mut writes = WritePool::from_writer(output, options.buffer_size)?;

    reads.for_each_chunk(|chunk| tagger.process(chunk, &mut writes))?;
    reads.finish()?;
    let (_, tally, missing_log, counters) = tagger.finish(&mut writes)?;
    let output = writes.finish()?.into_inner();
    let missing_log = missing_log.finish()?;
    let tally = tally.finish()?;

    // rank by read count, ties in barcode order
    let by_barcode = tally.tree.freeze(Direction::Ascending);
    let mut ranking = WavlTree::with_capacity(by_barcode.len(), by_barcode.len());
    for key in by_barcode.values() {
        if let Some(counts) = tally.counts.get(&key) {
            ranking.insert(counts.reads(), key);
        }
    }
    let ranked = ranking.freeze(Direction::Descending);

    let mut summary = Summary::default();
    for key in ranked.values() {
        let Some(counts) = tally.counts.get(&key) else {
            continue;
        };
        let barcode = Barcode::from_raw(key);
        if counts.unclear > 0 {
            writeln!(unclear_log, "{}\t{}", barcode, counts.unclear)?;
            summary.unclear_barcodes += 1;
        } else {
            writeln!(
                clear_log,
                "{}\t{}\t{}",
                barcode, counts.correct, counts.corrected
            )?;
            summary.clear_barcodes += 1;
        }
    }

    if counters.missing_tags > 0 {
        log::warn!(
            "{} first-of-pair reads lacked BC/QT tags",
            counters.missing_tags
        );
    }

    summary.reads = counters;
    summary.clear_log = clear_log.finish()?;
    summary.unclear_log = unclear_log.finish()?;
    summary.missing_log = missing_log;
    Ok((summary, output))
}
