//! Streaming SAM rewriter that turns `BC`/`QT` tags into haplotag `RX`, `QX`
//! and `BX` tags.
//!
//! The header passes through untouched apart from one new `@PG` line, written
//! just before the first alignment. For every first-of-pair alignment (flag
//! bit 64) carrying both a 27-byte `BC:Z:` and a 27-byte `QT:Z:` tag, the four
//! barcode segments are decoded, the three new tags are appended to the line
//! and the decoded fields are pushed to the barcode sink. First-of-pair reads
//! missing either tag are reported and their names logged.

use crate::buffer_pool::{BarcodeSink, ByteSink};
use crate::codec::Barcode;
use crate::decoder::{decode_fields, BarcodeDecoder, BC_LEN, HALF_LEN, INDEX_MASK};
use crate::errors::Result;
use crate::hash_table::{HashTable, STRING_SEED};
use crate::logs::LogFile;
use crate::progress::Progress;
use crate::tag_scanner::{is_field_end, TagScanner};

/// Flag bit marking the first read of a pair.
pub const FIRST_OF_PAIR: u32 = 64;

const MAX_NAME_LEN: usize = 63;
const PG_ID_BUCKETS: u32 = 131;
const BC: usize = 0;
const QT: usize = 1;

/// Destination for the names of reads that lack `BC`/`QT` tags.
pub trait MissingTagSink {
    fn missing(&mut self, name: &[u8]) -> Result<()>;
}

impl MissingTagSink for LogFile {
    fn missing(&mut self, name: &[u8]) -> Result<()> {
        self.write_line(name)
    }
}

impl MissingTagSink for Vec<Vec<u8>> {
    fn missing(&mut self, name: &[u8]) -> Result<()> {
        self.push(name.to_vec());
        Ok(())
    }
}

/// Contents of the `@PG` line this program adds to the header.
#[derive(Clone, Debug)]
pub struct ProgramRecord {
    pub name: String,
    pub version: String,
    pub command_line: String,
}

impl ProgramRecord {
    /// Renders the line, choosing the first ID not already taken.
    fn render(&self, taken: &HashTable<Vec<u8>, ()>, previous: Option<&[u8]>) -> Vec<u8> {
        let mut id = self.name.clone();
        let mut n = 0;
        while taken.contains(id.as_bytes()) {
            n += 1;
            id = format!("{}.{}", self.name, n);
        }

        let mut line = format!("@PG\tID:{}\tPN:{}", id, self.name).into_bytes();
        if let Some(previous) = previous {
            line.extend_from_slice(b"\tPP:");
            line.extend_from_slice(previous);
        }
        line.extend_from_slice(
            format!("\tVN:{}\tCL:{}\n", self.version, self.command_line).as_bytes(),
        );
        line
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamCounters {
    pub total_reads: u64,
    pub first_of_pair: u64,
    pub tagged: u64,
    pub missing_tags: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Column {
    Name,
    Flag,
    Rest,
}

pub struct SamTagger<D, B, L> {
    decoder: D,
    barcodes: B,
    missing_log: L,
    program: ProgramRecord,

    started: bool,
    header_mode: bool,
    at_line_start: bool,
    header_line: Vec<u8>,
    pg_ids: HashTable<Vec<u8>, ()>,
    last_pg_id: Option<Vec<u8>>,

    column: Column,
    name: Vec<u8>,
    flags: u32,
    tags: [TagScanner<BC_LEN>; 2],
    rc: [u8; HALF_LEN],

    counters: SamCounters,
    progress: Progress,
}

impl<D, B, L> SamTagger<D, B, L>
where
    D: BarcodeDecoder,
    B: BarcodeSink,
    L: MissingTagSink,
{
    pub fn new(decoder: D, barcodes: B, missing_log: L, program: ProgramRecord) -> Self {
        SamTagger {
            decoder,
            barcodes,
            missing_log,
            program,
            started: false,
            header_mode: true,
            at_line_start: true,
            header_line: Vec::new(),
            pg_ids: HashTable::with_buckets(PG_ID_BUCKETS, STRING_SEED),
            last_pg_id: None,
            column: Column::Name,
            name: Vec::with_capacity(MAX_NAME_LEN),
            flags: 0,
            tags: [
                TagScanner::new(b"BC:Z:", is_field_end),
                TagScanner::new(b"QT:Z:", is_field_end),
            ],
            rc: [0u8; HALF_LEN],
            counters: SamCounters::default(),
            progress: Progress::new("reads processed"),
        }
    }

    pub fn counters(&self) -> &SamCounters {
        &self.counters
    }

    pub fn process<S: ByteSink>(&mut self, input: &[u8], out: &mut S) -> Result<()> {
        for &byte in input {
            self.feed(byte, out)?;
        }
        Ok(())
    }

    pub fn feed<S: ByteSink>(&mut self, byte: u8, out: &mut S) -> Result<()> {
        if self.header_mode && self.at_line_start && byte != b'@' {
            self.header_mode = false;
            self.write_program_record(out)?;
        }
        self.at_line_start = byte == b'\n';
        self.started = true;

        if self.header_mode {
            if byte == b'\n' {
                self.end_header_line();
            } else {
                self.header_line.push(byte);
            }
            return out.put(byte);
        }

        for scanner in self.tags.iter_mut() {
            scanner.feed(byte);
        }

        if byte == b'\n' {
            self.end_record(out)?;
            return out.put(byte);
        }

        match self.column {
            Column::Name if byte == b'\t' => self.column = Column::Flag,
            Column::Name => {
                if self.name.len() < MAX_NAME_LEN {
                    self.name.push(byte);
                }
            }
            Column::Flag if byte == b'\t' => self.column = Column::Rest,
            Column::Flag => {
                if byte.is_ascii_digit() {
                    self.flags = self
                        .flags
                        .saturating_mul(10)
                        .saturating_add(u32::from(byte - b'0'));
                }
            }
            Column::Rest => {}
        }
        out.put(byte)
    }

    fn end_header_line(&mut self) {
        if let Some(fields) = self.header_line.strip_prefix(b"@PG\t") {
            let id = fields
                .split(|&b| b == b'\t')
                .find_map(|field| field.strip_prefix(b"ID:"));
            if let Some(id) = id {
                self.pg_ids.insert_or_fetch(id.to_vec());
                self.last_pg_id = Some(id.to_vec());
            }
        }
        self.header_line.clear();
    }

    fn write_program_record<S: ByteSink>(&mut self, out: &mut S) -> Result<()> {
        let line = self.program.render(&self.pg_ids, self.last_pg_id.as_deref());
        out.reserve(line.len())?;
        out.put_slice(&line)
    }

    fn end_record<S: ByteSink>(&mut self, out: &mut S) -> Result<()> {
        if self.flags & FIRST_OF_PAIR != 0 {
            self.counters.first_of_pair += 1;
            let bc = self.tags[BC].captured().copied();
            let qt = self.tags[QT].captured().copied();
            match (bc, qt) {
                (Some(bc), Some(qt)) => self.append_tags(&bc, &qt, out)?,
                (bc, _) => {
                    let missing = match (bc, qt) {
                        (None, None) => "BC/QT tags",
                        (None, _) => "BC tag",
                        _ => "QT tag",
                    };
                    log::warn!(
                        "Read {} has no {}",
                        String::from_utf8_lossy(&self.name),
                        missing
                    );
                    self.counters.missing_tags += 1;
                    self.missing_log.missing(&self.name)?;
                }
            }
        }

        self.counters.total_reads += 1;
        self.progress.report(&[self.counters.total_reads]);

        self.column = Column::Name;
        self.name.clear();
        self.flags = 0;
        for scanner in self.tags.iter_mut() {
            scanner.reset();
        }
        Ok(())
    }

    fn append_tags<S: ByteSink>(
        &mut self,
        bc: &[u8; BC_LEN],
        qt: &[u8; BC_LEN],
        out: &mut S,
    ) -> Result<()> {
        let [a, c, b, d] = decode_fields(&self.decoder, bc, &mut self.rc);
        let decoded = Barcode::from_fields(a, c, b, d);
        let text = Barcode::from_fields(
            a & INDEX_MASK,
            c & INDEX_MASK,
            b & INDEX_MASK,
            d & INDEX_MASK,
        )
        .to_text();

        out.reserve(2 * (6 + BC_LEN) + 6 + text.len())?;

        out.put_slice(b"\tRX:Z:")?;
        out.put_slice(&bc[..HALF_LEN])?;
        out.put(b'+')?;
        out.put_slice(&self.rc)?;

        out.put_slice(b"\tQX:Z:")?;
        out.put_slice(&qt[..HALF_LEN])?;
        out.put(b'+')?;
        for &q in qt[HALF_LEN + 1..].iter().rev() {
            out.put(q)?;
        }

        out.put_slice(b"\tBX:Z:")?;
        out.put_slice(&text)?;

        self.barcodes.push_barcode(decoded.raw())?;
        self.counters.tagged += 1;
        Ok(())
    }

    /// Completes the stream. A header with no alignments after it still gets
    /// its `@PG` line, and a final record without a newline is still tagged
    /// and counted. No newline is added after it.
    pub fn finish<S: ByteSink>(mut self, out: &mut S) -> Result<(D, B, L, SamCounters)> {
        if self.header_mode && self.started {
            if !self.at_line_start {
                out.put(b'\n')?;
                self.end_header_line();
            }
            self.write_program_record(out)?;
        } else if !self.header_mode && !self.at_line_start {
            for scanner in self.tags.iter_mut() {
                scanner.close();
            }
            self.end_record(out)?;
        }
        Ok((self.decoder, self.barcodes, self.missing_log, self.counters))
    }
}
