//! Streaming FASTQ rewriter shared by the 16-base generator and the 10x spoofer.
//!
//! Each four-line record whose header carries a valid `BX:Z:A##C##B##D##` tag
//! gets 23 bases prepended to its sequence and 23 qualities prepended to its
//! quality string: the 16-base code the mapper chooses plus seven joining `A`s,
//! and `J`s. Reads without a usable tag get `N`s and `#`s instead, so every
//! read in the output keeps the same layout.

use crate::buffer_pool::ByteSink;
use crate::codec::{Barcode, BASE16_LEN, TEXT_LEN};
use crate::errors::Result;
use crate::progress::Progress;
use crate::tag_scanner::{is_blank, TagScanner};

/// Bytes prepended to the sequence and the quality line of every read.
pub const INSERT_LEN: usize = 23;

const JOIN: [u8; INSERT_LEN - BASE16_LEN] = [b'A'; INSERT_LEN - BASE16_LEN];
const NO_BASES: [u8; INSERT_LEN] = [b'N'; INSERT_LEN];
const GOOD_QUALITY: [u8; INSERT_LEN] = [b'J'; INSERT_LEN];
const NO_QUALITY: [u8; INSERT_LEN] = [b'#'; INSERT_LEN];
const MAX_NAME_LEN: usize = 63;

/// Chooses the sixteen bases written for a barcode.
pub trait BarcodeMapper {
    /// `None` sends the read down the `N`/`#` path.
    fn map(&mut self, barcode: Barcode) -> Result<Option<[u8; BASE16_LEN]>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FastqCounters {
    pub total_reads: u64,
    pub bc_added: u64,
    /// Reads whose header had no valid `BX` tag.
    pub missing_tags: u64,
    /// Reads with a valid tag the mapper had no sequence for.
    pub unmapped: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Line {
    Header,
    Sequence,
    Separator,
    Quality,
}

impl Line {
    fn next(self) -> Line {
        match self {
            Line::Header => Line::Sequence,
            Line::Sequence => Line::Separator,
            Line::Separator => Line::Quality,
            Line::Quality => Line::Header,
        }
    }
}

pub struct FastqTagger<M> {
    mapper: M,
    scanner: TagScanner<TEXT_LEN>,
    line: Line,
    at_line_start: bool,
    code: Option<[u8; BASE16_LEN]>,
    name: Vec<u8>,
    naming: bool,
    counters: FastqCounters,
    progress: Progress,
}

impl<M: BarcodeMapper> FastqTagger<M> {
    pub fn new(mapper: M) -> Self {
        FastqTagger {
            mapper,
            scanner: TagScanner::new(b"BX:Z:", is_blank),
            line: Line::Header,
            at_line_start: true,
            code: None,
            name: Vec::with_capacity(MAX_NAME_LEN),
            naming: true,
            counters: FastqCounters::default(),
            progress: Progress::new("reads processed / barcodes added"),
        }
    }

    pub fn counters(&self) -> &FastqCounters {
        &self.counters
    }

    /// Ends the stream. A last quality line without a newline still counts
    /// its read.
    pub fn finish(mut self) -> Result<(M, FastqCounters)> {
        if self.line == Line::Quality && !self.at_line_start {
            self.end_line()?;
        }
        Ok((self.mapper, self.counters))
    }

    pub fn process<S: ByteSink>(&mut self, input: &[u8], out: &mut S) -> Result<()> {
        for &byte in input {
            self.feed(byte, out)?;
        }
        Ok(())
    }

    pub fn feed<S: ByteSink>(&mut self, byte: u8, out: &mut S) -> Result<()> {
        if self.at_line_start {
            self.at_line_start = false;
            match self.line {
                Line::Sequence => {
                    out.reserve(INSERT_LEN)?;
                    match &self.code {
                        Some(code) => {
                            out.put_slice(code)?;
                            out.put_slice(&JOIN)?;
                        }
                        None => out.put_slice(&NO_BASES)?,
                    }
                }
                Line::Quality => {
                    out.reserve(INSERT_LEN)?;
                    out.put_slice(match self.code {
                        Some(_) => &GOOD_QUALITY,
                        None => &NO_QUALITY,
                    })?;
                }
                Line::Header | Line::Separator => {}
            }
        }

        if self.line == Line::Header {
            self.scanner.feed(byte);
            if self.naming {
                if is_blank(byte) || self.name.len() == MAX_NAME_LEN {
                    self.naming = false;
                } else if !(self.name.is_empty() && byte == b'@') {
                    self.name.push(byte);
                }
            }
        }

        out.put(byte)?;

        if byte == b'\n' {
            self.end_line()?;
        }
        Ok(())
    }

    fn end_line(&mut self) -> Result<()> {
        match self.line {
            Line::Header => self.resolve()?,
            Line::Quality => {
                self.counters.total_reads += 1;
                if self.code.is_some() {
                    self.counters.bc_added += 1;
                }
                self.progress
                    .report(&[self.counters.total_reads, self.counters.bc_added]);
            }
            Line::Sequence | Line::Separator => {}
        }
        self.line = self.line.next();
        self.at_line_start = true;
        Ok(())
    }

    fn resolve(&mut self) -> Result<()> {
        let barcode = self.scanner.captured().and_then(|text| Barcode::parse(text));
        self.code = match barcode {
            Some(barcode) => {
                let code = self.mapper.map(barcode)?;
                if code.is_none() {
                    self.counters.unmapped += 1;
                    log::debug!(
                        "Read {} has barcode {} with no 16-base code",
                        String::from_utf8_lossy(&self.name),
                        barcode
                    );
                }
                code
            }
            None => {
                self.counters.missing_tags += 1;
                log::debug!(
                    "Read {} has no valid BX tag",
                    String::from_utf8_lossy(&self.name)
                );
                None
            }
        };
        self.scanner.reset();
        self.name.clear();
        self.naming = true;
        Ok(())
    }
}
