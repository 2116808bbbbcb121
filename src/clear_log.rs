//! Reader for the clear-barcode log written by `sam-haplotag`:
//!
//! ```text
//! Barcode	Correct Reads	Corrected Reads
//! A01C02B03D04	120	7
//! ```

use std::io::Read;

use crate::buffer_pool::ReadPool;
use crate::codec::{Barcode, TEXT_LEN};
use crate::errors::{HaplotagError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearRow {
    pub barcode: Barcode,
    pub correct: u32,
    pub corrected: u32,
}

impl ClearRow {
    /// Reads carrying this barcode, saturating at `u32::MAX`.
    pub fn reads(&self) -> u32 {
        self.correct.saturating_add(self.corrected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Header,
    Barcode,
    Correct,
    Corrected,
}

/// Byte-at-a-time parser for the clear-barcode log.
pub struct ClearLogParser {
    state: State,
    line: usize,
    text: Vec<u8>,
    correct: Option<u32>,
    corrected: Option<u32>,
}

impl Default for ClearLogParser {
    fn default() -> Self {
        ClearLogParser {
            state: State::Header,
            line: 1,
            text: Vec::with_capacity(TEXT_LEN),
            correct: None,
            corrected: None,
        }
    }
}

impl ClearLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn error(&self, reason: impl Into<String>) -> HaplotagError {
        HaplotagError::ClearLog {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn accumulate(&self, count: Option<u32>, byte: u8) -> Result<u32> {
        if !byte.is_ascii_digit() {
            return Err(self.error(format!("unexpected byte {:?} in count", byte as char)));
        }
        count
            .unwrap_or(0)
            .checked_mul(10)
            .and_then(|n| n.checked_add(u32::from(byte - b'0')))
            .ok_or_else(|| self.error("count does not fit in 32 bits"))
    }

    fn complete_row(&mut self) -> Result<ClearRow> {
        let barcode = Barcode::parse(&self.text).ok_or_else(|| {
            self.error(format!(
                "'{}' is not a haplotag barcode",
                String::from_utf8_lossy(&self.text)
            ))
        })?;
        let (correct, corrected) = match (self.correct, self.corrected) {
            (Some(correct), Some(corrected)) => (correct, corrected),
            _ => return Err(self.error("missing read count")),
        };
        self.text.clear();
        self.correct = None;
        self.corrected = None;
        self.state = State::Barcode;
        self.line += 1;
        Ok(ClearRow {
            barcode,
            correct,
            corrected,
        })
    }

    /// Consumes one byte, returning a row when the byte completes one.
    pub fn feed(&mut self, byte: u8) -> Result<Option<ClearRow>> {
        match (self.state, byte) {
            (State::Header, b'\n') => {
                self.state = State::Barcode;
                self.line += 1;
            }
            (State::Header, _) => {}
            (State::Barcode, b'\n') if self.text.is_empty() => self.line += 1,
            (State::Barcode, b'\t') => self.state = State::Correct,
            (State::Barcode, b'\n') => return Err(self.error("missing read counts")),
            (State::Barcode, _) => {
                if self.text.len() == TEXT_LEN {
                    return Err(self.error("barcode is too long"));
                }
                self.text.push(byte);
            }
            (State::Correct, b'\t') => self.state = State::Corrected,
            (State::Correct, b'\n') => return Err(self.error("missing corrected read count")),
            (State::Correct, _) => self.correct = Some(self.accumulate(self.correct, byte)?),
            (State::Corrected, b'\n') => return self.complete_row().map(Some),
            (State::Corrected, b'\r') => {}
            (State::Corrected, _) => {
                self.corrected = Some(self.accumulate(self.corrected, byte)?)
            }
        }
        Ok(None)
    }

    /// Completes a final row that lacks a trailing newline.
    pub fn finish(mut self) -> Result<Option<ClearRow>> {
        match self.state {
            State::Header => Ok(None),
            State::Barcode if self.text.is_empty() => Ok(None),
            State::Corrected => self.complete_row().map(Some),
            State::Barcode | State::Correct => Err(self.error("truncated row")),
        }
    }
}

/// Streams a clear-barcode log through a read pool, handing each row to
/// `on_row`. Returns the number of rows read.
pub fn read_clear_log<R, F>(reader: R, buffer_size: usize, mut on_row: F) -> Result<u64>
where
    R: Read + Send + 'static,
    F: FnMut(ClearRow),
{
    let mut pool = ReadPool::from_reader(reader, buffer_size)?;
    let mut parser = ClearLogParser::new();
    let mut rows = 0u64;
    pool.for_each_chunk(|chunk| {
        for &byte in chunk {
            if let Some(row) = parser.feed(byte)? {
                rows += 1;
                on_row(row);
            }
        }
        Ok(())
    })?;
    pool.finish()?;
    if let Some(row) = parser.finish()? {
        rows += 1;
        on_row(row);
    }
    Ok(rows)
}
