//! Barcode-segment correction.
//!
//! Each of the four haplotag fields is read from its own window of the `BC`
//! sequence. A decoder turns a window into the field's 7-bit index, with bit 7
//! set when a correction was needed, or 0 when the window cannot be resolved.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::codec::MAX_FIELD;
use crate::errors::{HaplotagError, Result};
use crate::hash_table::{HashTable, STRING_SEED};
use crate::utilities::reverse_complement_into;

/// Set on a decoded field that needed correcting.
pub const CORRECTED: u8 = 0x80;
/// Mask for the field index of a decoded value.
pub const INDEX_MASK: u8 = 0x7f;

/// Length of one half of a `BC` tag.
pub const HALF_LEN: usize = 13;
/// Length of a full `BC` tag: two halves joined by a dash.
pub const BC_LEN: usize = 2 * HALF_LEN + 1;

const AMBIGUOUS: u8 = u8::MAX;
const BASES: [u8; 5] = *b"ACGTN";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    A,
    B,
    C,
    D,
}

impl Field {
    fn slot(self) -> usize {
        match self {
            Field::A => 0,
            Field::B => 1,
            Field::C => 2,
            Field::D => 3,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "A" => Some(Field::A),
            "B" => Some(Field::B),
            "C" => Some(Field::C),
            "D" => Some(Field::D),
            _ => None,
        }
    }
}

pub trait BarcodeDecoder {
    /// Decodes one window. 0 means unclear; indices above 99 cannot be written
    /// as a barcode field and are treated as unclear by [`decode_fields`].
    fn decode(&self, field: Field, window: &[u8]) -> u8;
}

/// Decodes the four fields of a `BC` payload, returned in text order
/// (A, C, B, D). `rc` receives the reverse complement of the second half.
pub fn decode_fields<D: BarcodeDecoder + ?Sized>(
    decoder: &D,
    bc: &[u8; BC_LEN],
    rc: &mut [u8; HALF_LEN],
) -> [u8; 4] {
    reverse_complement_into(&bc[HALF_LEN + 1..], rc);
    let decode = |field: Field, window: &[u8]| match decoder.decode(field, window) {
        value if value & INDEX_MASK > MAX_FIELD => 0,
        value => value,
    };
    let a = decode(Field::A, &bc[7..HALF_LEN]);
    let c = decode(Field::C, &bc[..7]);
    let b = decode(Field::B, &rc[7..]);
    let d = decode(Field::D, &rc[..7]);
    [a, c, b, d]
}

/// Table-driven decoder: exact matches and unique single-substitution matches.
pub struct SegmentDecoder {
    exact: Vec<HashTable<Vec<u8>, u8>>,
    near: Vec<HashTable<Vec<u8>, u8>>,
}

impl SegmentDecoder {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| HaplotagError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads `field \t index \t sequence` rows; `#` starts a comment line.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut segments: [Vec<(usize, Vec<u8>, u8)>; 4] = Default::default();

        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(HaplotagError::Read)?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = |reason: String| HaplotagError::SegmentTable {
                line: number + 1,
                reason,
            };

            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() != 3 {
                return Err(bad(format!("expected 3 columns, found {}", columns.len())));
            }
            let field = Field::from_name(columns[0])
                .ok_or_else(|| bad(format!("unknown field '{}'", columns[0])))?;
            let index: u8 = columns[1]
                .parse()
                .ok()
                .filter(|i| (1..=MAX_FIELD).contains(i))
                .ok_or_else(|| bad(format!("index '{}' not in 1..={}", columns[1], MAX_FIELD)))?;
            let sequence = columns[2].as_bytes();
            if sequence.is_empty() || !sequence.iter().all(|b| b"ACGT".contains(b)) {
                return Err(bad(format!("sequence '{}' is not ACGT", columns[2])));
            }
            segments[field.slot()].push((number + 1, sequence.to_vec(), index));
        }

        let mut exact = Vec::with_capacity(4);
        let mut near = Vec::with_capacity(4);
        for (slot, entries) in segments.iter().enumerate() {
            let mut known: HashTable<Vec<u8>, u8> =
                HashTable::with_expected_entries(entries.len(), STRING_SEED);
            for (line, sequence, index) in entries {
                let entry = known.insert_or_fetch(sequence.clone());
                if *entry != 0 {
                    return Err(HaplotagError::SegmentTable {
                        line: *line,
                        reason: format!(
                            "sequence '{}' already listed",
                            String::from_utf8_lossy(sequence)
                        ),
                    });
                }
                *entry = *index;
            }

            let neighbours: usize = entries.iter().map(|(_, s, _)| s.len() * 4).sum();
            let mut variants: HashTable<Vec<u8>, u8> =
                HashTable::with_expected_entries(neighbours, STRING_SEED);
            for (_, sequence, index) in entries {
                let mut variant = sequence.clone();
                for pos in 0..sequence.len() {
                    for &base in BASES.iter().filter(|&&b| b != sequence[pos]) {
                        variant[pos] = base;
                        if known.contains(&variant[..]) {
                            continue;
                        }
                        let entry = variants.insert_or_fetch(variant.clone());
                        *entry = match *entry {
                            0 => *index,
                            seen if seen == *index => seen,
                            _ => AMBIGUOUS,
                        };
                    }
                    variant[pos] = sequence[pos];
                }
            }
            log::debug!(
                "Segment {}: {} sequences, {} correctable variants",
                ["A", "B", "C", "D"][slot],
                known.len(),
                variants.len()
            );
            exact.push(known);
            near.push(variants);
        }

        Ok(SegmentDecoder { exact, near })
    }
}

impl BarcodeDecoder for SegmentDecoder {
    fn decode(&self, field: Field, window: &[u8]) -> u8 {
        let slot = field.slot();
        if let Some(&index) = self.exact[slot].get(window) {
            return index;
        }
        match self.near[slot].get(window) {
            Some(&AMBIGUOUS) | None => 0,
            Some(&index) => index | CORRECTED,
        }
    }
}
