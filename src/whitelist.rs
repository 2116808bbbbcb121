use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::codec::{Barcode, BASE16_LEN};
use crate::errors::{HaplotagError, Result};
use crate::hash_table::{HashTable, BARCODE_SEED};

/// Ordered table of valid 16-base barcodes, addressed by 1-based index.
///
/// Sequences are kept packed; the reverse direction goes through a hash table
/// keyed by the packed sequence.
pub struct Whitelist {
    codes: Vec<Barcode>,
    index: HashTable<u32, u32>,
}

impl Whitelist {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| HaplotagError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads one sequence per line. Blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(HaplotagError::Read)?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let code = Barcode::from_16base(line.as_bytes()).ok_or_else(|| {
                HaplotagError::Whitelist {
                    line: number + 1,
                    reason: format!("expected {} bases from ACGT, got '{}'", BASE16_LEN, line),
                }
            })?;
            entries.push((number + 1, code));
        }

        let mut codes = Vec::with_capacity(entries.len());
        let mut index = HashTable::with_expected_entries(entries.len(), BARCODE_SEED);
        for (line, code) in entries {
            let slot = index.insert_or_fetch(code.raw());
            if *slot != 0 {
                return Err(HaplotagError::Whitelist {
                    line,
                    reason: format!("duplicate of entry {}", slot),
                });
            }
            codes.push(code);
            *slot = codes.len() as u32;
        }

        log::debug!("Loaded {} whitelist barcodes", codes.len());
        Ok(Whitelist { codes, index })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Sequence at 1-based `index`.
    pub fn sequence(&self, index: u32) -> Option<[u8; BASE16_LEN]> {
        let i = (index as usize).checked_sub(1)?;
        self.codes.get(i).map(|code| code.to_16base())
    }

    /// All sequences in list order.
    pub fn sequences(&self) -> impl Iterator<Item = [u8; BASE16_LEN]> + '_ {
        self.codes.iter().map(|code| code.to_16base())
    }

    /// 1-based index of `seq`, if it is on the list.
    pub fn index_of(&self, seq: &[u8]) -> Option<u32> {
        let code = Barcode::from_16base(seq)?;
        self.index.get(&code.raw()).copied()
    }
}
