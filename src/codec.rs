//! Packing of haplotag barcodes.
//!
//! A haplotag barcode is written `A##C##B##D##`: four two-digit decimal fields.
//! Packed, each field occupies one byte of a `u32`, most significant first, in
//! the order they appear in the text (A, C, B, D).

/// Length of the text form `A##C##B##D##`.
pub const TEXT_LEN: usize = 12;

/// Length of the nucleotide form produced by [`Barcode::to_16base`].
pub const BASE16_LEN: usize = 16;

/// Largest value a text field can hold.
pub const MAX_FIELD: u8 = 99;

const FIELD_OFFSETS: [usize; 4] = [1, 4, 7, 10];
const FIELD_LETTERS: [u8; 4] = *b"ACBD";
const ALPHABET: [u8; 4] = *b"ATGC";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Barcode(u32);

impl Barcode {
    pub const fn from_raw(raw: u32) -> Self {
        Barcode(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Packs four field values given in text order (A, C, B, D).
    pub const fn from_fields(a: u8, c: u8, b: u8, d: u8) -> Self {
        Barcode((a as u32) << 24 | (c as u32) << 16 | (b as u32) << 8 | d as u32)
    }

    /// The four field values in text order (A, C, B, D).
    pub const fn fields(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Strictly parses `A##C##B##D##`.
    ///
    /// Returns `None` when the text is not exactly twelve bytes, when a field is
    /// not two ASCII digits, or when any field is `00`.
    pub fn parse(text: &[u8]) -> Option<Self> {
        let text: &[u8; TEXT_LEN] = text.try_into().ok()?;
        let mut fields = [0u8; 4];
        for (field, &offset) in fields.iter_mut().zip(FIELD_OFFSETS.iter()) {
            let (hi, lo) = (text[offset], text[offset + 1]);
            if !hi.is_ascii_digit() || !lo.is_ascii_digit() || (hi == b'0' && lo == b'0') {
                return None;
            }
            *field = (hi - b'0') * 10 + (lo - b'0');
        }
        Some(Self::from_fields(fields[0], fields[1], fields[2], fields[3]))
    }

    /// Parses `A##C##B##D##` without validation, for text that has already been
    /// checked. Non-digit bytes produce an unspecified but deterministic key.
    pub fn parse_unchecked(text: &[u8; TEXT_LEN]) -> Self {
        let field = |offset: usize| {
            text[offset]
                .wrapping_sub(b'0')
                .wrapping_mul(10)
                .wrapping_add(text[offset + 1].wrapping_sub(b'0'))
        };
        Self::from_fields(field(1), field(4), field(7), field(10))
    }

    /// True when every field fits the two-digit text form.
    pub fn is_writable(self) -> bool {
        self.fields().iter().all(|&field| field <= MAX_FIELD)
    }

    /// Renders the text form. Every field must be at most 99; larger values
    /// are a caller bug, caught in debug builds and written modulo 100
    /// otherwise.
    pub fn to_text(self) -> [u8; TEXT_LEN] {
        debug_assert!(self.is_writable(), "field of {:#010x} above {}", self.0, MAX_FIELD);
        let mut out = [0u8; TEXT_LEN];
        for ((&letter, &offset), value) in FIELD_LETTERS
            .iter()
            .zip(FIELD_OFFSETS.iter())
            .zip(self.fields())
        {
            let value = value % 100;
            out[offset - 1] = letter;
            out[offset] = b'0' + value / 10;
            out[offset + 1] = b'0' + value % 10;
        }
        out
    }

    /// Maps each two-bit group of the key, most significant first, to a base.
    pub fn to_16base(self) -> [u8; BASE16_LEN] {
        let mut out = [0u8; BASE16_LEN];
        for (i, base) in out.iter_mut().enumerate() {
            *base = ALPHABET[((self.0 >> (2 * (15 - i))) & 3) as usize];
        }
        out
    }

    /// Inverse of [`Barcode::to_16base`]. Returns `None` unless `seq` is sixteen
    /// bases from `ATGC`.
    pub fn from_16base(seq: &[u8]) -> Option<Self> {
        if seq.len() != BASE16_LEN {
            return None;
        }
        seq.iter().try_fold(0u32, |acc, &base| {
            let bits = match base {
                b'A' => 0,
                b'T' => 1,
                b'G' => 2,
                b'C' => 3,
                _ => return None,
            };
            Some(acc << 2 | bits)
        })
        .map(Barcode)
    }
}

impl std::fmt::Display for Barcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // to_text only ever produces ASCII
        f.write_str(std::str::from_utf8(&self.to_text()).map_err(|_| std::fmt::Error)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packs_fields_in_text_order() {
        let barcode = Barcode::parse(b"A01C02B03D04").unwrap();
        assert_eq!(barcode.raw(), 0x0102_0304);
        assert_eq!(barcode.fields(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_rejects_zero_fields() {
        assert!(Barcode::parse(b"A00C02B03D04").is_none());
        assert!(Barcode::parse(b"A01C02B03D00").is_none());
        // a single zero digit is fine
        assert!(Barcode::parse(b"A10C02B03D40").is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(Barcode::parse(b"A01C02B03D0").is_none());
        assert!(Barcode::parse(b"A01C02B03D045").is_none());
        assert!(Barcode::parse(b"A0xC02B03D04").is_none());
    }

    #[test]
    fn test_parse_unchecked_accepts_zero_fields() {
        let barcode = Barcode::parse_unchecked(b"A00C96B00D01");
        assert_eq!(barcode.fields(), [0, 96, 0, 1]);
    }

    #[test]
    fn test_text_round_trip() {
        for a in [1u8, 9, 10, 55, 96, 99] {
            for d in [0u8, 1, 42, 99] {
                let barcode = Barcode::from_fields(a, 3, 77, d);
                let text = barcode.to_text();
                assert_eq!(Barcode::parse_unchecked(&text), barcode);
            }
        }
        assert_eq!(&Barcode::from_fields(1, 2, 3, 4).to_text(), b"A01C02B03D04");
    }

    #[test]
    fn test_writable_range() {
        assert!(Barcode::from_fields(99, 1, 0, 42).is_writable());
        assert!(!Barcode::from_fields(1, 100, 3, 4).is_writable());
        assert!(!Barcode::from_raw(u32::MAX).is_writable());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_to_text_rejects_three_digit_field() {
        Barcode::from_fields(101, 2, 3, 4).to_text();
    }

    #[test]
    fn test_16base_mapping() {
        assert_eq!(&Barcode::from_raw(0).to_16base(), b"AAAAAAAAAAAAAAAA");
        assert_eq!(&Barcode::from_raw(u32::MAX).to_16base(), b"CCCCCCCCCCCCCCCC");
        assert_eq!(&Barcode::from_raw(0b01_10_11).to_16base(), b"AAAAAAAAAAAAATGC");
    }

    #[test]
    fn test_16base_inverse() {
        for raw in [0u32, 1, 0x0102_0304, 0x6363_6363, 0xdead_beef, u32::MAX] {
            let barcode = Barcode::from_raw(raw);
            assert_eq!(Barcode::from_16base(&barcode.to_16base()), Some(barcode));
        }
        assert!(Barcode::from_16base(b"AAAAAAAAAAAAAAAN").is_none());
        assert!(Barcode::from_16base(b"AAAA").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Barcode::from_fields(96, 1, 12, 7).to_string(), "A96C01B12D07");
    }
}
