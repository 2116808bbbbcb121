//! Byte-at-a-time scanners for fixed-width `XX:Z:` tags.
//!
//! A scanner is armed by a delimiter, matches a literal prefix such as `BX:Z:`,
//! copies exactly `N` payload bytes and only reports a capture once the payload
//! is closed by another delimiter. Anything shorter or longer is dropped. A
//! failed match re-arms on the next delimiter, so a later field on the same line
//! can still be captured.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Waiting for a delimiter.
    Idle,
    /// Saw a delimiter, the next byte may start the prefix.
    Armed,
    /// Matched this many prefix bytes.
    Prefix(usize),
    /// Copied this many payload bytes.
    Payload(usize),
    /// Payload buffer full, waiting for the closing delimiter.
    Full,
    /// Tag captured; ignores input until reset.
    Captured,
}

#[derive(Clone, Debug)]
pub struct TagScanner<const N: usize> {
    prefix: &'static [u8],
    is_delimiter: fn(u8) -> bool,
    state: ScanState,
    payload: [u8; N],
}

/// Whitespace and control bytes, the separators of a FASTQ comment.
pub fn is_blank(byte: u8) -> bool {
    byte < 33
}

/// SAM field separators.
pub fn is_field_end(byte: u8) -> bool {
    byte == b'\t' || byte == b'\n'
}

impl<const N: usize> TagScanner<N> {
    pub fn new(prefix: &'static [u8], is_delimiter: fn(u8) -> bool) -> Self {
        assert!(!prefix.is_empty() && N > 0, "tag scanner needs a prefix and a payload");
        TagScanner {
            prefix,
            is_delimiter,
            state: ScanState::Idle,
            payload: [0u8; N],
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn on_mismatch(&self, byte: u8) -> ScanState {
        if (self.is_delimiter)(byte) {
            ScanState::Armed
        } else {
            ScanState::Idle
        }
    }

    fn transition(&mut self, byte: u8) -> ScanState {
        match self.state {
            ScanState::Captured => ScanState::Captured,
            ScanState::Idle => self.on_mismatch(byte),
            ScanState::Armed if byte == self.prefix[0] => self.after_prefix(1),
            ScanState::Armed => self.on_mismatch(byte),
            ScanState::Prefix(n) if byte == self.prefix[n] => self.after_prefix(n + 1),
            ScanState::Prefix(_) => self.on_mismatch(byte),
            ScanState::Payload(_) if (self.is_delimiter)(byte) => ScanState::Armed,
            ScanState::Payload(n) => {
                self.payload[n] = byte;
                if n + 1 == N {
                    ScanState::Full
                } else {
                    ScanState::Payload(n + 1)
                }
            }
            ScanState::Full if (self.is_delimiter)(byte) => ScanState::Captured,
            ScanState::Full => ScanState::Idle,
        }
    }

    fn after_prefix(&self, matched: usize) -> ScanState {
        if matched == self.prefix.len() {
            ScanState::Payload(0)
        } else {
            ScanState::Prefix(matched)
        }
    }

    pub fn feed(&mut self, byte: u8) {
        self.state = self.transition(byte);
    }

    /// Ends the input. A full payload counts as closed, as if a delimiter
    /// had followed it.
    pub fn close(&mut self) {
        if self.state == ScanState::Full {
            self.state = ScanState::Captured;
        }
    }

    /// The payload, once a complete tag of exactly `N` bytes has been seen.
    pub fn captured(&self) -> Option<&[u8; N]> {
        match self.state {
            ScanState::Captured => Some(&self.payload),
            _ => None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.state == ScanState::Captured
    }

    pub fn reset(&mut self) {
        self.state = ScanState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan<const N: usize>(scanner: &mut TagScanner<N>, text: &[u8]) {
        for &byte in text {
            scanner.feed(byte);
        }
    }

    #[test]
    fn test_captures_exact_width_payload() {
        let mut scanner = TagScanner::<12>::new(b"BX:Z:", is_blank);
        scan(&mut scanner, b"@read1 BX:Z:A01C02B03D04\n");
        assert_eq!(scanner.captured(), Some(b"A01C02B03D04"));
    }

    #[test]
    fn test_needs_delimiter_before_prefix() {
        let mut scanner = TagScanner::<12>::new(b"BX:Z:", is_blank);
        scan(&mut scanner, b"@readBX:Z:A01C02B03D04\n");
        assert!(!scanner.is_captured());
    }

    #[test]
    fn test_rejects_short_and_long_payloads() {
        let mut scanner = TagScanner::<12>::new(b"BX:Z:", is_blank);
        scan(&mut scanner, b"@r BX:Z:A01C02B03D0\n");
        assert!(!scanner.is_captured());

        scanner.reset();
        scan(&mut scanner, b"@r BX:Z:A01C02B03D045\n");
        assert!(!scanner.is_captured());
    }

    #[test]
    fn test_rearms_after_failed_field() {
        let mut scanner = TagScanner::<12>::new(b"BX:Z:", is_blank);
        scan(&mut scanner, b"@r BX:Z:short BQ:Z:x BX:Z:A96C96B96D96\n");
        assert_eq!(scanner.captured(), Some(b"A96C96B96D96"));
    }

    #[test]
    fn test_first_capture_wins() {
        let mut scanner = TagScanner::<3>::new(b"QT:Z:", is_field_end);
        scan(&mut scanner, b"r1\t64\tQT:Z:abc\tQT:Z:xyz\n");
        assert_eq!(scanner.captured(), Some(b"abc"));
        assert_eq!(scanner.state(), ScanState::Captured);
    }

    #[test]
    fn test_sam_payload_closed_by_newline() {
        let mut scanner = TagScanner::<3>::new(b"BC:Z:", is_field_end);
        scan(&mut scanner, b"r1\t64\tBC:Z:ACG\n");
        assert_eq!(scanner.captured(), Some(b"ACG"));
    }

    #[test]
    fn test_partial_prefix_then_delimiter_rearms() {
        let mut scanner = TagScanner::<2>::new(b"BC:Z:", is_field_end);
        scan(&mut scanner, b"\tBC:\tBC:Z:GG\t");
        assert_eq!(scanner.captured(), Some(b"GG"));
    }

    #[test]
    fn test_close_completes_payload_at_end_of_input() {
        let mut scanner = TagScanner::<3>::new(b"QT:Z:", is_field_end);
        scan(&mut scanner, b"r1\t64\tQT:Z:abc");
        assert!(!scanner.is_captured());
        scanner.close();
        assert_eq!(scanner.captured(), Some(b"abc"));

        scanner.reset();
        scan(&mut scanner, b"r1\t64\tQT:Z:ab");
        scanner.close();
        assert!(!scanner.is_captured());
    }
}
