use crate::utilities::format_metric;

/// Records between progress checks, as a power of two.
pub const LOG2_INTERVAL: u32 = 14;

const INTERVAL_MASK: u64 = (1 << LOG2_INTERVAL) - 1;

/// Periodic status line that is only printed when its text changes.
///
/// Counters are checked every 2^14 records. Because they are printed with
/// metric suffixes, consecutive checks often render the same text; those
/// repeats are suppressed.
pub struct Progress {
    label: &'static str,
    last: String,
}

impl Progress {
    pub fn new(label: &'static str) -> Self {
        Progress {
            label,
            last: String::new(),
        }
    }

    /// True when any counter sits on an interval boundary.
    pub fn is_due(counters: &[u64]) -> bool {
        counters.iter().any(|&n| n != 0 && n & INTERVAL_MASK == 0)
    }

    /// Formats the counters and returns the status text if it should be
    /// printed now.
    pub fn check(&mut self, counters: &[u64]) -> Option<String> {
        if !Self::is_due(counters) {
            return None;
        }
        let current = counters
            .iter()
            .map(|&n| format_metric(n))
            .collect::<Vec<_>>()
            .join(" / ");
        if current == self.last {
            return None;
        }
        self.last = current;
        Some(format!("{} {}", self.last, self.label))
    }

    pub fn report(&mut self, counters: &[u64]) {
        if let Some(status) = self.check(counters) {
            log::info!("{}", status);
        }
    }
}
