/// Returns the smallest prime greater than or equal to `n`.
///
/// # Arguments
///
/// * `n` - The lower bound.
///
/// # Returns
///
/// The next prime, used to size hash tables so `hash % size` spreads well.
pub fn next_prime(n: u32) -> u32 {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_prime(n: u32) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let n = n as u64;
    let mut i = 5u64;
    while i * i <= n {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Complements a single IUPAC base from the `ACGTN` alphabet.
///
/// Anything that is not `A`, `C`, `G` or `T` complements to `N`.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

/// Writes the reverse complement of `seq` into `out`.
///
/// # Arguments
///
/// * `seq` - The bases to reverse-complement.
/// * `out` - Destination, must be exactly as long as `seq`.
pub fn reverse_complement_into(seq: &[u8], out: &mut [u8]) {
    assert_eq!(seq.len(), out.len(), "reverse complement length mismatch");
    for (dst, &src) in out.iter_mut().zip(seq.iter().rev()) {
        *dst = complement(src);
    }
}

/// Formats a count with a metric suffix, e.g. `16384` becomes `16.4 k`.
///
/// Counts below one thousand are printed as is.
pub fn format_metric(n: u64) -> String {
    const SUFFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];

    if n < 1000 {
        return n.to_string();
    }

    let mut value = n as f64 / 1000.0;
    let mut suffix = 0;
    while value >= 1000.0 && suffix < SUFFIXES.len() - 1 {
        value /= 1000.0;
        suffix += 1;
    }
    format!("{:.1} {}", value, SUFFIXES[suffix])
}
