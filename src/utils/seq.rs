//! Small nucleotide and base-quality helpers.

/// Reverse complement of an ASCII nucleotide sequence; anything other than
/// A/C/G/T becomes N.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' | b'a' => b'T',
            b'T' | b't' => b'A',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            _ => b'N',
        })
        .collect()
}

/// Arithmetic mean of Phred qualities, or None for an empty slice.
pub fn mean_quality(quals: &[u8]) -> Option<f64> {
    if quals.is_empty() {
        return None;
    }
    let sum: u64 = quals.iter().map(|&q| q as u64).sum();
    Some(sum as f64 / quals.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT");
        assert_eq!(reverse_complement(b"AAAC"), b"GTTT");
        assert_eq!(reverse_complement(b"gattaca"), b"TGTAATC");
        assert_eq!(reverse_complement(b"ANC"), b"GNT");
        assert_eq!(reverse_complement(b""), b"" as &[u8]);
    }

    #[test]
    fn test_mean_quality() {
        assert_eq!(mean_quality(&[30, 30, 30]), Some(30.0));
        assert_eq!(mean_quality(&[30, 31]), Some(30.5));
        assert_eq!(mean_quality(&[]), None);
    }
}
