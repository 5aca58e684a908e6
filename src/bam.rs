//! Flag and CIGAR decoding that decides whether a read can carry junction evidence.

use crate::input::{AlignmentRecord, CigarKind};

/// Clip lengths at both ends of an eligible alignment.
///
/// `left_clip`/`right_clip` include hard clips; `left_soft`/`right_soft` only
/// count the clipped bases that are actually stored in SEQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipGeometry {
    pub left_clip: usize,
    pub right_clip: usize,
    pub left_soft: usize,
    pub right_soft: usize,
}

fn clip_len(op: Option<&(CigarKind, usize)>) -> (usize, usize) {
    match op {
        Some(&(CigarKind::SoftClip, len)) => (len, len),
        Some(&(CigarKind::HardClip, len)) => (len, 0),
        _ => (0, 0),
    }
}

/// Decide whether a record is eligible breakpoint evidence and, if so,
/// return its clip geometry.
///
/// Unmapped, secondary, supplementary and duplicate records are rejected,
/// as are records whose CIGAR has a single operation or whose clips are
/// both shorter than `min_major_clip_size`.
pub fn decode_clips(record: &AlignmentRecord, min_major_clip_size: u32) -> Option<ClipGeometry> {
    let flags = record.flags();
    if flags.is_unmapped() {
        return None;
    }
    if flags.is_secondary() || flags.is_supplementary() {
        return None;
    }
    if flags.is_duplicate() {
        return None;
    }

    let cigar = record.cigar_ops();
    if cigar.len() <= 1 {
        return None;
    }

    let (left_clip, left_soft) = clip_len(cigar.first());
    let (right_clip, right_soft) = clip_len(cigar.last());

    let min = min_major_clip_size as usize;
    if left_clip < min && right_clip < min {
        return None;
    }

    Some(ClipGeometry {
        left_clip,
        right_clip,
        left_soft,
        right_soft,
    })
}
