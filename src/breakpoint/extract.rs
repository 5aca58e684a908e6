//! Junction evidence extraction from clipped alignments.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use log::debug;

use crate::bam::ClipGeometry;
use crate::config::ParseConfig;
use crate::input::AlignmentRecord;
use crate::utils::seq::{mean_quality, reverse_complement};

/// Which end of the read was clipped.
///
/// A right clip places the junction at the last aligned reference base, a
/// left clip at the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    RightClip,
    LeftClip,
}

impl Orientation {
    pub fn symbol(self) -> &'static str {
        match self {
            Orientation::RightClip => "+",
            Orientation::LeftClip => "-",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Orientation::RightClip),
            "-" => Ok(Orientation::LeftClip),
            _ => Err(format!("unknown orientation '{}'; expected '+' or '-'", s)),
        }
    }
}

/// One clipped side of one read, anchored at a reference junction.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionEvidence {
    pub chrom: String,
    /// 1-based junction coordinate
    pub junction_pos: u64,
    pub orientation: Orientation,
    pub junction_seq: String,
    /// Query name with a `/1` or `/2` mate suffix
    pub read_id: String,
    pub mapq: u8,
    pub clip_size: usize,
    pub alignment_size: usize,
    /// Mean base quality over the junction window
    pub junction_baseq: f64,
}

/// Why an otherwise eligible record could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPosition,
    MissingSequence,
    MissingQualities,
    QualityLengthMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SkipReason::MissingPosition => "no alignment position",
            SkipReason::MissingSequence => "no stored sequence",
            SkipReason::MissingQualities => "no base qualities",
            SkipReason::QualityLengthMismatch => "quality length differs from sequence length",
        };
        f.write_str(msg)
    }
}

/// Check the parts of a record that extraction reads.
///
/// Malformed records are skipped by the caller rather than aborting the run.
pub fn validate_record(record: &AlignmentRecord) -> Result<(), SkipReason> {
    if record.alignment_start().is_none() {
        return Err(SkipReason::MissingPosition);
    }
    if record.sequence().is_empty() {
        return Err(SkipReason::MissingSequence);
    }
    if record.qualities().len() != record.sequence().len() {
        // noodles returns an empty quality array for `*`
        if record.qualities().is_empty() {
            return Err(SkipReason::MissingQualities);
        }
        return Err(SkipReason::QualityLengthMismatch);
    }
    if record.qualities().iter().all(|&q| q == 0xff) {
        return Err(SkipReason::MissingQualities);
    }
    Ok(())
}

/// Derive up to two junction evidence records from an eligible alignment,
/// right clip first.
pub fn extract_junctions(
    record: &AlignmentRecord,
    chrom: &str,
    geom: &ClipGeometry,
    config: &ParseConfig,
) -> Vec<JunctionEvidence> {
    [Orientation::RightClip, Orientation::LeftClip]
        .into_iter()
        .filter_map(|side| junction_for_side(record, chrom, geom, side, config))
        .collect()
}

/// Evidence for one clipped side, or None when the side is below threshold
/// or none of its clipped bases are stored in SEQ.
fn junction_for_side(
    record: &AlignmentRecord,
    chrom: &str,
    geom: &ClipGeometry,
    side: Orientation,
    config: &ParseConfig,
) -> Option<JunctionEvidence> {
    let clip_size = match side {
        Orientation::RightClip => geom.right_clip,
        Orientation::LeftClip => geom.left_clip,
    };
    if clip_size < config.min_major_clip_size as usize {
        return None;
    }

    let start = record.alignment_start()? as u64;
    let alignment_size = record.alignment_span();
    let junction_pos = match side {
        Orientation::RightClip => (start + alignment_size as u64).saturating_sub(1),
        Orientation::LeftClip => start,
    };

    let window = junction_window(record.sequence().len(), geom, side, config.key_seq_size);
    if window.is_empty() || window.end > record.sequence().len() || window.end > record.qualities().len() {
        debug!(
            "{}: no stored clipped bases on the {} side, junction at {}:{} skipped",
            record.name(), side, chrom, junction_pos
        );
        return None;
    }

    let bases = &record.sequence()[window.clone()];
    let junction_seq = match side {
        Orientation::RightClip => bases.to_vec(),
        Orientation::LeftClip => reverse_complement(bases),
    };
    let junction_baseq = mean_quality(&record.qualities()[window])?;

    let mate = if record.flags().is_first_segment() { 1 } else { 2 };

    Some(JunctionEvidence {
        chrom: chrom.to_string(),
        junction_pos,
        orientation: side,
        junction_seq: String::from_utf8_lossy(&junction_seq).into_owned(),
        read_id: format!("{}/{}", record.name(), mate),
        mapq: record.mapq,
        clip_size,
        alignment_size,
        junction_baseq,
    })
}

/// Query range of the junction window, clamped to the soft-clipped bases
/// adjacent to the clip boundary.
fn junction_window(seq_len: usize, geom: &ClipGeometry, side: Orientation, key_seq_size: usize) -> Range<usize> {
    match side {
        Orientation::RightClip => {
            let boundary = seq_len.saturating_sub(geom.right_soft);
            boundary..boundary + key_seq_size.min(geom.right_soft)
        }
        Orientation::LeftClip => {
            let boundary = geom.left_soft;
            boundary - key_seq_size.min(boundary)..boundary
        }
    }
}
