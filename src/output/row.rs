//! Tab-delimited breakpoint rows.
//!
//! Raw evidence rows carry one read per line:
//! `chrom, pos-1, pos, orientation, junction_seq, read_id, mapq, clip_size, alignment_size, junction_baseq`.
//! Clustered rows have the same ten columns with the last five `;`-joined.
//! A raw row is therefore a clustered row with a single supporting read.

use std::fmt;

use crate::breakpoint::{BreakpointCluster, ClusterKey, JunctionEvidence, Orientation, SupportRead};
use crate::error::{Error, Result};
use crate::output::writer::Locus;

pub const LIST_DELIMITER: char = ';';
const N_COLUMNS: usize = 10;

impl fmt::Display for JunctionEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.junction_pos.saturating_sub(1),
            self.junction_pos,
            self.orientation,
            self.junction_seq,
            self.read_id,
            self.mapq,
            self.clip_size,
            self.alignment_size,
            self.junction_baseq,
        )
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.start(),
            self.junction_pos,
            self.orientation,
            self.junction_seq
        )
    }
}

impl Locus for JunctionEvidence {
    fn locus(&self) -> (&str, u64) {
        (&self.chrom, self.junction_pos)
    }
}

impl Locus for BreakpointCluster {
    fn locus(&self) -> (&str, u64) {
        (&self.key.chrom, self.key.junction_pos)
    }
}

fn join<T: ToString>(supports: &[SupportRead], field: impl Fn(&SupportRead) -> T) -> String {
    supports
        .iter()
        .map(|s| field(s).to_string())
        .collect::<Vec<_>>()
        .join(&LIST_DELIMITER.to_string())
}

impl fmt::Display for BreakpointCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.key,
            join(&self.supports, |s| s.read_id.clone()),
            join(&self.supports, |s| s.mapq),
            join(&self.supports, |s| s.clip_size),
            join(&self.supports, |s| s.alignment_size),
            join(&self.supports, |s| s.junction_baseq),
        )
    }
}

fn field<T: std::str::FromStr>(value: &str, name: &str, line: usize) -> Result<T>
where
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| Error::Parse {
        line,
        msg: format!("invalid {} '{}': {}", name, value, e),
    })
}

fn list<T: std::str::FromStr>(value: &str, name: &str, line: usize) -> Result<Vec<T>>
where
    T::Err: fmt::Display,
{
    value.split(LIST_DELIMITER).map(|v| field(v, name, line)).collect()
}

/// Parse one raw or clustered row; `line` is the 1-based line number used
/// in error messages.
pub fn parse_row(row: &str, line: usize) -> Result<BreakpointCluster> {
    let parts: Vec<&str> = row.split('\t').collect();
    if parts.len() != N_COLUMNS {
        return Err(Error::Parse {
            line,
            msg: format!("expected {} columns, got {}", N_COLUMNS, parts.len()),
        });
    }

    let start: u64 = field(parts[1], "start", line)?;
    let junction_pos: u64 = field(parts[2], "junction position", line)?;
    if junction_pos == 0 || start + 1 != junction_pos {
        return Err(Error::Parse {
            line,
            msg: format!("start {} is not junction position {} minus one", start, junction_pos),
        });
    }
    let orientation: Orientation = field(parts[3], "orientation", line)?;

    let read_ids: Vec<String> = list(parts[5], "read id", line)?;
    let mapqs: Vec<u8> = list(parts[6], "mapq", line)?;
    let clip_sizes: Vec<usize> = list(parts[7], "clip size", line)?;
    let alignment_sizes: Vec<usize> = list(parts[8], "alignment size", line)?;
    let baseqs: Vec<f64> = list(parts[9], "junction base quality", line)?;

    let n = read_ids.len();
    if [mapqs.len(), clip_sizes.len(), alignment_sizes.len(), baseqs.len()].iter().any(|&l| l != n) {
        return Err(Error::Parse {
            line,
            msg: "supporting read columns have different lengths".to_string(),
        });
    }

    let supports = read_ids
        .into_iter()
        .zip(mapqs)
        .zip(clip_sizes)
        .zip(alignment_sizes)
        .zip(baseqs)
        .map(|((((read_id, mapq), clip_size), alignment_size), junction_baseq)| SupportRead {
            read_id,
            mapq,
            clip_size,
            alignment_size,
            junction_baseq,
        })
        .collect();

    Ok(BreakpointCluster {
        key: ClusterKey {
            chrom: parts[0].to_string(),
            junction_pos,
            orientation,
            junction_seq: parts[4].to_string(),
        },
        supports,
    })
}
