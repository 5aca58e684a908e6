//! Reorders junction evidence from alignment-start order into junction order.
//!
//! Reads arrive sorted by alignment start, but a right-clip junction sits at
//! the alignment end. Evidence is held in a min-heap until no later read can
//! produce a junction before it.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::breakpoint::extract::JunctionEvidence;
use crate::error::{Error, Result};

struct Pending {
    seq: u64,
    evidence: JunctionEvidence,
}

// BinaryHeap is a max-heap: the smallest position (then earliest arrival)
// must compare greatest so it is popped first.
impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.evidence.junction_pos == other.evidence.junction_pos && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other.evidence.junction_pos.cmp(&self.evidence.junction_pos)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Streaming sorter for the evidence of one coordinate-sorted alignment stream.
#[derive(Default)]
pub struct EvidenceSorter {
    heap: BinaryHeap<Pending>,
    chrom: Option<String>,
    last_start: u64,
    finished_chroms: HashSet<String>,
    next_seq: u64,
}

impl EvidenceSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the evidence of one read starting at `start` on `chrom` and return
    /// everything that can no longer be preceded by later evidence.
    ///
    /// `read` is only used to attribute an ordering error.
    pub fn push_record(
        &mut self,
        read: &str,
        chrom: &str,
        start: u64,
        evidence: Vec<JunctionEvidence>,
    ) -> Result<Vec<JunctionEvidence>> {
        let mut released = Vec::new();

        if self.chrom.as_deref() != Some(chrom) {
            if self.finished_chroms.contains(chrom) {
                return Err(unsorted(read, chrom, start));
            }
            released.extend(self.drain());
            if let Some(prev) = self.chrom.replace(chrom.to_string()) {
                self.finished_chroms.insert(prev);
            }
        } else if start < self.last_start {
            return Err(unsorted(read, chrom, start));
        }
        self.last_start = start;

        // Later reads start at or after `start`, so their junctions are >= start - 1.
        while let Some(top) = self.heap.peek() {
            if top.evidence.junction_pos >= start {
                break;
            }
            if let Some(p) = self.heap.pop() {
                released.push(p.evidence);
            }
        }

        for e in evidence {
            self.heap.push(Pending { seq: self.next_seq, evidence: e });
            self.next_seq += 1;
        }

        Ok(released)
    }

    /// Release all remaining evidence in junction order.
    pub fn finish(mut self) -> Vec<JunctionEvidence> {
        self.drain()
    }

    /// Number of evidence records currently held back.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn drain(&mut self) -> Vec<JunctionEvidence> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(p) = self.heap.pop() {
            out.push(p.evidence);
        }
        out
    }
}

fn unsorted(read: &str, chrom: &str, pos: u64) -> Error {
    Error::UnsortedInput {
        read: read.to_string(),
        chrom: chrom.to_string(),
        pos,
    }
}
