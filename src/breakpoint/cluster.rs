//! Streaming positional clustering of junction evidence.
//!
//! Evidence sharing chromosome, junction position, orientation and junction
//! sequence is merged into one cluster. The window is closed, and every held
//! cluster emitted, when the chromosome changes or when the junction position
//! jumps more than `check_interval` past the previous record. The previous
//! position is updated on every record, so a dense run never flushes while
//! far-apart singletons each do. Identical keys separated by a flush end up in
//! separate clusters; downstream tools expect exactly this split.

use indexmap::IndexMap;

use crate::breakpoint::extract::{JunctionEvidence, Orientation};

/// Identity of a breakpoint candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    pub chrom: String,
    /// 1-based junction coordinate; the 0-based start column is derived from it
    pub junction_pos: u64,
    pub orientation: Orientation,
    pub junction_seq: String,
}

impl ClusterKey {
    /// 0-based start, i.e. `junction_pos - 1`
    pub fn start(&self) -> u64 {
        self.junction_pos.saturating_sub(1)
    }
}

/// Per-read values carried by a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportRead {
    pub read_id: String,
    pub mapq: u8,
    pub clip_size: usize,
    pub alignment_size: usize,
    pub junction_baseq: f64,
}

/// A breakpoint candidate and its supporting reads in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointCluster {
    pub key: ClusterKey,
    pub supports: Vec<SupportRead>,
}

impl BreakpointCluster {
    pub fn support_count(&self) -> usize {
        self.supports.len()
    }
}

impl From<JunctionEvidence> for BreakpointCluster {
    fn from(e: JunctionEvidence) -> Self {
        BreakpointCluster {
            key: ClusterKey {
                chrom: e.chrom,
                junction_pos: e.junction_pos,
                orientation: e.orientation,
                junction_seq: e.junction_seq,
            },
            supports: vec![SupportRead {
                read_id: e.read_id,
                mapq: e.mapq,
                clip_size: e.clip_size,
                alignment_size: e.alignment_size,
                junction_baseq: e.junction_baseq,
            }],
        }
    }
}

/// Windowed keyed accumulator over a junction-sorted evidence stream.
///
/// Not reentrant: one instance consumes one ordered stream.
pub struct BreakpointClusterer {
    check_interval: u64,
    active_chrom: Option<String>,
    active_pos: u64,
    clusters: IndexMap<ClusterKey, Vec<SupportRead>>,
}

impl BreakpointClusterer {
    pub fn new(check_interval: u64) -> Self {
        Self {
            check_interval,
            active_chrom: None,
            active_pos: 0,
            clusters: IndexMap::new(),
        }
    }

    /// Add one evidence record, returning any clusters flushed by it.
    pub fn push(&mut self, evidence: JunctionEvidence) -> Vec<BreakpointCluster> {
        self.push_cluster(BreakpointCluster::from(evidence))
    }

    /// Add a pre-aggregated cluster as a single unit; its supports are
    /// appended to any active cluster with the same key.
    pub fn push_cluster(&mut self, cluster: BreakpointCluster) -> Vec<BreakpointCluster> {
        let BreakpointCluster { key, supports } = cluster;

        let chrom_changed = self.active_chrom.as_deref() != Some(key.chrom.as_str());
        let gap = key.junction_pos as i128 - self.active_pos as i128;
        let flushed = if chrom_changed || gap > self.check_interval as i128 {
            self.flush()
        } else {
            Vec::new()
        };

        if chrom_changed {
            self.active_chrom = Some(key.chrom.clone());
        }
        self.active_pos = key.junction_pos;

        self.clusters.entry(key).or_default().extend(supports);
        flushed
    }

    /// Emit every remaining cluster, in first-insertion order.
    pub fn finish(mut self) -> Vec<BreakpointCluster> {
        self.flush()
    }

    /// Number of distinct keys in the current window.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    fn flush(&mut self) -> Vec<BreakpointCluster> {
        self.clusters
            .drain(..)
            .map(|(key, supports)| BreakpointCluster { key, supports })
            .collect()
    }
}
