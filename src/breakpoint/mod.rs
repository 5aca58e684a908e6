//! Breakpoint evidence: extraction from clipped reads, reordering by
//! junction position, and windowed clustering.

pub mod cluster;
pub mod extract;
pub mod sort;

pub use cluster::{BreakpointCluster, BreakpointClusterer, ClusterKey, SupportRead};
pub use extract::{JunctionEvidence, Orientation, SkipReason, extract_junctions, validate_record};
pub use sort::EvidenceSorter;
