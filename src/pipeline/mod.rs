//! Single-pass drivers for the `parse` and `cluster` commands.
//!
//! `parse` streams alignment records through decode → extract → sort →
//! cluster → write. `cluster` re-runs the clusterer over an existing
//! breakpoint file.

use std::fs::File;
use std::io::BufRead;

use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::bam::decode_clips;
use crate::breakpoint::{
    BreakpointCluster, BreakpointClusterer, EvidenceSorter, JunctionEvidence, extract_junctions,
    validate_record,
};
use crate::config::ParseConfig;
use crate::error::Result;
use crate::input::{AlignmentInput, AlignmentRecord};
use crate::output::{RowWriter, open_rows, parse_row};

const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Counters reported at the end of a `parse` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub records_read: u64,
    /// Unmapped, secondary, supplementary, duplicate or insufficiently clipped
    pub records_ineligible: u64,
    /// Eligible records skipped for a missing position, sequence or qualities
    pub records_malformed: u64,
    /// Eligible records whose qualifying clips are all hard clips
    pub records_no_stored_clip: u64,
    pub evidence: u64,
    pub clusters: u64,
}

impl ParseStats {
    /// Write the counters as pretty-printed JSON
    pub fn write_json(&self, path: &str) -> std::io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)
            .map_err(std::io::Error::other)
    }
}

/// Counters reported at the end of a `cluster` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub rows_read: u64,
    pub clusters: u64,
}

/// Clusterer plus the files its input and output go to.
struct ClusterSink {
    clusterer: BreakpointClusterer,
    writer: RowWriter,
    raw_writer: Option<RowWriter>,
    clusters: u64,
}

impl ClusterSink {
    fn emit(&mut self, evidence: Vec<JunctionEvidence>) -> Result<()> {
        for e in evidence {
            if let Some(w) = &mut self.raw_writer {
                w.write_row(&e)?;
            }
            let flushed = self.clusterer.push(e);
            self.write_clusters(flushed)?;
        }
        Ok(())
    }

    fn write_clusters(&mut self, clusters: Vec<BreakpointCluster>) -> Result<()> {
        for cluster in clusters {
            self.writer.write_row(&cluster)?;
            self.clusters += 1;
        }
        Ok(())
    }

    fn finish(self) -> Result<u64> {
        let ClusterSink { clusterer, mut writer, raw_writer, mut clusters } = self;
        for cluster in clusterer.finish() {
            writer.write_row(&cluster)?;
            clusters += 1;
        }
        if let Some(w) = raw_writer {
            let path = w.path().display().to_string();
            let rows = w.finish()?;
            debug!("Wrote {} raw evidence rows to {}", rows, path);
        }
        writer.finish()?;
        Ok(clusters)
    }
}

pub struct ParseRunner {
    input_path: String,
    output_path: String,
    ref_path: Option<String>,
    region: Option<String>,
    config: ParseConfig,
    keep_raw: bool,
}

impl ParseRunner {
    pub fn new(input_path: &str, output_path: &str) -> Self {
        Self {
            input_path: input_path.to_string(),
            output_path: output_path.to_string(),
            ref_path: None,
            region: None,
            config: ParseConfig::default(),
            keep_raw: false,
        }
    }

    pub fn with_reference(mut self, ref_path: Option<&str>) -> Self {
        self.ref_path = ref_path.map(|s| s.to_string());
        self
    }

    /// Restrict extraction to `chr:start-end`; needs an indexed input.
    pub fn with_region(mut self, region: Option<&str>) -> Self {
        self.region = region.map(|s| s.to_string());
        self
    }

    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }

    /// Also write the sorted, unclustered evidence next to the output.
    pub fn with_debug(mut self, keep_raw: bool) -> Self {
        self.keep_raw = keep_raw;
        self
    }

    /// Path of the raw evidence file written in debug mode.
    pub fn raw_output_path(&self) -> String {
        format!("{}.bp.tmp.txt", self.output_path)
    }

    pub fn run(self) -> anyhow::Result<ParseStats> {
        self.config.validate()?;
        let config = &self.config;
        info!(
            "Parsing {} (key_seq_size={}, min_major_clip_size={}, max_minor_clip_size={}, check_interval={})",
            self.input_path,
            config.key_seq_size,
            config.min_major_clip_size,
            config.max_minor_clip_size,
            config.check_interval
        );

        let mut bam = AlignmentInput::open(&self.input_path, self.ref_path.as_deref())
            .with_context(|| format!("Error opening alignment file {}", self.input_path))?;
        let header = bam.header.clone();

        let raw_writer = if self.keep_raw {
            let path = self.raw_output_path();
            info!("Keeping raw junction evidence in {}", path);
            Some(RowWriter::create(&path)?)
        } else {
            None
        };
        let mut sink = ClusterSink {
            clusterer: BreakpointClusterer::new(config.check_interval),
            writer: RowWriter::create(&self.output_path)?,
            raw_writer,
            clusters: 0,
        };

        let records: Box<dyn Iterator<Item = anyhow::Result<AlignmentRecord>> + '_> = match &self.region {
            Some(region) => {
                bam.require_index(&self.input_path)?;
                info!("Restricting to region {}", region);
                Box::new(bam.query(region)?)
            }
            None => Box::new(bam.records()),
        };

        let mut stats = ParseStats::default();
        let mut sorter = EvidenceSorter::new();

        for result in records {
            let record = result?;
            stats.records_read += 1;
            if stats.records_read % PROGRESS_INTERVAL == 0 {
                debug!(
                    "Processed {} records, {} clusters written, {} evidence pending",
                    stats.records_read, sink.clusters, sorter.len() + sink.clusterer.len()
                );
            }

            let Some(geom) = decode_clips(&record, config.min_major_clip_size) else {
                stats.records_ineligible += 1;
                continue;
            };
            if let Err(reason) = validate_record(&record) {
                debug!("Skipping {}: {}", record.name(), reason);
                stats.records_malformed += 1;
                continue;
            }
            let (Some(chrom), Some(start)) = (header.reference_name(record.ref_id), record.alignment_start()) else {
                debug!("Skipping {}: reference id {} not in header", record.name(), record.ref_id);
                stats.records_malformed += 1;
                continue;
            };

            let evidence = extract_junctions(&record, chrom, &geom, config);
            if evidence.is_empty() {
                stats.records_no_stored_clip += 1;
            }
            stats.evidence += evidence.len() as u64;
            let released = sorter.push_record(record.name(), chrom, start as u64, evidence)?;
            sink.emit(released)?;
        }

        sink.emit(sorter.finish())?;
        stats.clusters = sink.finish()?;

        info!(
            "Processed {} records: {} ineligible, {} malformed, {} without stored clipped bases, {} junction reads, {} breakpoint clusters",
            stats.records_read,
            stats.records_ineligible,
            stats.records_malformed,
            stats.records_no_stored_clip,
            stats.evidence,
            stats.clusters
        );
        Ok(stats)
    }
}

/// Re-cluster a raw or clustered breakpoint file that is already sorted by
/// chromosome and junction position.
pub fn cluster_file(input_path: &str, output_path: &str, check_interval: u64) -> anyhow::Result<ClusterStats> {
    info!("Clustering {} (check_interval={})", input_path, check_interval);
    let reader = open_rows(input_path)?;
    let mut clusterer = BreakpointClusterer::new(check_interval);
    let mut writer = RowWriter::create(output_path)?;
    let mut stats = ClusterStats::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Error reading {}", input_path))?;
        if line.is_empty() {
            continue;
        }
        let cluster = parse_row(&line, i + 1)?;
        stats.rows_read += 1;
        for flushed in clusterer.push_cluster(cluster) {
            writer.write_row(&flushed)?;
        }
    }
    for remaining in clusterer.finish() {
        writer.write_row(&remaining)?;
    }
    stats.clusters = writer.finish()?;

    info!("Read {} rows, wrote {} breakpoint clusters", stats.rows_read, stats.clusters);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::input::CigarKind;
    use crate::input::tests::{index_bam, record_buf, write_bam};
    use crate::output::index_path;
    use noodles::sam::alignment::record::Flags;
    use noodles::sam::alignment::record_buf::RecordBuf;

    const LEFT: &[u8] = b"GGGGGAAACC";
    const RIGHT: &[u8] = b"CATGCCCCCC";

    fn right_clipped(name: &str, flags: Flags, start: usize, matched: usize) -> RecordBuf {
        let seq = [vec![b'T'; matched].as_slice(), RIGHT].concat();
        record_buf(name, flags, start, &[(CigarKind::Match, matched), (CigarKind::SoftClip, 10)], &seq)
    }

    fn sample_records() -> Vec<RecordBuf> {
        let left_seq = [LEFT, &[b'T'; 20][..]].concat();
        vec![
            right_clipped("r1", Flags::SEGMENTED | Flags::FIRST_SEGMENT, 100, 20),
            right_clipped("r2", Flags::SEGMENTED | Flags::LAST_SEGMENT, 105, 15),
            record_buf("r3", Flags::empty(), 119,
                &[(CigarKind::SoftClip, 10), (CigarKind::Match, 20)], &left_seq),
            right_clipped("r4", Flags::DUPLICATE, 200, 20),
            right_clipped("r5", Flags::empty(), 5000, 20),
        ]
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        open_rows(path).unwrap().lines().collect::<std::io::Result<_>>().unwrap()
    }

    #[test]
    fn test_parse_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        let out_path = dir.path().join("tumor.bp.txt");
        write_bam(&bam_path, &sample_records());

        let stats = ParseRunner::new(bam_path.to_str().unwrap(), out_path.to_str().unwrap())
            .run()
            .unwrap();

        assert_eq!(stats, ParseStats {
            records_read: 5,
            records_ineligible: 1,
            records_malformed: 0,
            records_no_stored_clip: 0,
            evidence: 4,
            clusters: 3,
        });

        let lines = read_lines(&out_path);
        assert_eq!(lines, vec![
            "chr1\t118\t119\t+\tCATGCCCC\tr1/1;r2/2\t60;60\t10;10\t20;15\t30;30",
            "chr1\t118\t119\t-\tGGTTTCCC\tr3/2\t60\t10\t20\t30",
            "chr1\t5018\t5019\t+\tCATGCCCC\tr5/2\t60\t10\t20\t30",
        ]);
    }

    #[test]
    fn test_parse_debug_output_and_small_interval() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        let out_path = dir.path().join("tumor.bp.txt.gz");
        write_bam(&bam_path, &sample_records());

        let config = ParseConfig { check_interval: 100, ..Default::default() };
        let runner = ParseRunner::new(bam_path.to_str().unwrap(), out_path.to_str().unwrap())
            .with_config(config)
            .with_debug(true);
        let raw_path = runner.raw_output_path();
        let stats = runner.run().unwrap();
        assert_eq!(stats.clusters, 3);

        let raw = read_lines(std::path::Path::new(&raw_path));
        assert_eq!(raw.len(), 4);
        assert!(raw[0].starts_with("chr1\t118\t119\t+\tCATGCCCC\tr1/1\t"));
        assert!(raw[3].starts_with("chr1\t5018\t5019\t+"));

        // clustered output is BGZF and must read back identically
        let clustered = read_lines(&out_path);
        assert_eq!(clustered.len(), 3);
        assert!(clustered[0].contains("r1/1;r2/2"));
        assert!(index_path(&out_path).exists());
        assert!(!index_path(std::path::Path::new(&raw_path)).exists());
    }

    #[test]
    fn test_parse_region_uses_index() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        let out_path = dir.path().join("tumor.bp.txt");
        write_bam(&bam_path, &[
            right_clipped("a", Flags::empty(), 100, 20),
            right_clipped("b", Flags::empty(), 3000, 20),
            right_clipped("c", Flags::empty(), 6000, 20),
        ]);
        index_bam(&bam_path);

        let stats = ParseRunner::new(bam_path.to_str().unwrap(), out_path.to_str().unwrap())
            .with_region(Some("chr1:2000-4000"))
            .run()
            .unwrap();
        assert_eq!(stats.records_read, 1);
        assert_eq!(stats.clusters, 1);
        assert_eq!(read_lines(&out_path), vec!["chr1\t3018\t3019\t+\tCATGCCCC\tb/2\t60\t10\t20\t30"]);
    }

    #[test]
    fn test_parse_region_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        write_bam(&bam_path, &sample_records());

        let err = ParseRunner::new(bam_path.to_str().unwrap(), dir.path().join("o.txt").to_str().unwrap())
            .with_region(Some("chr1:1-1000"))
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("Index file not found"));
    }

    #[test]
    fn test_hard_clip_only_records_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        let out_path = dir.path().join("tumor.bp.txt");
        write_bam(&bam_path, &[
            record_buf("h", Flags::empty(), 100,
                &[(CigarKind::HardClip, 10), (CigarKind::Match, 20)], &[b'T'; 20]),
            right_clipped("s", Flags::empty(), 200, 20),
        ]);

        let stats = ParseRunner::new(bam_path.to_str().unwrap(), out_path.to_str().unwrap())
            .run()
            .unwrap();
        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.records_ineligible, 0);
        assert_eq!(stats.records_no_stored_clip, 1);
        assert_eq!(stats.evidence, 1);
        assert_eq!(stats.clusters, 1);
    }

    #[test]
    fn test_parse_rejects_unsorted_bam() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("unsorted.bam");
        let out_path = dir.path().join("out.txt");
        write_bam(&bam_path, &[
            right_clipped("r1", Flags::empty(), 500, 20),
            right_clipped("r2", Flags::empty(), 100, 20),
        ]);

        let err = ParseRunner::new(bam_path.to_str().unwrap(), out_path.to_str().unwrap())
            .run()
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnsortedInput { .. })));
    }

    #[test]
    fn test_parse_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let bam_path = dir.path().join("tumor.bam");
        write_bam(&bam_path, &sample_records());

        let config = ParseConfig { key_seq_size: 0, ..Default::default() };
        let err = ParseRunner::new(bam_path.to_str().unwrap(), "unused.txt")
            .with_config(config)
            .run()
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
    }

    #[test]
    fn test_cluster_file_merges_raw_rows_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("raw.txt");
        let once_path = dir.path().join("once.txt");
        let twice_path = dir.path().join("twice.txt");
        std::fs::write(&raw_path, concat!(
            "chr1\t99\t100\t+\tAAAA\tr1/1\t60\t10\t90\t30\n",
            "chr1\t99\t100\t+\tAAAA\tr2/2\t50\t12\t88\t31.5\n",
            "chr1\t1499999\t1500000\t+\tAAAA\tr3/1\t60\t10\t90\t30\n",
        )).unwrap();

        let stats = cluster_file(raw_path.to_str().unwrap(), once_path.to_str().unwrap(), 1_000_000).unwrap();
        assert_eq!(stats, ClusterStats { rows_read: 3, clusters: 2 });
        let once = read_lines(&once_path);
        assert_eq!(once[0], "chr1\t99\t100\t+\tAAAA\tr1/1;r2/2\t60;50\t10;12\t90;88\t30;31.5");

        cluster_file(once_path.to_str().unwrap(), twice_path.to_str().unwrap(), 1_000_000).unwrap();
        assert_eq!(read_lines(&twice_path), once);
    }

    #[test]
    fn test_cluster_file_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("raw.txt");
        std::fs::write(&raw_path, "chr1\t99\t100\t+\tAAAA\tr1/1\t60\t10\t90\t30\nbroken\n").unwrap();

        let err = cluster_file(raw_path.to_str().unwrap(), dir.path().join("o.txt").to_str().unwrap(), 10)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Parse { line: 2, .. })));
    }

    #[test]
    fn test_stats_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let stats = ParseStats { records_read: 10, evidence: 4, clusters: 2, ..Default::default() };
        stats.write_json(path.to_str().unwrap()).unwrap();
        let loaded: ParseStats = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded, stats);
    }
}
