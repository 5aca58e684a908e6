//! Plain-text or BGZF breakpoint files.
//!
//! BGZF output is tabix-indexed on close (`<path>.tbi`, BED-style columns:
//! chrom=1, start=2, end=3), so downstream steps can look up control
//! breakpoints by region.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use noodles::bgzf;
use noodles::core::Position;
use noodles::csi::binning_index::index::header::Builder as IndexHeaderBuilder;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::tabix;

use crate::error::{Error, Result};

/// A row anchored at a single 1-based reference position.
pub trait Locus {
    fn locus(&self) -> (&str, u64);
}

enum Sink {
    Plain(BufWriter<File>),
    Bgzf {
        writer: bgzf::io::Writer<File>,
        indexer: tabix::index::Indexer,
    },
}

/// Line writer that BGZF-compresses and indexes when the path ends in `.gz`.
///
/// Rows must arrive grouped by chromosome and sorted by position within
/// each chromosome.
pub struct RowWriter {
    sink: Sink,
    path: PathBuf,
    rows: u64,
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Path of the tabix index written next to a BGZF breakpoint file.
pub fn index_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".tbi");
    PathBuf::from(p)
}

fn write_indexed<R: std::fmt::Display + Locus>(
    writer: &mut bgzf::io::Writer<File>,
    indexer: &mut tabix::index::Indexer,
    row: &R,
) -> std::io::Result<()> {
    let start = writer.virtual_position();
    writeln!(writer, "{}", row)?;
    let end = writer.virtual_position();

    let (chrom, pos) = row.locus();
    let position = usize::try_from(pos)
        .ok()
        .and_then(Position::new)
        .ok_or_else(|| std::io::Error::other(format!("invalid position {}:{}", chrom, pos)))?;
    indexer.add_record(chrom, position, position, Chunk::new(start, end))
}

impl RowWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(e, path))?;
        let sink = if is_gzip_path(path) {
            let mut indexer = tabix::index::Indexer::default();
            indexer.set_header(IndexHeaderBuilder::bed().build());
            Sink::Bgzf {
                writer: bgzf::io::Writer::new(file),
                indexer,
            }
        } else {
            Sink::Plain(BufWriter::new(file))
        };
        Ok(Self {
            sink,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    /// Write one row followed by a newline.
    pub fn write_row<R: std::fmt::Display + Locus>(&mut self, row: &R) -> Result<()> {
        let res = match &mut self.sink {
            Sink::Plain(w) => writeln!(w, "{}", row),
            Sink::Bgzf { writer, indexer } => write_indexed(writer, indexer, row),
        };
        res.map_err(|e| Error::io(e, &self.path))?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush (and for BGZF, write the EOF block and the tabix index); returns
    /// the number of rows written.
    pub fn finish(self) -> Result<u64> {
        let path = self.path;
        match self.sink {
            Sink::Plain(mut w) => w.flush().map_err(|e| Error::io(e, &path))?,
            Sink::Bgzf { writer, indexer } => {
                writer.finish().map_err(|e| Error::io(e, &path))?;
                let index = indexer.build();
                let tbi = index_path(&path);
                tabix::fs::write(&tbi, &index).map_err(|e| Error::io(e, &tbi))?;
            }
        }
        Ok(self.rows)
    }
}

/// Open a breakpoint file for line reading, BGZF-decoding `.gz` paths.
pub fn open_rows(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(e, path))?;
    if is_gzip_path(path) {
        Ok(Box::new(bgzf::io::Reader::new(file)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::{BreakpointCluster, JunctionEvidence, Orientation};
    use noodles::core::region::Interval;
    use noodles::csi::BinningIndex;

    fn cluster(chrom: &str, pos: u64, read: &str) -> BreakpointCluster {
        BreakpointCluster::from(JunctionEvidence {
            chrom: chrom.to_string(),
            junction_pos: pos,
            orientation: Orientation::RightClip,
            junction_seq: "CATGCCCC".to_string(),
            read_id: read.to_string(),
            mapq: 60,
            clip_size: 10,
            alignment_size: 20,
            junction_baseq: 30.0,
        })
    }

    fn sample_rows() -> Vec<BreakpointCluster> {
        vec![
            cluster("chr1", 100, "r1/1"),
            cluster("chr1", 200, "r2/1"),
            cluster("chr2", 5_000_000, "r3/2"),
        ]
    }

    fn write(path: &Path) {
        let mut writer = RowWriter::create(path).unwrap();
        for row in sample_rows() {
            writer.write_row(&row).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 3);
    }

    fn read_lines(path: &Path) -> Vec<String> {
        open_rows(path).unwrap().lines().collect::<std::io::Result<_>>().unwrap()
    }

    #[test]
    fn test_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bp.txt");
        write(&path);

        let expected: Vec<String> = sample_rows().iter().map(|r| r.to_string()).collect();
        assert_eq!(read_lines(&path), expected);
        assert!(!index_path(&path).exists());
    }

    #[test]
    fn test_bgzf_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bp.txt.gz");
        write(&path);

        let expected: Vec<String> = sample_rows().iter().map(|r| r.to_string()).collect();
        assert_eq!(read_lines(&path), expected);
        // BGZF files always start with the gzip magic
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_bgzf_region_lookup_through_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bp.txt.gz");
        write(&path);

        let index = tabix::fs::read(index_path(&path)).unwrap();
        let names = index.header().unwrap().reference_sequence_names();
        assert_eq!(names.len(), 2);
        let chr2 = names.get_index_of(&b"chr2"[..]).unwrap();

        let interval = Interval::from(Position::new(4_999_000).unwrap()..=Position::new(5_001_000).unwrap());
        let chunks = index.query(chr2, interval).unwrap();
        assert!(!chunks.is_empty());

        let mut reader = bgzf::io::Reader::new(File::open(&path).unwrap());
        reader.seek(chunks[0].start()).unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), cluster("chr2", 5_000_000, "r3/2").to_string());

        // nothing indexed far from the only chr2 row
        let far = Interval::from(Position::new(90_000_000).unwrap()..=Position::new(90_001_000).unwrap());
        assert!(index.query(chr2, far).unwrap().is_empty());
    }

    #[test]
    fn test_empty_bgzf_file_is_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt.gz");
        RowWriter::create(&path).unwrap().finish().unwrap();
        assert!(read_lines(&path).is_empty());
        assert!(index_path(&path).exists());
    }

    #[test]
    fn test_missing_input_names_path() {
        let err = open_rows("/nonexistent/bp.txt").err().unwrap();
        assert!(err.to_string().contains("/nonexistent/bp.txt"));
    }
}
