//! Unified alignment input that supports both BAM and CRAM files via noodles.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use anyhow::{Result, bail};

use noodles::bam;
use noodles::bgzf;
use noodles::cram;
use noodles::fasta;
use noodles::sam;
use noodles::core::Region;
use noodles::sam::alignment::record::Flags;

use crate::error::Error;

pub use noodles::sam::alignment::record::cigar::op::Kind as CigarKind;

/// Reference sequence names from the alignment header, indexed by reference id.
#[derive(Debug, Clone, Default)]
pub struct AlignmentHeader {
    pub refs: Vec<String>,
}

impl AlignmentHeader {
    fn from_sam_header(header: &sam::Header) -> Self {
        let refs = header
            .reference_sequences()
            .keys()
            .map(|name| String::from_utf8_lossy(name).to_string())
            .collect();
        AlignmentHeader { refs }
    }

    /// Name of the reference sequence with the given id.
    pub fn reference_name(&self, ref_id: i32) -> Option<&str> {
        if ref_id < 0 {
            return None;
        }
        self.refs.get(ref_id as usize).map(String::as_str)
    }
}

/// A record wrapper that provides a uniform interface over noodles BAM/CRAM records.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: Option<String>,
    pub ref_id: i32,
    pub pos: i32, // 0-based position
    pub flag: u16,
    pub mapq: u8,
    pub seq: Vec<u8>, // ASCII bases
    pub qual: Vec<u8>,
    pub cigar: Vec<(CigarKind, usize)>, // decoded cigar ops
}

impl Default for AlignmentRecord {
    fn default() -> Self {
        AlignmentRecord {
            name: None,
            ref_id: -1,
            pos: -1,
            flag: 0,
            mapq: 0,
            seq: Vec::new(),
            qual: Vec::new(),
            cigar: Vec::new(),
        }
    }
}

impl AlignmentRecord {
    /// Returns the read name, or `*` when the record has none.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("*")
    }

    /// Returns the 1-based alignment start position, or None if unplaced.
    pub fn alignment_start(&self) -> Option<usize> {
        if self.pos >= 0 {
            Some((self.pos + 1) as usize)
        } else {
            None
        }
    }

    /// Returns the alignment span on the reference (sum of M/D/N/=/X ops).
    pub fn alignment_span(&self) -> usize {
        let mut span = 0;
        for &(kind, len) in &self.cigar {
            match kind {
                CigarKind::Match
                | CigarKind::Deletion
                | CigarKind::Skip
                | CigarKind::SequenceMatch
                | CigarKind::SequenceMismatch => span += len,
                _ => {}
            }
        }
        span
    }

    /// Returns the flag bits as noodles `Flags`.
    pub fn flags(&self) -> Flags {
        Flags::from(self.flag)
    }

    /// Returns the decoded sequence as a byte slice.
    pub fn sequence(&self) -> &[u8] {
        &self.seq
    }

    /// Returns the Phred base qualities.
    pub fn qualities(&self) -> &[u8] {
        &self.qual
    }

    /// Iterates over CIGAR operations as (Kind, length) pairs.
    pub fn cigar_ops(&self) -> &[(CigarKind, usize)] {
        &self.cigar
    }
}

/// Decode a BAM or CRAM record into an [`AlignmentRecord`].
///
/// Missing base qualities decode as 0xFF, matching BAM's on-disk encoding of `*`.
fn decode_record(rec: &dyn sam::alignment::Record, header: &sam::Header) -> Result<AlignmentRecord> {
    let name = rec.name().map(|n| {
        String::from_utf8_lossy(n.as_ref()).to_string()
    });

    let ref_id = match rec.reference_sequence_id(header) {
        Some(Ok(id)) => id as i32,
        Some(Err(e)) => return Err(e.into()),
        None => -1,
    };

    let pos = match rec.alignment_start() {
        Some(Ok(p)) => (p.get() as i32) - 1,
        Some(Err(e)) => return Err(e.into()),
        None => -1,
    };

    let flag = rec.flags()?.bits();
    let mapq = match rec.mapping_quality() {
        Some(Ok(q)) => q.get(),
        Some(Err(e)) => return Err(e.into()),
        None => 255,
    };

    let seq: Vec<u8> = rec.sequence().iter().collect();
    let qual: Vec<u8> = rec.quality_scores().iter()
        .map(|r| r.unwrap_or(255))
        .collect();

    let mut cigar = Vec::new();
    for op_result in rec.cigar().iter() {
        let op = op_result?;
        cigar.push((op.kind(), op.len()));
    }

    Ok(AlignmentRecord {
        name,
        ref_id,
        pos,
        flag,
        mapq,
        seq,
        qual,
        cigar,
    })
}

/// Inner reader enum
enum Inner {
    Bam(bam::io::IndexedReader<bgzf::io::Reader<File>>),
    BamNoIndex(bam::io::Reader<bgzf::io::Reader<BufReader<File>>>),
    Cram(cram::io::IndexedReader<File>),
    CramNoIndex(cram::io::Reader<BufReader<File>>),
}

/// Unified alignment input wrapping either BAM or CRAM via noodles.
pub struct AlignmentInput {
    inner: Inner,
    sam_header: sam::Header,
    pub header: AlignmentHeader,
    /// Buffer for CRAM records (one container's worth at a time)
    cram_record_buf: std::collections::VecDeque<AlignmentRecord>,
    /// FASTA reference repository for CRAM decoding
    fasta_repo: fasta::Repository,
}

impl AlignmentInput {
    /// Open an alignment file (BAM or CRAM), auto-detected by magic bytes
    /// (falling back to file extension).
    ///
    /// CRAM input without a reference is rejected here, before any record
    /// is decoded.
    pub fn open(path: &str, ref_path: Option<&str>) -> Result<Self> {
        if Self::is_cram_file(path) && ref_path.is_none() {
            return Err(Error::MissingReference { path: path.into() }.into());
        }

        let fasta_repo = if let Some(rp) = ref_path {
            let indexed_reader = fasta::io::indexed_reader::Builder::default()
                .build_from_path(rp)
                .map_err(|e| anyhow::anyhow!("Failed to open FASTA reference {}: {}", rp, e))?;
            let adapter = fasta::repository::adapters::IndexedReader::new(indexed_reader);
            Some(fasta::Repository::new(adapter))
        } else {
            None
        };

        if Self::is_cram_file(path) {
            Self::open_cram(path, fasta_repo.unwrap_or_default())
        } else {
            Self::open_bam(path)
        }
    }

    /// Detect whether a file is CRAM by reading the first 4 magic bytes ("CRAM"),
    /// falling back to file extension if the file can't be read.
    fn is_cram_file(path: &str) -> bool {
        if let Ok(mut f) = File::open(path) {
            let mut magic = [0u8; 4];
            if std::io::Read::read_exact(&mut f, &mut magic).is_ok() {
                return &magic == b"CRAM";
            }
        }
        path.ends_with(".cram")
    }

    fn open_bam(path: &str) -> Result<Self> {
        let index_path = format!("{}.bai", path);

        let (inner, sam_header) = if Path::new(&index_path).exists() {
            let mut reader = bam::io::indexed_reader::Builder::default()
                .build_from_path(path)
                .map_err(|e| anyhow::anyhow!("Failed to open BAM {}: {}", path, e))?;
            let sam_header = reader.read_header()?;
            (Inner::Bam(reader), sam_header)
        } else {
            let file = File::open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open BAM {}: {}", path, e))?;
            let mut reader = bam::io::Reader::new(BufReader::new(file));
            let sam_header = reader.read_header()?;
            (Inner::BamNoIndex(reader), sam_header)
        };

        let header = AlignmentHeader::from_sam_header(&sam_header);
        Ok(AlignmentInput {
            inner,
            sam_header,
            header,
            cram_record_buf: std::collections::VecDeque::new(),
            fasta_repo: fasta::Repository::default(),
        })
    }

    fn open_cram(path: &str, repo: fasta::Repository) -> Result<Self> {
        let index_path = format!("{}.crai", path);

        let (inner, sam_header) = if Path::new(&index_path).exists() {
            let mut reader = cram::io::indexed_reader::Builder::default()
                .set_reference_sequence_repository(repo.clone())
                .build_from_path(path)
                .map_err(|e| {
                    let msg = e.to_string();
                    if msg.contains("gzip") {
                        anyhow::anyhow!(
                            "Failed to open CRAM index {}.crai: the index file does not appear \
                             to be gzip-compressed. Re-create the index with: samtools index {}",
                            path, path
                        )
                    } else {
                        anyhow::anyhow!("Failed to open CRAM {}: {}", path, e)
                    }
                })?;
            let sam_header = reader.read_header()?;
            (Inner::Cram(reader), sam_header)
        } else {
            let file = File::open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open CRAM {}: {}", path, e))?;
            let mut reader = cram::io::reader::Builder::default()
                .set_reference_sequence_repository(repo.clone())
                .build_from_reader(BufReader::new(file));
            let sam_header = reader.read_header()?;
            (Inner::CramNoIndex(reader), sam_header)
        };

        let header = AlignmentHeader::from_sam_header(&sam_header);
        Ok(AlignmentInput {
            inner,
            sam_header,
            header,
            cram_record_buf: std::collections::VecDeque::new(),
            fasta_repo: repo,
        })
    }

    /// Fill the CRAM record buffer by reading and decoding the next container.
    fn fill_cram_buffer(&mut self) -> Result<()> {
        let mut container = cram::io::reader::Container::default();

        let bytes_read = match &mut self.inner {
            Inner::Cram(r) => r.read_container(&mut container)?,
            Inner::CramNoIndex(r) => r.read_container(&mut container)?,
            _ => unreachable!(),
        };

        if bytes_read == 0 {
            return Ok(()); // EOF
        }

        let compression_header = container.compression_header()?;

        for slice_result in container.slices() {
            let slice = slice_result?;
            let (core_data_src, external_data_srcs) = slice.decode_blocks()?;
            let cram_records = slice.records(
                self.fasta_repo.clone(),
                &self.sam_header,
                &compression_header,
                &core_data_src,
                &external_data_srcs,
            )?;
            for cram_rec in &cram_records {
                let ar = decode_record(cram_rec, &self.sam_header)?;
                self.cram_record_buf.push_back(ar);
            }
        }

        Ok(())
    }

    /// Read the next alignment record.
    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        if self.is_cram() {
            if self.cram_record_buf.is_empty() {
                self.fill_cram_buffer()?;
                if self.cram_record_buf.is_empty() {
                    return Ok(None); // EOF
                }
            }
            return Ok(self.cram_record_buf.pop_front());
        }

        let mut buf = bam::Record::default();
        let n = match &mut self.inner {
            Inner::Bam(r) => r.read_record(&mut buf)?,
            Inner::BamNoIndex(r) => r.read_record(&mut buf)?,
            _ => unreachable!(),
        };
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(decode_record(&buf, &self.sam_header)?))
        }
    }

    /// Iterate over all remaining records in file order.
    pub fn records(&mut self) -> Records<'_> {
        Records { input: self }
    }

    /// Query records overlapping a region, returning an iterator.
    pub fn query(&mut self, region: &str) -> Result<RegionIterator> {
        let parsed_region: Region = region.parse()
            .map_err(|e| anyhow::anyhow!("Invalid region '{}': {}", region, e))?;

        match &mut self.inner {
            Inner::Bam(r) => {
                let header = &self.sam_header;
                let records: Vec<AlignmentRecord> = r.query(header, &parsed_region)?
                    .map(|result| -> Result<AlignmentRecord> {
                        let rec = result?;
                        decode_record(&rec, header)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RegionIterator { records: records.into_iter() })
            }
            Inner::Cram(r) => {
                let header = &self.sam_header;
                let records: Vec<AlignmentRecord> = r.query(header, &parsed_region)?
                    .map(|result| -> Result<AlignmentRecord> {
                        let rec = result?;
                        decode_record(&rec, header)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RegionIterator { records: records.into_iter() })
            }
            _ => bail!("Region queries require an indexed BAM/CRAM file"),
        }
    }

    /// Returns true if this is a CRAM input.
    pub fn is_cram(&self) -> bool {
        matches!(self.inner, Inner::Cram(_) | Inner::CramNoIndex(_))
    }

    /// Returns true if an index file was found for this reader.
    pub fn has_index(&self) -> bool {
        matches!(self.inner, Inner::Bam(_) | Inner::Cram(_))
    }

    /// Check that an index exists, returning a clear error if not.
    pub fn require_index(&self, path: &str) -> Result<()> {
        if !self.has_index() {
            let expected = if self.is_cram() {
                format!("{}.crai", path)
            } else {
                format!("{}.bai", path)
            };
            bail!(
                "Index file not found for '{}'. Expected '{}'. \
                 Create one with 'samtools index'.",
                path, expected
            );
        }
        Ok(())
    }
}

/// Streaming iterator over every record of an [`AlignmentInput`].
pub struct Records<'a> {
    input: &'a mut AlignmentInput,
}

impl Iterator for Records<'_> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.input.read_record().transpose()
    }
}

/// Iterator over alignment records in a genomic region.
pub struct RegionIterator {
    records: std::vec::IntoIter<AlignmentRecord>,
}

impl Iterator for RegionIterator {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(Ok)
    }
}
