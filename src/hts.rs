//! Reading and rewriting of BAM/CRAM and FASTQ inputs.
//!
//! The pipeline makes several passes over the same file, so a handle is
//! opened fresh for each pass and iterated to exhaustion. Output goes to
//! stdout in the same container as the input.

use crate::error::Error;
use crate::read::ReadData;
use bio::io::fastq;
use rust_htslib::bam::{self, record::Aux, Read as BamRead};
use std::io;
use std::path::Path;

type Result<T> = std::result::Result<T, Error>;

/// Read group assigned to records that carry none.
pub const DEFAULT_RG: &str = "default";

/// ASCII offset of quality strings.
const QUAL_OFFSET: u8 = 33;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Take reported qualities from the OQ tag when present.
    pub use_oq: bool,
    /// Save the overwritten qualities into the OQ tag.
    pub set_oq: bool,
    /// Extra htslib reader/writer threads.
    pub threads: usize,
}

/// One open sequencing file, readable as a stream of [`ReadData`].
pub enum HtsFile {
    Bam(BamFile),
    Fastq(FastqFile),
}

impl HtsFile {
    /// Opens `path`, picking the container from the extension.
    pub fn open(path: &Path, options: &OpenOptions) -> Result<Self> {
        let name = path.to_string_lossy();
        if name.ends_with(".bam") || name.ends_with(".cram") {
            Ok(HtsFile::Bam(BamFile::open(path, options)?))
        } else if [".fastq", ".fq", ".fastq.gz", ".fq.gz"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            Ok(HtsFile::Fastq(FastqFile::open(path)?))
        } else {
            Err(Error::UnsupportedFormat(name.into_owned()))
        }
    }

    /// Next record, or None at end of input.
    pub fn next_read(&mut self) -> Result<Option<ReadData>> {
        match self {
            HtsFile::Bam(f) => f.next_read(),
            HtsFile::Fastq(f) => f.next_read(),
        }
    }

    /// Sequence length of the next record; cheaper contract for the
    /// coverage estimation pass.
    pub fn next_len(&mut self) -> Result<Option<usize>> {
        Ok(self.next_read()?.map(|read| read.seq.len()))
    }

    /// Genome length according to the header, when the container has one.
    pub fn genome_length(&self) -> Option<u64> {
        match self {
            HtsFile::Bam(f) => Some(f.genome_length()),
            HtsFile::Fastq(_) => None,
        }
    }

    /// Prepares the stdout writer; must be called before [`HtsFile::write`].
    pub fn open_out(&mut self) -> Result<()> {
        match self {
            HtsFile::Bam(f) => f.open_out(),
            HtsFile::Fastq(f) => f.open_out(),
        }
    }

    /// Writes the record read last, with its qualities replaced.
    pub fn write(&mut self, read: &ReadData, quals: &[u8]) -> Result<()> {
        match self {
            HtsFile::Bam(f) => f.write(quals),
            HtsFile::Fastq(f) => f.write(read, quals),
        }
    }
}

/// BAM/CRAM access through htslib, one reused record buffer.
pub struct BamFile {
    reader: bam::Reader,
    writer: Option<bam::Writer>,
    record: bam::Record,
    use_oq: bool,
    set_oq: bool,
    threads: usize,
}

impl BamFile {
    fn open(path: &Path, options: &OpenOptions) -> Result<Self> {
        let mut reader = bam::Reader::from_path(path)?;
        if options.threads > 0 {
            reader.set_threads(options.threads)?;
        }
        Ok(Self {
            reader,
            writer: None,
            record: bam::Record::new(),
            use_oq: options.use_oq,
            set_oq: options.set_oq,
            threads: options.threads,
        })
    }

    fn next_read(&mut self) -> Result<Option<ReadData>> {
        match self.reader.read(&mut self.record) {
            Some(Ok(())) => Ok(Some(self.decode()?)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn decode(&self) -> Result<ReadData> {
        let rec = &self.record;
        let name = String::from_utf8(rec.qname().to_vec())?;
        let seq = rec.seq().as_bytes();
        let mut quals = rec.qual().to_vec();
        if self.use_oq {
            if let Ok(Aux::String(oq)) = rec.aux(b"OQ") {
                quals = oq.bytes().map(|q| q.saturating_sub(QUAL_OFFSET)).collect();
            }
        }
        let rg = match rec.aux(b"RG") {
            Ok(Aux::String(rg)) => rg.to_string(),
            _ => DEFAULT_RG.to_string(),
        };
        Ok(ReadData::new(name, seq, quals, rg, rec.is_last_in_template()))
    }

    fn genome_length(&self) -> u64 {
        let header = self.reader.header();
        (0..header.target_count())
            .filter_map(|tid| header.target_len(tid))
            .sum()
    }

    fn open_out(&mut self) -> Result<()> {
        let header = bam::Header::from_template(self.reader.header());
        let mut writer = bam::Writer::from_stdout(&header, bam::Format::Bam)?;
        if self.threads > 0 {
            writer.set_threads(self.threads)?;
        }
        self.writer = Some(writer);
        Ok(())
    }

    fn write(&mut self, quals: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("output was never opened".to_string()))?;
        if self.set_oq {
            let oq: String = self
                .record
                .qual()
                .iter()
                .map(|&q| char::from(q.min(93) + QUAL_OFFSET))
                .collect();
            let _ = self.record.remove_aux(b"OQ");
            self.record.push_aux(b"OQ", Aux::String(&oq))?;
        }
        let qname = self.record.qname().to_vec();
        let cigar = self.record.cigar().take();
        let seq = self.record.seq().as_bytes();
        self.record.set(&qname, Some(&cigar), &seq, quals);
        writer.write(&self.record)?;
        Ok(())
    }
}

/// FASTQ access, gzip-transparent on the way in.
pub struct FastqFile {
    records: fastq::Records<Box<dyn io::Read>>,
    writer: Option<fastq::Writer<io::Stdout>>,
}

impl FastqFile {
    fn open(path: &Path) -> Result<Self> {
        let raw: Box<dyn io::Read> = Box::new(std::fs::File::open(path)?);
        let (reader, _format) = niffler::get_reader(raw)?;
        Ok(Self {
            records: fastq::Reader::new(reader).records(),
            writer: None,
        })
    }

    fn next_read(&mut self) -> Result<Option<ReadData>> {
        match self.records.next() {
            Some(Ok(rec)) => {
                let name = rec.id().to_string();
                let second = name.ends_with("/2");
                let quals = rec
                    .qual()
                    .iter()
                    .map(|&q| q.saturating_sub(QUAL_OFFSET))
                    .collect();
                Ok(Some(ReadData::new(
                    name,
                    rec.seq().to_vec(),
                    quals,
                    DEFAULT_RG.to_string(),
                    second,
                )))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn open_out(&mut self) -> Result<()> {
        self.writer = Some(fastq::Writer::new(io::stdout()));
        Ok(())
    }

    fn write(&mut self, read: &ReadData, quals: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("output was never opened".to_string()))?;
        let qual: Vec<u8> = quals.iter().map(|&q| q + QUAL_OFFSET).collect();
        writer.write(&read.name, None, &read.seq, &qual)?;
        Ok(())
    }
}
