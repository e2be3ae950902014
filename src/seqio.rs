//! Sequence I/O Module
//!
//! Reads and writes protein FASTA files, plain or gzip-compressed.
//!
//! # Supported Formats
//! - FASTA: header line starting with '>' followed by one or more residue lines
//! - FASTA.gz: same, gzip (or multi-member gzip) compressed
//!
//! # Examples
//! ```no_run
//! use genefam::seqio::FastaFile;
//!
//! let mut reader = FastaFile::open("pangenome.faa.gz").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} aa", record.id, record.seq.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

// ============================================================================
// FASTA Record
// ============================================================================

/// A raw FASTA record as read from disk.
///
/// # Fields
/// - `id`: text after '>' up to the first whitespace
/// - `description`: the full header text after '>'
/// - `seq`: residues concatenated from all sequence lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Sequence identifier extracted from the header line.
    pub id: String,
    /// Complete header line without the leading '>'.
    pub description: String,
    /// Residues (amino acids, or aligned symbols for alignment files).
    pub seq: String,
}

fn split_header(line: &str) -> (String, String) {
    let header = line[1..].trim();
    let id = header.split_whitespace().next().unwrap_or("").to_string();
    (id, header.to_string())
}

// ============================================================================
// FASTA Reader
// ============================================================================

/// Sequential FASTA reader over any `Read` source.
///
/// Reads records one at a time. Lines before the first header are ignored.
pub struct FastaReader<R: Read> {
    reader: BufReader<R>,
    line_buf: String,
    current_header: Option<(String, String)>,
}

impl<R: Read> FastaReader<R> {
    /// Wraps a reader and consumes everything up to the first header line.
    pub fn new(inner: R) -> Result<Self> {
        let mut reader = Self {
            reader: BufReader::with_capacity(1024 * 1024, inner),
            line_buf: String::with_capacity(256),
            current_header: None,
        };

        loop {
            reader.line_buf.clear();
            if reader.reader.read_line(&mut reader.line_buf)? == 0 {
                break;
            }
            if reader.line_buf.starts_with('>') {
                reader.current_header = Some(split_header(&reader.line_buf));
                break;
            }
        }

        Ok(reader)
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O or decompression error
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let (id, description) = match self.current_header.take() {
            Some(h) => h,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(1024);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if self.line_buf.starts_with('>') {
                self.current_header = Some(split_header(&self.line_buf));
                break;
            }
            seq.extend(self.line_buf.chars().filter(|c| !c.is_whitespace()));
        }

        Ok(Some(FastaRecord { id, description, seq }))
    }
}

impl<R: Read> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Auto-detecting FASTA file reader.
///
/// Files ending in `.gz` are decompressed on the fly.
pub enum FastaFile {
    /// Plain text FASTA file.
    Plain(FastaReader<File>),
    /// Gzip-compressed FASTA file.
    Gzipped(FastaReader<MultiGzDecoder<File>>),
}

impl FastaFile {
    /// Opens a FASTA file, selecting the decoder from the extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;

        if is_gzipped(path) {
            Ok(FastaFile::Gzipped(FastaReader::new(MultiGzDecoder::new(file))?))
        } else {
            Ok(FastaFile::Plain(FastaReader::new(file)?))
        }
    }

    /// Reads the next record from whichever reader backs this file.
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        match self {
            FastaFile::Plain(r) => r.read_next(),
            FastaFile::Gzipped(r) => r.read_next(),
        }
    }
}

impl Iterator for FastaFile {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// True when the path carries a `.gz` extension.
pub fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Parses FASTA held in memory, e.g. captured stdout of an aligner.
pub fn parse_fasta_bytes(bytes: &[u8]) -> Result<Vec<FastaRecord>> {
    FastaReader::new(bytes)?.collect()
}

// ============================================================================
// FASTA Writer
// ============================================================================

/// Writes records as single-line FASTA, header first then residues.
pub fn write_fasta<'a, I>(records: I, path: &Path) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create FASTA: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for (header, seq) in records {
        writeln!(writer, ">{}", header)?;
        writeln!(writer, "{}", seq)?;
    }
    writer.flush()?;
    Ok(())
}
