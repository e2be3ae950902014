//! Tabular Search Hit Parser
//!
//! Parses the 12-column BLAST tabular format (`--outfmt 6`) written by the
//! translated search engine.
//!
//! # Tabular Format (12 columns)
//! ```text
//! Col  Type    Description
//! 1    string  Query id (read name)
//! 2    string  Subject id (seed protein)
//! 3    float   Percent identity
//! 4    int     Alignment length
//! 5    int     Mismatches
//! 6    int     Gap openings
//! 7    int     Query start (1-based)
//! 8    int     Query end
//! 9    int     Subject start (1-based)
//! 10   int     Subject end
//! 11   float   E-value
//! 12   float   Bit score
//! ```
//!
//! # Example Usage
//! ```no_run
//! use genefam::hits::HitReader;
//!
//! let reader = HitReader::open("sample.m8").unwrap();
//! for hit in reader {
//!     let hit = hit.unwrap();
//!     println!("{} -> {} (e={:e})", hit.query, hit.subject, hit.evalue);
//! }
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// ============================================================================
// Search Hit
// ============================================================================

/// A single tabular search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Query id (column 1).
    pub query: String,
    /// Subject id (column 2).
    pub subject: String,
    /// Percent identity (column 3).
    pub identity: f64,
    /// Alignment length (column 4).
    pub length: usize,
    /// Mismatch count (column 5).
    pub mismatches: usize,
    /// Gap openings (column 6).
    pub gap_opens: usize,
    /// Query start, 1-based (column 7). Negative-frame hits have start > end.
    pub query_start: usize,
    /// Query end (column 8).
    pub query_end: usize,
    /// Subject start, 1-based (column 9).
    pub subject_start: usize,
    /// Subject end (column 10).
    pub subject_end: usize,
    /// Expect value (column 11).
    pub evalue: f64,
    /// Bit score (column 12).
    pub bitscore: f64,
}

impl SearchHit {
    /// Parses a hit from a tab-separated line.
    ///
    /// # Errors
    /// Returns an error if the line has fewer than 12 fields or any numeric
    /// field cannot be parsed.
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            anyhow::bail!("Invalid tabular hit line: {} fields, expected 12", fields.len());
        }

        Ok(Self {
            query: fields[0].to_string(),
            subject: fields[1].to_string(),
            identity: fields[2].parse().context("Invalid percent identity")?,
            length: fields[3].parse().context("Invalid alignment length")?,
            mismatches: fields[4].parse().context("Invalid mismatch count")?,
            gap_opens: fields[5].parse().context("Invalid gap openings")?,
            query_start: fields[6].parse().context("Invalid query start")?,
            query_end: fields[7].parse().context("Invalid query end")?,
            subject_start: fields[8].parse().context("Invalid subject start")?,
            subject_end: fields[9].parse().context("Invalid subject end")?,
            evalue: fields[10].trim().parse().context("Invalid e-value")?,
            bitscore: fields[11].trim().parse().context("Invalid bit score")?,
        })
    }

    /// True when the hit is at least as significant as `max_evalue`.
    pub fn is_significant(&self, max_evalue: f64) -> bool {
        self.evalue <= max_evalue
    }
}

// ============================================================================
// Hit Reader
// ============================================================================

/// Sequential reader for tabular hit files.
///
/// Skips blank lines and '#' comment lines.
pub struct HitReader {
    reader: BufReader<File>,
    line_buf: String,
}

impl HitReader {
    /// Opens a tabular hit file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open hits: {}", path.as_ref().display()))?;
        Ok(Self {
            reader: BufReader::with_capacity(1024 * 1024, file),
            line_buf: String::with_capacity(256),
        })
    }

    /// Reads the next hit.
    ///
    /// # Returns
    /// - `Ok(Some(hit))` - Successfully read a hit
    /// - `Ok(None)` - End of file reached
    /// - `Err(e)` - I/O or parsing error
    pub fn read_next(&mut self) -> Result<Option<SearchHit>> {
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                return Ok(None);
            }
            let line = self.line_buf.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Ok(Some(SearchHit::parse_line(line)?));
        }
    }
}

impl Iterator for HitReader {
    type Item = Result<SearchHit>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(hit)) => Some(Ok(hit)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
