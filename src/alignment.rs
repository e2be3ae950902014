//! Alignment Model
//!
//! A rectangular multiple sequence alignment over a fixed set of record ids.
//! Aligned FASTA produced by the external aligner is parsed into this type
//! at the adapter boundary; every later stage works on typed rows.

use anyhow::{bail, Result};
use rustc_hash::FxHashSet;
use std::path::Path;

use crate::seqio::{self, FastaRecord};

/// Symbols counted as gaps. MAFFT emits '-', HMMER/Stockholm-derived
/// alignments may also carry '.'.
pub const GAP_SYMBOLS: &[u8] = b"-.";

pub fn is_gap(symbol: u8) -> bool {
    GAP_SYMBOLS.contains(&symbol)
}

/// One aligned row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRow {
    pub id: String,
    /// Full header, kept so trimmed alignments can be written back out.
    pub description: String,
    pub symbols: String,
}

impl AlignedRow {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, symbols: S) -> Self {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            symbols: symbols.into(),
        }
    }

    pub fn gap_count(&self) -> usize {
        self.symbols.bytes().filter(|&b| is_gap(b)).count()
    }

    /// Residues with gap symbols removed.
    pub fn ungapped(&self) -> String {
        self.symbols.chars().filter(|&c| !c.is_ascii() || !is_gap(c as u8)).collect()
    }
}

/// Rectangular alignment: every row has the same column count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    rows: Vec<AlignedRow>,
    columns: usize,
}

impl Alignment {
    /// Builds an alignment, rejecting ragged rows and duplicate ids.
    pub fn new(rows: Vec<AlignedRow>) -> Result<Self> {
        let columns = rows.first().map(|r| r.symbols.len()).unwrap_or(0);
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for row in &rows {
            if row.symbols.len() != columns {
                bail!(
                    "Alignment is not rectangular: row '{}' has {} columns, expected {}",
                    row.id,
                    row.symbols.len(),
                    columns
                );
            }
            if !seen.insert(row.id.as_str()) {
                bail!("Alignment has duplicate row id '{}'", row.id);
            }
        }
        Ok(Self { rows, columns })
    }

    pub fn from_fasta_records(records: Vec<FastaRecord>) -> Result<Self> {
        Self::new(
            records
                .into_iter()
                .map(|r| AlignedRow {
                    id: r.id,
                    description: r.description,
                    symbols: r.seq,
                })
                .collect(),
        )
    }

    /// Parses aligned FASTA held in memory.
    pub fn from_fasta_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_fasta_records(seqio::parse_fasta_bytes(bytes)?)
    }

    pub fn rows(&self) -> &[AlignedRow] {
        &self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.id.as_str())
    }

    /// Gap fraction of every row, in row order.
    pub fn gap_profile(&self) -> Vec<GapFraction<'_>> {
        self.rows
            .iter()
            .map(|row| GapFraction {
                id: &row.id,
                gaps: row.gap_count(),
                columns: self.columns,
            })
            .collect()
    }

    /// New alignment holding only rows accepted by `keep`. Row order and
    /// column count are preserved, including all-gap columns.
    pub fn select<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&AlignedRow) -> bool,
    {
        Self {
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
            columns: self.columns,
        }
    }

    pub fn write_fasta(&self, path: &Path) -> Result<()> {
        seqio::write_fasta(
            self.rows
                .iter()
                .map(|r| (r.description.as_str(), r.symbols.as_str())),
            path,
        )
    }
}

/// Gap statistics for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapFraction<'a> {
    pub id: &'a str,
    pub gaps: usize,
    pub columns: usize,
}

impl GapFraction<'_> {
    /// `gaps / columns`; a zero-width alignment counts as all gap.
    pub fn value(&self) -> f64 {
        if self.columns == 0 {
            return 1.0;
        }
        self.gaps as f64 / self.columns as f64
    }
}
