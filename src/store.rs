//! Record Store
//!
//! In-memory collections of protein records read from one or more FASTA
//! corpora. A corpus is never mutated once built; every operation returns a
//! new collection.

use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::error::CurationError;
use crate::seqio::{FastaFile, FastaRecord};

/// A single protein record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Identifier, unique within a corpus.
    pub id: String,
    /// Free-text annotation (the full FASTA header).
    pub description: String,
    /// Residue symbols.
    pub residues: String,
}

impl SequenceRecord {
    pub fn new<I, D, R>(id: I, description: D, residues: R) -> Self
    where
        I: Into<String>,
        D: Into<String>,
        R: Into<String>,
    {
        Self {
            id: id.into(),
            description: description.into(),
            residues: residues.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

/// Counts gathered while reading corpus files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Well-formed records visited.
    pub records: usize,
    /// Records with an empty id or no residues.
    pub skipped: usize,
}

impl LoadStats {
    fn merge(&mut self, other: LoadStats) {
        self.records += other.records;
        self.skipped += other.skipped;
    }
}

/// Streams every well-formed record of every file to `visit`.
///
/// Malformed records are counted, not fatal. A file that cannot be opened
/// or read is [`CurationError::SourceUnavailable`].
pub fn scan<F>(paths: &[PathBuf], mut visit: F) -> Result<LoadStats, CurationError>
where
    F: FnMut(&Path, SequenceRecord),
{
    let mut stats = LoadStats::default();
    for path in paths {
        stats.merge(scan_file(path, &mut visit)?);
    }
    Ok(stats)
}

fn scan_file<F>(path: &Path, visit: &mut F) -> Result<LoadStats, CurationError>
where
    F: FnMut(&Path, SequenceRecord),
{
    if !path.exists() {
        return Err(CurationError::source_unavailable(path, "file does not exist"));
    }
    let unreadable = |e: anyhow::Error| CurationError::source_unavailable(path, format!("{:#}", e));

    let mut stats = LoadStats::default();
    let reader = FastaFile::open(path).map_err(unreadable)?;
    for record in reader {
        let FastaRecord { id, description, seq } = record.map_err(unreadable)?;
        if id.is_empty() || seq.is_empty() {
            stats.skipped += 1;
            continue;
        }
        stats.records += 1;
        visit(path, SequenceRecord { id, description, residues: seq });
    }
    Ok(stats)
}

/// Ordered collection of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    records: Vec<SequenceRecord>,
}

/// Result of [`Corpus::subset`].
#[derive(Debug, Clone)]
pub struct Subset {
    pub corpus: Corpus,
    /// Requested ids that were not present.
    pub missing: usize,
}

impl Corpus {
    pub fn new(records: Vec<SequenceRecord>) -> Self {
        Self { records }
    }

    /// Loads and concatenates corpus files in the given order.
    ///
    /// When an id repeats (sharded corpora often overlap) the first
    /// occurrence wins and later copies count as skipped.
    pub fn load(paths: &[PathBuf]) -> Result<(Self, LoadStats), CurationError> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut records = Vec::new();
        let mut duplicates = 0usize;

        let mut stats = scan(paths, |_, record| {
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                duplicates += 1;
            }
        })?;
        stats.records -= duplicates;
        stats.skipped += duplicates;

        log::debug!(
            "Loaded {} records from {} file(s) ({} skipped)",
            stats.records,
            paths.len(),
            stats.skipped
        );
        Ok((Self { records }, stats))
    }

    /// Records whose id is in `ids`, in corpus order.
    pub fn subset(&self, ids: &FxHashSet<String>) -> Subset {
        let records: Vec<SequenceRecord> = self
            .records
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect();
        let present: FxHashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let missing = ids.iter().filter(|id| !present.contains(id.as_str())).count();
        Subset {
            corpus: Self { records },
            missing,
        }
    }

    /// Residue count of every record, in corpus order.
    pub fn lengths(&self) -> Vec<usize> {
        self.records.iter().map(SequenceRecord::len).collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the corpus as FASTA, keeping the original headers.
    pub fn write_fasta(&self, path: &Path) -> anyhow::Result<()> {
        crate::seqio::write_fasta(
            self.records
                .iter()
                .map(|r| (r.description.as_str(), r.residues.as_str())),
            path,
        )
    }
}

impl FromIterator<SequenceRecord> for Corpus {
    fn from_iter<T: IntoIterator<Item = SequenceRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a SequenceRecord;
    type IntoIter = std::slice::Iter<'a, SequenceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
