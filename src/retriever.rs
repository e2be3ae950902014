//! Candidate Retriever
//!
//! Selects pangenome records whose free-text annotation names a gene.
//! Selection is deliberately permissive; later stages prune the false
//! positives that text matching lets through.
//!
//! # Matching Policy
//! A description matches when it contains the gene token as a
//! case-insensitive substring with a word boundary on at least one side,
//! so `mcrA` matches `... subunit McrA` and `mcrA_2` but not `nmcrAb`.
//! The optional negative pattern is applied only to records that already
//! matched the token.

use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::error::CurationError;
use crate::store::{self, Corpus, SequenceRecord};

// ============================================================================
// Candidate Set
// ============================================================================

/// Retrieved records with the file each one came from.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    corpus: Corpus,
    sources: Vec<PathBuf>,
    provenance: Vec<usize>,
}

impl CandidateSet {
    /// Builds a set where every record comes from the same source.
    pub fn from_corpus(corpus: Corpus, source: PathBuf) -> Self {
        let provenance = vec![0; corpus.len()];
        Self {
            corpus,
            sources: vec![source],
            provenance,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn records(&self) -> &[SequenceRecord] {
        self.corpus.records()
    }

    /// Source file of the record at `index`.
    pub fn source_of(&self, index: usize) -> Option<&Path> {
        self.provenance
            .get(index)
            .map(|&s| self.sources[s].as_path())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.corpus.ids()
    }

    pub fn id_set(&self) -> FxHashSet<String> {
        self.corpus.ids().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// New set holding the records for which `keep` is true, provenance kept.
    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&SequenceRecord) -> bool,
    {
        let mut records = Vec::new();
        let mut provenance = Vec::new();
        for (record, &src) in self.corpus.iter().zip(&self.provenance) {
            if keep(record) {
                records.push(record.clone());
                provenance.push(src);
            }
        }
        Self {
            corpus: Corpus::new(records),
            sources: self.sources.clone(),
            provenance,
        }
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Output of [`retrieve`].
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub candidates: CandidateSet,
    /// Headers that matched the gene token.
    pub header_matches: usize,
    /// Positive matches removed by the negative pattern.
    pub excluded: usize,
    /// Malformed records skipped while scanning.
    pub skipped: usize,
}

/// Case-insensitive token match with a word boundary on at least one side.
pub fn matches_gene_token(description: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let haystack = description.to_ascii_lowercase();
    let needle = token.to_ascii_lowercase();
    let bytes = haystack.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    haystack.match_indices(&needle).any(|(start, m)| {
        let end = start + m.len();
        let left = start == 0 || !is_word(bytes[start - 1]);
        let right = end == bytes.len() || !is_word(bytes[end]);
        left || right
    })
}

/// Scans the corpora for records annotated with `gene_token`.
///
/// Returns [`CurationError::EmptyResult`] when nothing survives, naming
/// whether the zero came before or after negative-pattern exclusion.
pub fn retrieve(
    paths: &[PathBuf],
    gene_token: &str,
    negative_pattern: Option<&Regex>,
) -> Result<Retrieval, CurationError> {
    let token = gene_token.trim();
    if token.is_empty() {
        return Err(CurationError::InvalidParameter {
            name: "gene_token",
            detail: "must not be empty".to_string(),
        });
    }

    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut records = Vec::new();
    let mut provenance = Vec::new();
    let mut header_matches = 0usize;
    let mut excluded = 0usize;

    let stats = store::scan(paths, |path, record| {
        if !matches_gene_token(&record.description, token) {
            return;
        }
        header_matches += 1;
        if negative_pattern.is_some_and(|re| re.is_match(&record.description)) {
            excluded += 1;
            return;
        }
        if !seen.insert(record.id.clone()) {
            return;
        }
        let src = paths
            .iter()
            .position(|p| p.as_path() == path)
            .unwrap_or_default();
        records.push(record);
        provenance.push(src);
    })?;

    log::info!("        Headers matching '{}': {}", token, header_matches);
    if excluded > 0 {
        log::info!("        Excluded by negative pattern: {}", excluded);
    }

    if records.is_empty() {
        let detail = if header_matches > 0 {
            format!("0 candidates after negative-pattern exclusion of {} matches", excluded)
        } else {
            "no description matched the gene token".to_string()
        };
        return Err(CurationError::empty(
            "retrieval",
            "",
            0,
            format!("{} for gene token '{}'", detail, token),
        ));
    }

    Ok(Retrieval {
        candidates: CandidateSet {
            corpus: Corpus::new(records),
            sources: paths.to_vec(),
            provenance,
        },
        header_matches,
        excluded,
        skipped: stats.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn corpus_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_token_boundaries() {
        assert!(matches_gene_token("WP_1 methyl-coenzyme M reductase McrA", "mcrA"));
        assert!(matches_gene_token("WP_1 McrA_2 fragment", "mcra"));
        assert!(matches_gene_token("mcrA", "mcrA"));
        // boundary on the right only
        assert!(matches_gene_token("WP_1 pmcrA protein", "mcrA"));
        // no boundary on either side
        assert!(!matches_gene_token("WP_1 xmcrAb protein", "mcrA"));
        assert!(!matches_gene_token("WP_1 unrelated", "mcrA"));
        assert!(!matches_gene_token("anything", ""));
    }

    #[test]
    fn test_negative_pattern_only_prunes_positive_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(
            dir.path(),
            "pan.faa",
            ">a nifH nitrogenase\nMKV\n>b nifH-like protein\nMKK\n>c dnaK chaperone\nMAA\n",
        );
        let paths = vec![path];

        let without = retrieve(&paths, "nifH", None).unwrap();
        assert_eq!(without.candidates.ids().collect::<Vec<_>>(), vec!["a", "b"]);

        let neg = Regex::new("(?i)-like").unwrap();
        let with = retrieve(&paths, "nifH", Some(&neg)).unwrap();
        assert_eq!(with.candidates.ids().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(with.header_matches, 2);
        assert_eq!(with.excluded, 1);

        // "c" matches neither token nor pattern and never appears
        let chaperone = Regex::new("chaperone").unwrap();
        let r = retrieve(&paths, "nifH", Some(&chaperone)).unwrap();
        assert!(!r.candidates.ids().any(|id| id == "c"));
        assert_eq!(r.excluded, 0);
    }

    #[test]
    fn test_empty_retrieval_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = corpus_file(dir.path(), "pan.faa", ">a dnaK chaperone\nMAA\n");
        let err = retrieve(&[path], "mcrA", None).unwrap_err();
        match err {
            CurationError::EmptyResult { stage, count, unit, detail } => {
                assert_eq!(stage, "retrieval");
                assert_eq!(count, 0);
                assert!(unit.is_empty());
                assert!(detail.contains("'mcrA'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_provenance_tracks_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = corpus_file(dir.path(), "a.faa", ">x1 amoA\nMK\n");
        let b = corpus_file(dir.path(), "b.faa", ">x2 amoA\nMKK\n");
        let r = retrieve(&[a.clone(), b.clone()], "amoA", None).unwrap();
        assert_eq!(r.candidates.source_of(0), Some(a.as_path()));
        assert_eq!(r.candidates.source_of(1), Some(b.as_path()));

        let kept = r.candidates.retain(|rec| rec.id == "x2");
        assert_eq!(kept.source_of(0), Some(b.as_path()));
    }
}
