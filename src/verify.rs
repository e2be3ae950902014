//! Annotation Verifier
//!
//! Advisory cross-check of retrieved candidate ids against an independently
//! curated reference proteome corpus. Misses never halt curation.

use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::CurationError;
use crate::store;

/// Outcome of [`verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Distinct candidate ids checked.
    pub checked: usize,
    /// Candidate ids present in the reference corpus.
    pub found: usize,
    /// Candidate ids absent from the reference corpus.
    pub missing: BTreeSet<String>,
}

impl VerificationReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Writes missing ids, one per line, under a header row.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "# checked={}\tfound={}\tmissing={}", self.checked, self.found, self.missing.len())?;
        writeln!(out, "Missing_ID")?;
        for id in &self.missing {
            writeln!(out, "{}", id)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Keys under which a reference id can match a candidate.
///
/// UniProt-style ids (`sp|P0A7V0|RS2_ECOLI`) also match on the accession.
fn reference_keys(id: &str) -> impl Iterator<Item = &str> {
    let accession = id.split('|').nth(1).filter(|acc| !acc.is_empty());
    std::iter::once(id).chain(accession)
}

/// Checks which candidate ids occur in the reference proteome corpus.
pub fn verify(
    candidate_ids: &FxHashSet<String>,
    reference_paths: &[PathBuf],
) -> Result<VerificationReport, CurationError> {
    let mut found: FxHashSet<String> = FxHashSet::default();

    store::scan(reference_paths, |_, record| {
        for key in reference_keys(&record.id) {
            if candidate_ids.contains(key) && !found.contains(key) {
                found.insert(key.to_string());
            }
        }
    })?;

    let missing: BTreeSet<String> = candidate_ids
        .iter()
        .filter(|id| !found.contains(*id))
        .cloned()
        .collect();

    let report = VerificationReport {
        checked: candidate_ids.len(),
        found: found.len(),
        missing,
    };

    log::info!(
        "        Proteome cross-check: {}/{} candidates found",
        report.found,
        report.checked
    );
    if !report.is_complete() {
        log::warn!(
            "{} candidate id(s) absent from reference proteomes",
            report.missing.len()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> FxHashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reference_keys() {
        let keys: Vec<&str> = reference_keys("sp|P0A7V0|RS2_ECOLI").collect();
        assert_eq!(keys, vec!["sp|P0A7V0|RS2_ECOLI", "P0A7V0"]);
        let plain: Vec<&str> = reference_keys("WP_000001.1").collect();
        assert_eq!(plain, vec!["WP_000001.1"]);
    }

    #[test]
    fn test_verify_counts_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.faa");
        std::fs::write(&path, ">tr|A0A001|X_Y desc\nMK\n>WP_2.1 other\nMKK\n").unwrap();

        let report = verify(&ids(&["A0A001", "WP_2.1", "WP_9.1"]), &[path]).unwrap();
        assert_eq!(report.checked, 3);
        assert_eq!(report.found, 2);
        assert_eq!(report.missing.into_iter().collect::<Vec<_>>(), vec!["WP_9.1"]);
    }

    #[test]
    fn test_unreadable_reference_is_source_unavailable() {
        let err = verify(&ids(&["a"]), &[PathBuf::from("/no/such/ref.faa")]).unwrap_err();
        assert!(matches!(err, CurationError::SourceUnavailable { .. }));
    }
}
