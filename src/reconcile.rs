//! Seed Reconciler
//!
//! Maps ids that survived gap trimming back to their original, unaligned
//! candidate records.

use rustc_hash::FxHashSet;

use crate::error::CurationError;
use crate::retriever::CandidateSet;
use crate::store::Corpus;
use crate::trim::CleanSet;

/// Unaligned records for exactly `clean_ids`, in original candidate order.
///
/// Every clean id must trace back to the candidate pool; an id that does not
/// is [`CurationError::InternalInconsistency`].
pub fn reconcile(
    clean_ids: &FxHashSet<String>,
    original_candidates: &CandidateSet,
) -> Result<Corpus, CurationError> {
    let subset = original_candidates.corpus().subset(clean_ids);

    if subset.missing > 0 {
        let present: FxHashSet<&str> = subset.corpus.ids().collect();
        let mut absent: Vec<&str> = clean_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !present.contains(id))
            .collect();
        absent.sort_unstable();
        return Err(CurationError::inconsistency(
            "seed reconciliation",
            "",
            format!(
                "{} clean id(s) have no original candidate record: {}",
                absent.len(),
                absent.join(", ")
            ),
        ));
    }
    Ok(subset.corpus)
}

/// Convenience wrapper taking the trimmer's output directly.
pub fn reconcile_clean_set(
    clean: &CleanSet,
    original_candidates: &CandidateSet,
) -> Result<Corpus, CurationError> {
    reconcile(&clean.id_set(), original_candidates)
}
