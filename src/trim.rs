//! Gap Trimmer
//!
//! Drops aligned records whose gap fraction exceeds a threshold, using only
//! the alignment's column structure. Control records anchor the alignment
//! and are never carried into the clean set.

use rustc_hash::FxHashSet;

use crate::alignment::Alignment;
use crate::error::CurationError;

/// Default maximum gap fraction.
pub const DEFAULT_GAP_THRESHOLD: f64 = 0.3;

/// Ids that survived trimming, in alignment row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSet {
    ids: Vec<String>,
}

impl CleanSet {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id_set(&self) -> FxHashSet<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The cleaned alignment: rows of `alignment` whose id is in this set.
    pub fn select(&self, alignment: &Alignment) -> Alignment {
        let keep = self.id_set();
        alignment.select(|row| keep.contains(&row.id))
    }
}

/// Rejects thresholds outside the open interval (0, 1).
pub fn validate_threshold(gap_threshold: f64) -> Result<(), CurationError> {
    if gap_threshold > 0.0 && gap_threshold < 1.0 {
        Ok(())
    } else {
        Err(CurationError::InvalidParameter {
            name: "gap_threshold",
            detail: format!("{} is outside (0, 1)", gap_threshold),
        })
    }
}

/// Keeps non-control rows whose gap fraction does not exceed `gap_threshold`.
///
/// Rows are dropped only when their fraction is strictly greater than the
/// threshold, so a row exactly at the threshold is retained. An empty result is
/// [`CurationError::EmptyResult`]; callers attach the family name.
pub fn trim(
    alignment: &Alignment,
    gap_threshold: f64,
    control_ids: &FxHashSet<String>,
) -> Result<CleanSet, CurationError> {
    validate_threshold(gap_threshold)?;

    let mut ids = Vec::new();
    let mut too_gappy = 0usize;
    for gaps in alignment.gap_profile() {
        if control_ids.contains(gaps.id) {
            continue;
        }
        if gaps.value() > gap_threshold {
            too_gappy += 1;
            log::debug!("Dropping {}: gap fraction {:.3}", gaps.id, gaps.value());
            continue;
        }
        ids.push(gaps.id.to_string());
    }

    if ids.is_empty() {
        return Err(CurationError::empty(
            "gap trimming",
            "",
            0,
            format!(
                "{} of {} aligned rows exceed gap fraction {}",
                too_gappy,
                alignment.len(),
                gap_threshold
            ),
        ));
    }
    Ok(CleanSet { ids })
}
