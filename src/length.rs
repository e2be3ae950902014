//! Length Filter
//!
//! Removes candidates outside an admissible length band whose upper bound
//! is derived from the family's own length distribution:
//!
//! ```text
//! max = N50(lengths of the full candidate pool) + margin
//! ```
//!
//! A family of long multi-domain proteins gets a long cap and a family of
//! short proteins a short one, while fusion-protein artifacts far beyond the
//! bulk of the distribution are discarded.

use crate::retriever::CandidateSet;

/// Added to N50 to form the upper bound.
pub const DEFAULT_LENGTH_MARGIN: usize = 20;

/// Default lower bound in residues.
pub const DEFAULT_MIN_LEN: usize = 100;

/// N50 of a length distribution.
///
/// The length L of the first sequence, walking from longest to shortest,
/// at which the cumulative length reaches at least half the total. This is
/// not the median: `[100, 100, 100, 400]` gives 400.
pub fn n50(lengths: &[usize]) -> Option<usize> {
    if lengths.is_empty() {
        return None;
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let total: usize = sorted.iter().sum();
    let mut cumulative = 0usize;
    for len in &sorted {
        cumulative += len;
        if cumulative * 2 >= total {
            return Some(*len);
        }
    }
    sorted.last().copied()
}

/// Inclusive admissible length range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBand {
    pub min: usize,
    pub max: usize,
    /// N50 the upper bound was derived from.
    pub n50: usize,
}

impl LengthBand {
    /// Derives the band from every candidate's length.
    ///
    /// `min` is clamped to at least 1 and `max` to at least `min`.
    /// Returns `None` for an empty candidate pool.
    pub fn derive(candidates: &CandidateSet, min_len: usize, margin: usize) -> Option<Self> {
        let n50 = n50(&candidates.corpus().lengths())?;
        let min = min_len.max(1);
        Some(Self {
            min,
            max: (n50 + margin).max(min),
            n50,
        })
    }

    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

/// Output of [`filter`].
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub kept: CandidateSet,
    /// `None` when the input was empty and the filter was skipped.
    pub band: Option<LengthBand>,
}

/// Applies the N50-derived band with the default margin.
pub fn filter(candidates: &CandidateSet, min_len: usize) -> FilterOutcome {
    filter_with_margin(candidates, min_len, DEFAULT_LENGTH_MARGIN)
}

pub fn filter_with_margin(candidates: &CandidateSet, min_len: usize, margin: usize) -> FilterOutcome {
    match LengthBand::derive(candidates, min_len, margin) {
        Some(band) => {
            log::debug!(
                "Length band for {} candidates: N50={} -> [{}, {}]",
                candidates.len(),
                band.n50,
                band.min,
                band.max
            );
            FilterOutcome {
                kept: filter_with_band(candidates, &band),
                band: Some(band),
            }
        }
        None => {
            log::warn!("Length filter skipped: candidate set is empty");
            FilterOutcome {
                kept: candidates.clone(),
                band: None,
            }
        }
    }
}

/// Retains candidates whose length lies in `band`.
pub fn filter_with_band(candidates: &CandidateSet, band: &LengthBand) -> CandidateSet {
    candidates.retain(|r| band.contains(r.len()))
}
