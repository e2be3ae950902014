//! Error taxonomy for curation and quantification runs.
//!
//! Every fatal condition is scoped to one unit of work (a gene family or a
//! sample) and names the stage, the unit and the count that triggered it.
//! Data-quality problems are not errors; they travel as
//! [`DataQualityWarning`] values alongside successful results.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal error for a single gene family or sample.
#[derive(Error, Debug)]
pub enum CurationError {
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("{stage}: {count} records for {unit} ({detail})")]
    EmptyResult {
        stage: &'static str,
        unit: String,
        count: usize,
        detail: String,
    },

    #[error("{stage}: internal inconsistency for {unit}: {detail}")]
    InternalInconsistency {
        stage: &'static str,
        unit: String,
        detail: String,
    },

    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: &'static str, detail: String },

    #[error("{tool} failed for {unit}: {source:#}")]
    Tool {
        tool: &'static str,
        unit: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CurationError {
    pub fn source_unavailable<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn empty<U: Into<String>, D: Into<String>>(
        stage: &'static str,
        unit: U,
        count: usize,
        detail: D,
    ) -> Self {
        Self::EmptyResult {
            stage,
            unit: unit.into(),
            count,
            detail: detail.into(),
        }
    }

    pub fn inconsistency<U: Into<String>, D: Into<String>>(
        stage: &'static str,
        unit: U,
        detail: D,
    ) -> Self {
        Self::InternalInconsistency {
            stage,
            unit: unit.into(),
            detail: detail.into(),
        }
    }

    pub fn tool<U: Into<String>>(tool: &'static str, unit: U, source: anyhow::Error) -> Self {
        Self::Tool {
            tool,
            unit: unit.into(),
            source,
        }
    }

    /// Attaches the gene family or sample name when the stage that raised
    /// the error did not know it.
    pub fn in_unit(mut self, name: &str) -> Self {
        match &mut self {
            Self::EmptyResult { unit, .. }
            | Self::InternalInconsistency { unit, .. }
            | Self::Tool { unit, .. } => {
                if unit.is_empty() {
                    *unit = name.to_string();
                }
            }
            Self::SourceUnavailable { .. } | Self::InvalidParameter { .. } => {}
        }
        self
    }

    /// Short machine-friendly label, used in summary tables.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::EmptyResult { .. } => "EmptyResult",
            Self::InternalInconsistency { .. } => "InternalInconsistency",
            Self::InvalidParameter { .. } => "InvalidParameter",
            Self::Tool { .. } => "ToolFailure",
        }
    }
}

/// Non-fatal data-quality signal raised during curation.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityWarning {
    /// Candidate ids absent from the reference proteome corpus.
    UnverifiedCandidates { missing: usize, checked: usize },
    /// Positive matches removed by the negative pattern.
    NegativeMatchesExcluded { excluded: usize },
    /// Malformed records skipped while loading a corpus.
    MalformedRecords { skipped: usize },
    /// The length filter received no records.
    EmptyLengthFilterInput,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnverifiedCandidates { missing, checked } => {
                write!(f, "{}/{} candidates not found in reference proteomes", missing, checked)
            }
            Self::NegativeMatchesExcluded { excluded } => {
                write!(f, "{} candidates excluded by negative pattern", excluded)
            }
            Self::MalformedRecords { skipped } => {
                write!(f, "{} malformed records skipped", skipped)
            }
            Self::EmptyLengthFilterInput => write!(f, "length filter skipped: no candidates"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_message_names_stage_unit_and_count() {
        let err = CurationError::empty("retrieval", "mcrA", 0, "after negative-pattern exclusion");
        assert_eq!(
            err.to_string(),
            "retrieval: 0 records for mcrA (after negative-pattern exclusion)"
        );
        assert_eq!(err.kind(), "EmptyResult");
    }

    #[test]
    fn test_tool_error_includes_cause() {
        let err = CurationError::tool("mafft", "mcrA", anyhow::anyhow!("exit code 1"));
        assert!(err.to_string().contains("mafft failed for mcrA"));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_in_unit_fills_only_blank_units() {
        let err = CurationError::empty("gap trimming", "", 0, "all rows too gappy").in_unit("amoA");
        assert!(err.to_string().contains("for amoA"));
        let err = CurationError::empty("retrieval", "nifH", 0, "x").in_unit("amoA");
        assert!(err.to_string().contains("for nifH"));
    }

    #[test]
    fn test_warning_display() {
        let w = DataQualityWarning::UnverifiedCandidates { missing: 3, checked: 10 };
        assert_eq!(w.to_string(), "3/10 candidates not found in reference proteomes");
    }
}
