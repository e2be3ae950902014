//! Family Manifest
//!
//! Batch curation reads its gene families from a TOML manifest:
//!
//! ```toml
//! [defaults]
//! min_len = 100
//! gap_threshold = 0.3
//!
//! [[family]]
//! name = "mcrA"
//!
//! [[family]]
//! name = "amoA_AOB"
//! gene = "amoA"
//! negative = "(?i)archaea|partial"
//! min_len = 200
//! ```
//!
//! `gene` defaults to `name`; per-family values override `[defaults]`.

use anyhow::{Context, Result};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::Path;

use crate::error::CurationError;
use crate::length::{DEFAULT_LENGTH_MARGIN, DEFAULT_MIN_LEN};
use crate::trim::{validate_threshold, DEFAULT_GAP_THRESHOLD};

/// Curation parameters for one gene family.
#[derive(Debug, Clone)]
pub struct CurationConfig {
    /// Name used for output files and diagnostics.
    pub family: String,
    /// Token searched for in record descriptions.
    pub gene_token: String,
    /// Pattern pruning false positives from the positive matches.
    pub negative_pattern: Option<Regex>,
    pub min_len: usize,
    pub gap_threshold: f64,
    /// Added to N50 to form the length cap.
    pub length_margin: usize,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            family: String::new(),
            gene_token: String::new(),
            negative_pattern: None,
            min_len: DEFAULT_MIN_LEN,
            gap_threshold: DEFAULT_GAP_THRESHOLD,
            length_margin: DEFAULT_LENGTH_MARGIN,
        }
    }
}

impl CurationConfig {
    /// Config for a gene whose family name equals its token.
    pub fn for_gene(gene: &str) -> Self {
        Self {
            family: gene.to_string(),
            gene_token: gene.to_string(),
            ..Default::default()
        }
    }

    /// Compiles and sets the negative pattern.
    pub fn with_negative(mut self, pattern: Option<&str>) -> Result<Self, CurationError> {
        self.negative_pattern = pattern.map(compile_negative).transpose()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CurationError> {
        if self.family.trim().is_empty() || self.family.contains(['/', '\\']) {
            return Err(CurationError::InvalidParameter {
                name: "family",
                detail: format!("'{}' is not usable as a file name", self.family),
            });
        }
        if self.gene_token.trim().is_empty() {
            return Err(CurationError::InvalidParameter {
                name: "gene_token",
                detail: "must not be empty".to_string(),
            });
        }
        if self.min_len == 0 {
            return Err(CurationError::InvalidParameter {
                name: "min_len",
                detail: "must be at least 1".to_string(),
            });
        }
        validate_threshold(self.gap_threshold)
    }
}

fn compile_negative(pattern: &str) -> Result<Regex, CurationError> {
    Regex::new(pattern).map_err(|e| CurationError::InvalidParameter {
        name: "negative_pattern",
        detail: e.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDefaults {
    pub min_len: Option<usize>,
    pub gap_threshold: Option<f64>,
    pub length_margin: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyEntry {
    pub name: String,
    pub gene: Option<String>,
    pub negative: Option<String>,
    pub min_len: Option<usize>,
    pub gap_threshold: Option<f64>,
    pub length_margin: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FamilyManifest {
    #[serde(default)]
    pub defaults: ManifestDefaults,
    #[serde(default, rename = "family")]
    pub families: Vec<FamilyEntry>,
}

impl FamilyManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text)?;
        if manifest.families.is_empty() {
            anyhow::bail!("manifest lists no [[family]] entries");
        }
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for entry in &manifest.families {
            if !seen.insert(entry.name.as_str()) {
                anyhow::bail!("family '{}' is listed more than once", entry.name);
            }
        }
        Ok(manifest)
    }

    /// Resolves every entry against the defaults. Entries that fail to
    /// resolve come back as errors so the batch can skip them individually.
    pub fn configs(&self) -> Vec<(String, Result<CurationConfig, CurationError>)> {
        self.families
            .iter()
            .map(|entry| (entry.name.clone(), self.resolve(entry)))
            .collect()
    }

    fn resolve(&self, entry: &FamilyEntry) -> Result<CurationConfig, CurationError> {
        let d = &self.defaults;
        let config = CurationConfig {
            family: entry.name.clone(),
            gene_token: entry.gene.clone().unwrap_or_else(|| entry.name.clone()),
            negative_pattern: None,
            min_len: entry.min_len.or(d.min_len).unwrap_or(DEFAULT_MIN_LEN),
            gap_threshold: entry
                .gap_threshold
                .or(d.gap_threshold)
                .unwrap_or(DEFAULT_GAP_THRESHOLD),
            length_margin: entry
                .length_margin
                .or(d.length_margin)
                .unwrap_or(DEFAULT_LENGTH_MARGIN),
        }
        .with_negative(entry.negative.as_deref())?;
        config.validate()?;
        Ok(config)
    }
}
