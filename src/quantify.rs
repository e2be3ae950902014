//! Quantifier
//!
//! Counts reads in a metagenomic sample that hit a gene family's search
//! database. Each sample is searched independently and returns its count as
//! a value; accumulation into a results table is left to the caller.
//!
//! # Counting Rule
//! A read counts once when its best hit has e-value <= 1e-10. The search
//! engine is asked for a single best target per read; the count is taken
//! over distinct read ids, so a read reported on several frames or HSPs is
//! not counted twice.

use anyhow::{Context, Result};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::CurationError;
use crate::hits::SearchHit;
use crate::tools::{SearchEngine, SEARCH_EVALUE};

/// Read-file suffixes recognised during sample discovery, longest first.
const READ_SUFFIXES: &[&str] = &[
    ".fastq.gz", ".fasta.gz", ".fq.gz", ".fa.gz", ".fna.gz",
    ".fastq", ".fasta", ".fq", ".fa", ".fna",
];

// ============================================================================
// Samples
// ============================================================================

/// One metagenomic sample: a name and its reads file (optionally gzipped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub reads: PathBuf,
}

impl Sample {
    /// Derives the sample name from the reads file name.
    pub fn from_path(reads: PathBuf) -> Self {
        let name = reads
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| sample_id(n).unwrap_or(n).to_string())
            .unwrap_or_else(|| reads.display().to_string());
        Self { name, reads }
    }
}

/// File name without a recognised read suffix.
fn sample_id(filename: &str) -> Option<&str> {
    READ_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))
        .filter(|id| !id.is_empty())
}

/// Every reads file in `dir`, sorted by sample name.
pub fn find_samples_in_dir(dir: &Path) -> Result<Vec<Sample>> {
    let mut samples: BTreeMap<String, PathBuf> = BTreeMap::new();

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(id) = path.file_name().and_then(|n| n.to_str()).and_then(sample_id) else {
            continue;
        };
        if let Some(previous) = samples.insert(id.to_string(), path.clone()) {
            anyhow::bail!(
                "Sample '{}' has more than one reads file: {:?} and {:?}",
                id,
                previous,
                path
            );
        }
    }

    if samples.is_empty() {
        anyhow::bail!("No read files found in {:?}", dir);
    }
    Ok(samples
        .into_iter()
        .map(|(name, reads)| Sample { name, reads })
        .collect())
}

fn find_reads_for_id(base_dir: &Path, id: &str) -> Result<PathBuf> {
    for suffix in READ_SUFFIXES {
        let candidate = base_dir.join(format!("{}{}", id, suffix));
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    anyhow::bail!(
        "Cannot find reads for '{}' in {:?}. Expected e.g. {}.fastq.gz",
        id,
        base_dir,
        id
    )
}

/// Samples from a directory, or from a list file of sample ids / paths
/// (one per line, '#' comments allowed, relative to the list's directory).
pub fn parse_samples(list_or_dir: &Path) -> Result<Vec<Sample>> {
    if list_or_dir.is_dir() {
        return find_samples_in_dir(list_or_dir);
    }

    let file = File::open(list_or_dir)
        .with_context(|| format!("Failed to open samples file: {:?}", list_or_dir))?;
    let base_dir = list_or_dir.parent().unwrap_or(Path::new("."));
    let mut samples = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let as_path = base_dir.join(entry);
        if as_path.is_file() {
            samples.push(Sample::from_path(as_path));
        } else {
            samples.push(Sample {
                name: entry.to_string(),
                reads: find_reads_for_id(base_dir, entry)?,
            });
        }
    }
    ensure_unique_names(&samples)?;
    Ok(samples)
}

/// Fails when two samples share a name; their scratch directories and
/// result rows would collide.
pub fn ensure_unique_names(samples: &[Sample]) -> Result<()> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for sample in samples {
        if !seen.insert(sample.name.as_str()) {
            anyhow::bail!(
                "Duplicate sample name '{}' ({:?}); rename the reads file",
                sample.name,
                sample.reads
            );
        }
    }
    Ok(())
}

// ============================================================================
// Counting
// ============================================================================

/// Abundance of one gene family in one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCount {
    pub sample: String,
    pub gene_family: String,
    pub count: usize,
}

/// Distinct reads with a significant hit.
pub fn count_hits(hits: &[SearchHit]) -> usize {
    hits.iter()
        .filter(|h| h.is_significant(SEARCH_EVALUE))
        .map(|h| h.query.as_str())
        .collect::<FxHashSet<&str>>()
        .len()
}

/// Searches one sample and counts its family hits.
///
/// `workdir` holds the engine's raw output and is left for the caller to
/// keep or remove.
pub fn quantify_sample(
    sample: &Sample,
    gene_family: &str,
    db: &Path,
    engine: &dyn SearchEngine,
    workdir: &Path,
) -> Result<SampleCount, CurationError> {
    if !sample.reads.exists() {
        return Err(CurationError::source_unavailable(&sample.reads, "reads file does not exist"));
    }
    if !db.exists() {
        return Err(CurationError::source_unavailable(db, "search database does not exist"));
    }
    fs::create_dir_all(workdir)
        .map_err(|e| CurationError::source_unavailable(workdir, e.to_string()))?;

    let hits = engine
        .search(db, &sample.reads, workdir)
        .map_err(|e| CurationError::tool(engine.name(), sample.name.as_str(), e))?;
    let count = count_hits(&hits);

    log::info!("{}: {} reads hit {}", sample.name, count, gene_family);
    Ok(SampleCount {
        sample: sample.name.clone(),
        gene_family: gene_family.to_string(),
        count,
    })
}

/// Options for [`quantify_all`].
#[derive(Debug, Clone)]
pub struct QuantifyOptions {
    pub gene_family: String,
    pub db: PathBuf,
    /// Parent of per-sample scratch directories.
    pub workdir: PathBuf,
    pub keep_temp: bool,
}

/// Quantifies samples in parallel. One sample's failure never affects
/// another; results come back in input order. Samples whose name is not
/// unique are rejected without being searched.
pub fn quantify_all(
    samples: &[Sample],
    options: &QuantifyOptions,
    engine: &dyn SearchEngine,
) -> Vec<(String, Result<SampleCount, CurationError>)> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for sample in samples {
        *counts.entry(sample.name.as_str()).or_default() += 1;
    }

    samples
        .par_iter()
        .map(|sample| {
            if counts[sample.name.as_str()] > 1 {
                let err = CurationError::InvalidParameter {
                    name: "sample",
                    detail: format!("sample name '{}' is used by more than one reads file", sample.name),
                };
                log::error!("ERROR processing {}: {}", sample.name, err);
                return (sample.name.clone(), Err(err));
            }
            let workdir = options.workdir.join(&sample.name);
            let result = quantify_sample(sample, &options.gene_family, &options.db, engine, &workdir);
            if let Err(e) = &result {
                log::error!("ERROR processing {}: {}", sample.name, e);
            }
            if !options.keep_temp {
                let _ = fs::remove_dir_all(&workdir);
            }
            (sample.name.clone(), result)
        })
        .collect()
}

// ============================================================================
// Results Table
// ============================================================================

/// Counts keyed by gene family then sample, accumulated by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsTable {
    rows: BTreeMap<String, BTreeMap<String, usize>>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a count; a repeated (family, sample) pair replaces the old one.
    pub fn insert(&mut self, count: SampleCount) {
        self.rows
            .entry(count.gene_family)
            .or_default()
            .insert(count.sample, count.count);
    }

    pub fn get(&self, gene_family: &str, sample: &str) -> Option<usize> {
        self.rows.get(gene_family)?.get(sample).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Long format: one `Gene_Family  Sample  Count` row per entry.
    pub fn write_long_tsv(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        writeln!(out, "Gene_Family\tSample\tCount")?;
        for (family, samples) in &self.rows {
            for (sample, count) in samples {
                writeln!(out, "{}\t{}\t{}", family, sample, count)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Wide format: samples as rows, gene families as columns, 0 for gaps.
    pub fn write_matrix_tsv(&self, path: &Path) -> Result<()> {
        let families: Vec<&String> = self.rows.keys().collect();
        let samples: BTreeSet<&String> = self.rows.values().flat_map(|s| s.keys()).collect();

        let mut out = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        write!(out, "Sample")?;
        for family in &families {
            write!(out, "\t{}", family)?;
        }
        writeln!(out)?;
        for sample in samples {
            write!(out, "{}", sample)?;
            for family in &families {
                write!(out, "\t{}", self.get(family, sample).unwrap_or(0))?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }
}
