//! Curation Pipeline
//!
//! Runs the curation chain for one gene family, strictly in order:
//!
//! ```text
//! [1] retrieve   pangenome corpus  -> CandidateSet
//! [2] verify     candidate ids     -> VerificationReport (advisory)
//! [3] filter     CandidateSet      -> length-filtered CandidateSet
//! [4] align      filtered+controls -> Alignment          (external)
//! [5] trim       Alignment         -> CleanSet
//! [6] reconcile  CleanSet          -> seed Corpus
//! [7] build      clean alignment   -> profile, search db (external)
//! ```
//!
//! Stages exchange in-memory values. Files are read only at the start
//! (corpora) and written only at the end (artifacts under the family's
//! output directory). Families are independent; [`curate_all`] runs them
//! in parallel and isolates their failures.

use anyhow::Context;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::alignment::Alignment;
use crate::config::CurationConfig;
use crate::error::{CurationError, DataQualityWarning};
use crate::length::{self, LengthBand};
use crate::reconcile::reconcile_clean_set;
use crate::retriever::{self, CandidateSet};
use crate::store::Corpus;
use crate::tools::{Aligner, ProfileBuilder, SearchEngine};
use crate::trim::{self, CleanSet};
use crate::verify::{self, VerificationReport};

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Corpora shared by every family in a run.
#[derive(Debug, Clone)]
pub struct CurationInputs {
    /// Pangenome protein corpus files.
    pub pangenome: Vec<PathBuf>,
    /// Reference proteome corpus files for the advisory cross-check.
    pub reference: Vec<PathBuf>,
    /// Control records injected into every alignment.
    pub controls: Corpus,
}

/// External tools used by [`run_family`].
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub aligner: &'a dyn Aligner,
    pub profile_builder: &'a dyn ProfileBuilder,
    /// Builds the search database from the seeds when present.
    pub search_engine: Option<&'a dyn SearchEngine>,
}

/// Counts reported for every family, successful or not far enough to fail.
#[derive(Debug, Clone, Default)]
pub struct CurationDiagnostics {
    /// Headers matching the gene token.
    pub header_matches: usize,
    /// Positive matches removed by the negative pattern.
    pub excluded: usize,
    /// Candidates retrieved (seed pool).
    pub seed_count: usize,
    pub verification: VerificationReport,
    pub band: Option<LengthBand>,
    pub post_filter: usize,
    /// Rows in the alignment, controls included.
    pub aligned_rows: usize,
    pub post_trim: usize,
    pub warnings: Vec<DataQualityWarning>,
}

/// In-memory result of stages 1-6.
#[derive(Debug, Clone)]
pub struct CuratedFamily {
    pub family: String,
    pub candidates: CandidateSet,
    pub clean: CleanSet,
    /// Aligned, gap-trimmed records: the profile builder's input.
    pub clean_alignment: Alignment,
    /// Unaligned records for the clean ids.
    pub seeds: Corpus,
    pub diagnostics: CurationDiagnostics,
}

/// Files written by [`run_family`].
#[derive(Debug, Clone)]
pub struct CurationArtifacts {
    pub alignment: PathBuf,
    pub seeds: PathBuf,
    pub verification: PathBuf,
    pub profile: PathBuf,
    pub search_db: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CurationOutcome {
    pub curated: CuratedFamily,
    pub artifacts: CurationArtifacts,
}

// ============================================================================
// Stages 1-6
// ============================================================================

/// Runs retrieval through reconciliation for one family.
///
/// `workdir` is handed to the aligner for scratch files.
pub fn curate(
    config: &CurationConfig,
    inputs: &CurationInputs,
    aligner: &dyn Aligner,
    workdir: &Path,
) -> Result<CuratedFamily, CurationError> {
    config.validate()?;
    let family = config.family.as_str();
    if inputs.controls.is_empty() {
        return Err(CurationError::InvalidParameter {
            name: "controls",
            detail: "at least one control record is required".to_string(),
        });
    }
    let mut diag = CurationDiagnostics::default();

    log::info!("  [1/7] {}: retrieving candidates for '{}'...", family, config.gene_token);
    let retrieval = retriever::retrieve(
        &inputs.pangenome,
        &config.gene_token,
        config.negative_pattern.as_ref(),
    )
    .map_err(|e| e.in_unit(family))?;
    let candidates = retrieval.candidates;
    diag.header_matches = retrieval.header_matches;
    diag.excluded = retrieval.excluded;
    diag.seed_count = candidates.len();
    if retrieval.excluded > 0 {
        diag.warnings.push(DataQualityWarning::NegativeMatchesExcluded {
            excluded: retrieval.excluded,
        });
    }
    if retrieval.skipped > 0 {
        diag.warnings.push(DataQualityWarning::MalformedRecords {
            skipped: retrieval.skipped,
        });
    }
    log::info!("        Seeds retrieved: {}", diag.seed_count);

    log::info!("  [2/7] {}: cross-checking reference proteomes...", family);
    diag.verification = verify::verify(&candidates.id_set(), &inputs.reference)?;
    if !diag.verification.is_complete() {
        diag.warnings.push(DataQualityWarning::UnverifiedCandidates {
            missing: diag.verification.missing.len(),
            checked: diag.verification.checked,
        });
    }

    log::info!("  [3/7] {}: filtering by length...", family);
    let filtered = length::filter_with_margin(&candidates, config.min_len, config.length_margin);
    if filtered.band.is_none() {
        diag.warnings.push(DataQualityWarning::EmptyLengthFilterInput);
    }
    diag.band = filtered.band;
    diag.post_filter = filtered.kept.len();
    if let Some(band) = &diag.band {
        log::info!(
            "        N50={} band=[{}, {}] kept {}/{}",
            band.n50,
            band.min,
            band.max,
            diag.post_filter,
            candidates.len()
        );
    }
    if filtered.kept.is_empty() {
        return Err(CurationError::empty(
            "length filter",
            family,
            0,
            format!("none of {} candidates inside the length band", candidates.len()),
        ));
    }

    log::info!("  [4/7] {}: aligning {} records + {} control(s)...",
        family, filtered.kept.len(), inputs.controls.len());
    let control_ids: FxHashSet<String> = inputs.controls.ids().map(str::to_string).collect();
    let to_align = alignment_input(&filtered.kept, &inputs.controls, &control_ids)
        .map_err(|e| e.in_unit(family))?;
    let alignment = aligner
        .align(&to_align, workdir)
        .map_err(|e| CurationError::tool(aligner.name(), family, e))?;
    check_alignment_covers(&alignment, &to_align).map_err(|e| e.in_unit(family))?;
    diag.aligned_rows = alignment.len();

    log::info!("  [5/7] {}: trimming rows above gap fraction {}...", family, config.gap_threshold);
    let clean = trim::trim(&alignment, config.gap_threshold, &control_ids)
        .map_err(|e| e.in_unit(family))?;
    diag.post_trim = clean.len();
    log::info!("        Records after trimming: {}", diag.post_trim);

    log::info!("  [6/7] {}: reconciling seeds...", family);
    let seeds = reconcile_clean_set(&clean, &candidates).map_err(|e| e.in_unit(family))?;
    let clean_alignment = clean.select(&alignment);

    for warning in &diag.warnings {
        log::warn!("{}: {}", family, warning);
    }

    Ok(CuratedFamily {
        family: family.to_string(),
        candidates,
        clean,
        clean_alignment,
        seeds,
        diagnostics: diag,
    })
}

/// Filtered candidates followed by the control records.
fn alignment_input(
    filtered: &CandidateSet,
    controls: &Corpus,
    control_ids: &FxHashSet<String>,
) -> Result<Corpus, CurationError> {
    if let Some(clash) = filtered.ids().find(|id| control_ids.contains(*id)) {
        return Err(CurationError::InvalidParameter {
            name: "controls",
            detail: format!("control id '{}' was also retrieved as a candidate", clash),
        });
    }
    Ok(filtered
        .records()
        .iter()
        .chain(controls.iter())
        .cloned()
        .collect())
}

/// The aligner must return exactly the ids it was given.
fn check_alignment_covers(alignment: &Alignment, input: &Corpus) -> Result<(), CurationError> {
    let expected: FxHashSet<&str> = input.ids().collect();
    let got: FxHashSet<&str> = alignment.ids().collect();
    if expected == got {
        return Ok(());
    }
    let missing = expected.difference(&got).count();
    let extra = got.difference(&expected).count();
    Err(CurationError::inconsistency(
        "alignment",
        "",
        format!(
            "aligner returned {} rows for {} inputs ({} missing, {} unexpected)",
            alignment.len(),
            input.len(),
            missing,
            extra
        ),
    ))
}

// ============================================================================
// Stage 7 and persistence
// ============================================================================

/// Curates one family and writes its artifacts under `outdir/<family>/`.
pub fn run_family(
    config: &CurationConfig,
    inputs: &CurationInputs,
    tools: Collaborators<'_>,
    outdir: &Path,
) -> Result<CurationOutcome, CurationError> {
    let family_dir = outdir.join(&config.family);
    fs::create_dir_all(&family_dir)
        .map_err(|e| CurationError::source_unavailable(&family_dir, e.to_string()))?;

    let curated = curate(config, inputs, tools.aligner, &family_dir)?;
    let family = curated.family.as_str();
    let io_err = |e: anyhow::Error| CurationError::tool("artifact writer", family, e);

    log::info!("  [7/7] {}: building profile...", family);
    let alignment_path = family_dir.join(format!("{}.aln.faa", family));
    curated.clean_alignment.write_fasta(&alignment_path).map_err(io_err)?;

    let seeds_path = family_dir.join(format!("{}.seeds.faa", family));
    curated.seeds.write_fasta(&seeds_path).map_err(io_err)?;

    let verification_path = family_dir.join(format!("{}.verification.tsv", family));
    curated
        .diagnostics
        .verification
        .write_tsv(&verification_path)
        .map_err(io_err)?;

    let profile = tools
        .profile_builder
        .build(family, &alignment_path, &family_dir)
        .map_err(|e| CurationError::tool(tools.profile_builder.name(), family, e))?;

    let search_db = match tools.search_engine {
        Some(engine) => Some(
            engine
                .make_db(family, &seeds_path, &family_dir)
                .map_err(|e| CurationError::tool(engine.name(), family, e))?,
        ),
        None => None,
    };

    Ok(CurationOutcome {
        curated,
        artifacts: CurationArtifacts {
            alignment: alignment_path,
            seeds: seeds_path,
            verification: verification_path,
            profile,
            search_db,
        },
    })
}

/// Result of one family in a batch.
pub type FamilyResult = (String, Result<CurationOutcome, CurationError>);

/// Runs every family in parallel. A family's failure is logged and
/// returned; it never aborts the others. Order follows `configs`.
/// Families whose name is not unique share an output directory and are
/// rejected without running.
pub fn curate_all(
    configs: Vec<(String, Result<CurationConfig, CurationError>)>,
    inputs: &CurationInputs,
    tools: Collaborators<'_>,
    outdir: &Path,
) -> Vec<FamilyResult> {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for (name, _) in &configs {
        *counts.entry(name.clone()).or_default() += 1;
    }

    configs
        .into_par_iter()
        .map(|(name, config)| {
            let config = match counts.get(&name) {
                Some(&n) if n > 1 => Err(CurationError::InvalidParameter {
                    name: "family",
                    detail: format!("family '{}' is listed {} times", name, n),
                }),
                _ => config,
            };
            let result = config.and_then(|c| run_family(&c, inputs, tools, outdir));
            if let Err(e) = &result {
                log::error!("ERROR curating {}: {}", name, e);
            }
            (name, result)
        })
        .collect()
}

/// Writes one summary row per family.
pub fn write_summary(results: &[FamilyResult], path: &Path) -> anyhow::Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    writeln!(
        out,
        "Family\tStatus\tHeaders\tExcluded\tSeeds\tVerified\tChecked\tN50\tMax_Len\tPost_Filter\tPost_Trim\tMessage"
    )?;

    for (name, result) in results {
        match result {
            Ok(outcome) => {
                let d = &outcome.curated.diagnostics;
                let (n50, max) = d
                    .band
                    .map(|b| (b.n50.to_string(), b.max.to_string()))
                    .unwrap_or_else(|| ("NA".to_string(), "NA".to_string()));
                let message = d
                    .warnings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                writeln!(
                    out,
                    "{}\tOK\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    name,
                    d.header_matches,
                    d.excluded,
                    d.seed_count,
                    d.verification.found,
                    d.verification.checked,
                    n50,
                    max,
                    d.post_filter,
                    d.post_trim,
                    message
                )?;
            }
            Err(e) => {
                writeln!(out, "{}\t{}\tNA\tNA\tNA\tNA\tNA\tNA\tNA\tNA\tNA\t{}", name, e.kind(), e)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignedRow;
    use crate::store::SequenceRecord;
    use anyhow::Result;

    /// Pads every record to the longest length with trailing gaps.
    struct PadAligner;

    impl Aligner for PadAligner {
        fn name(&self) -> &'static str {
            "pad"
        }

        fn align(&self, records: &Corpus, _workdir: &Path) -> Result<Alignment> {
            let width = records.lengths().into_iter().max().unwrap_or(0);
            Alignment::new(
                records
                    .iter()
                    .map(|r| AlignedRow::new(r.id.clone(), format!("{:-<width$}", r.residues, width = width)))
                    .collect(),
            )
        }
    }

    /// Drops the last record, violating the aligner contract.
    struct LossyAligner;

    impl Aligner for LossyAligner {
        fn name(&self) -> &'static str {
            "lossy"
        }

        fn align(&self, records: &Corpus, workdir: &Path) -> Result<Alignment> {
            let kept: Corpus = records.iter().take(records.len() - 1).cloned().collect();
            PadAligner.align(&kept, workdir)
        }
    }

    struct NoProfile;

    impl ProfileBuilder for NoProfile {
        fn name(&self) -> &'static str {
            "none"
        }

        fn build(&self, family: &str, _: &Path, out_dir: &Path) -> Result<PathBuf> {
            Ok(out_dir.join(format!("{}.hmm", family)))
        }
    }

    fn write_pangenome(dir: &Path, lengths: &[usize]) -> PathBuf {
        let mut body = String::new();
        for (i, len) in lengths.iter().enumerate() {
            body.push_str(&format!(">p{} nitrogenase iron protein NifH\n{}\n", i, "M".repeat(*len)));
        }
        body.push_str(">q1 DNA gyrase\nMKKKK\n");
        let path = dir.join("pangenome.faa");
        fs::write(&path, body).unwrap();
        path
    }

    fn inputs(dir: &Path, lengths: &[usize], control_len: usize) -> CurationInputs {
        let reference = dir.join("reference.faa");
        fs::write(&reference, ">p1 x\nM\n>p2 x\nM\n").unwrap();
        CurationInputs {
            pangenome: vec![write_pangenome(dir, lengths)],
            reference: vec![reference],
            controls: Corpus::new(vec![SequenceRecord::new("ctrl", "ctrl chlL", "M".repeat(control_len))]),
        }
    }

    #[test]
    fn test_curate_end_to_end_counts() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[90, 150, 155, 160, 900], 150);
        let config = CurationConfig {
            gap_threshold: 0.9,
            ..CurationConfig::for_gene("nifH")
        };

        let curated = curate(&config, &inputs, &PadAligner, dir.path()).unwrap();
        let d = &curated.diagnostics;
        assert_eq!(d.header_matches, 5);
        assert_eq!(d.seed_count, 5);
        assert_eq!(d.band.unwrap().max, 920);
        assert_eq!(d.post_filter, 4);
        assert_eq!(d.aligned_rows, 5);
        assert_eq!(d.verification.found, 2);
        assert_eq!(d.verification.missing.len(), 3);
        // padded to 900 columns: 150/900 residues is 0.833 gaps, all kept at 0.9
        assert_eq!(d.post_trim, 4);
        assert!(!curated.clean.contains("ctrl"));
        assert_eq!(curated.seeds.ids().collect::<Vec<_>>(), vec!["p1", "p2", "p3", "p4"]);
        assert_eq!(curated.clean_alignment.len(), 4);
    }

    #[test]
    fn test_gappy_rows_dropped_at_default_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[90, 150, 155, 160, 900], 150);
        let curated = curate(&CurationConfig::for_gene("nifH"), &inputs, &PadAligner, dir.path()).unwrap();
        assert_eq!(curated.clean.ids(), &["p4"]);
        assert_eq!(curated.seeds.records()[0].len(), 900);
    }

    #[test]
    fn test_empty_retrieval_never_reaches_aligner() {
        struct PanicAligner;
        impl Aligner for PanicAligner {
            fn name(&self) -> &'static str {
                "panic"
            }
            fn align(&self, _: &Corpus, _: &Path) -> Result<Alignment> {
                panic!("aligner must not run");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[150, 160], 150);
        let err = curate(&CurationConfig::for_gene("mcrA"), &inputs, &PanicAligner, dir.path()).unwrap_err();
        assert!(matches!(err, CurationError::EmptyResult { stage: "retrieval", .. }));
    }

    #[test]
    fn test_aligner_dropping_rows_is_inconsistency() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[150, 160], 150);
        let err = curate(&CurationConfig::for_gene("nifH"), &inputs, &LossyAligner, dir.path()).unwrap_err();
        match err {
            CurationError::InternalInconsistency { stage, unit, .. } => {
                assert_eq!(stage, "alignment");
                assert_eq!(unit, "nifH");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_retrieval_names_family_not_token() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[150, 160], 150);
        let config = CurationConfig {
            family: "mcrA_methanogen".to_string(),
            ..CurationConfig::for_gene("mcrA")
        };
        match curate(&config, &inputs, &PadAligner, dir.path()).unwrap_err() {
            CurationError::EmptyResult { stage, unit, detail, .. } => {
                assert_eq!(stage, "retrieval");
                assert_eq!(unit, "mcrA_methanogen");
                assert!(detail.contains("'mcrA'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_family_names_rejected_in_batch() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path(), &[150, 160], 150);
        let tools = Collaborators {
            aligner: &PadAligner,
            profile_builder: &NoProfile,
            search_engine: None,
        };
        let configs = vec![
            ("nifH".to_string(), Ok(CurationConfig::for_gene("nifH"))),
            ("nifH".to_string(), Ok(CurationConfig::for_gene("nifH"))),
        ];
        let results = curate_all(configs, &inputs, tools, dir.path());
        assert_eq!(results.len(), 2);
        for (_, result) in &results {
            assert!(matches!(result, Err(CurationError::InvalidParameter { name: "family", .. })));
        }
        assert!(!dir.path().join("nifH").exists());
    }

    #[test]
    fn test_controls_required_and_must_not_clash() {
        let dir = tempfile::tempdir().unwrap();
        let mut no_controls = inputs(dir.path(), &[150, 160], 150);
        no_controls.controls = Corpus::default();
        assert!(matches!(
            curate(&CurationConfig::for_gene("nifH"), &no_controls, &PadAligner, dir.path()),
            Err(CurationError::InvalidParameter { name: "controls", .. })
        ));

        let mut clash = inputs(dir.path(), &[150, 160], 150);
        clash.controls = Corpus::new(vec![SequenceRecord::new("p0", "p0", "MK")]);
        assert!(matches!(
            curate(&CurationConfig::for_gene("nifH"), &clash, &PadAligner, dir.path()),
            Err(CurationError::InvalidParameter { name: "controls", .. })
        ));
    }
}
