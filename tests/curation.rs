use anyhow::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use genefam::alignment::{AlignedRow, Alignment};
use genefam::config::{CurationConfig, FamilyManifest};
use genefam::hits::SearchHit;
use genefam::pipeline::{self, Collaborators, CurationInputs};
use genefam::seqio::FastaFile;
use genefam::store::{Corpus, SequenceRecord};
use genefam::tools::{Aligner, ProfileBuilder, SearchEngine};
use genefam::CurationError;

/// Right-pads every record with gaps to the longest length.
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
                .map(|r| AlignedRow::new(r.id.clone(), format!("{:-<w$}", r.residues, w = width)))
                .collect(),
        )
    }
}

/// Copies the alignment in place of a real profile.
struct CopyProfileBuilder;

impl ProfileBuilder for CopyProfileBuilder {
    fn name(&self) -> &'static str {
        "copy-profile"
    }

    fn build(&self, family: &str, alignment_fasta: &Path, out_dir: &Path) -> Result<PathBuf> {
        let out = out_dir.join(format!("{}.hmm", family));
        fs::copy(alignment_fasta, &out)?;
        Ok(out)
    }
}

struct FailingProfileBuilder;

impl ProfileBuilder for FailingProfileBuilder {
    fn name(&self) -> &'static str {
        "broken-profile"
    }

    fn build(&self, _: &str, _: &Path, _: &Path) -> Result<PathBuf> {
        anyhow::bail!("exit status 1: segmentation fault")
    }
}

struct CopyDbEngine;

impl SearchEngine for CopyDbEngine {
    fn name(&self) -> &'static str {
        "copy-db"
    }

    fn make_db(&self, family: &str, seeds_fasta: &Path, out_dir: &Path) -> Result<PathBuf> {
        let out = out_dir.join(format!("{}.dmnd", family));
        fs::copy(seeds_fasta, &out)?;
        Ok(out)
    }

    fn search(&self, _: &Path, _: &Path, _: &Path) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

fn write_gz(path: &Path, text: &str) {
    let mut enc = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap();
}

/// Two pangenome shards (one gzipped) holding nifH, amoA and unrelated records.
fn setup(dir: &Path) -> CurationInputs {
    let shard1 = dir.join("genomes_a.faa.gz");
    write_gz(
        &shard1,
        &format!(
            ">g1_001 nitrogenase iron protein nifH [Azotobacter]\n{}\n\
             >g1_002 ammonia monooxygenase subunit A amoA\n{}\n\
             >g1_003 DNA gyrase subunit B\n{}\n",
            "M".repeat(150),
            "K".repeat(250),
            "G".repeat(300),
        ),
    );
    let shard2 = dir.join("genomes_b.faa");
    fs::write(
        &shard2,
        format!(
            ">g2_001 nifH nitrogenase reductase\n{}\n\
             >g2_002 NifH-like protein, partial\n{}\n\
             >g2_003 archaeal amoA homolog\n{}\n\
             >g2_005 amoA\n{}\n",
            "M".repeat(155),
            "M".repeat(60),
            "K".repeat(245),
            "K".repeat(240),
        ),
    )
    .unwrap();

    let reference = dir.join("uniprot.faa");
    fs::write(&reference, ">sp|g1_001|NIFH_AZOVI\nM\n>g2_005 amoA\nK\n").unwrap();

    CurationInputs {
        pangenome: vec![shard1, shard2],
        reference: vec![reference],
        controls: Corpus::new(vec![SequenceRecord::new("ctrl_chlL", "ctrl_chlL chlL", "M".repeat(152))]),
    }
}

fn ids_in(path: &Path) -> Vec<String> {
    FastaFile::open(path)
        .unwrap()
        .map(|r| r.unwrap().id)
        .collect()
}

#[test]
fn run_family_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = setup(dir.path());
    let outdir = dir.path().join("out");
    let tools = Collaborators {
        aligner: &PadAligner,
        profile_builder: &CopyProfileBuilder,
        search_engine: Some(&CopyDbEngine as &dyn SearchEngine),
    };

    let config = CurationConfig {
        min_len: 100,
        gap_threshold: 0.5,
        ..CurationConfig::for_gene("nifH")
    };
    let outcome = pipeline::run_family(&config, &inputs, tools, &outdir).unwrap();

    // the 60 aa fragment falls below min_len
    let d = &outcome.curated.diagnostics;
    assert_eq!(d.header_matches, 3);
    assert_eq!(d.post_filter, 2);
    assert_eq!(d.verification.found, 1);

    let family_dir = outdir.join("nifH");
    assert_eq!(outcome.artifacts.alignment, family_dir.join("nifH.aln.faa"));
    assert_eq!(ids_in(&outcome.artifacts.alignment), vec!["g1_001", "g2_001"]);
    assert_eq!(ids_in(&outcome.artifacts.seeds), vec!["g1_001", "g2_001"]);
    assert!(outcome.artifacts.profile.exists());
    assert_eq!(outcome.artifacts.search_db.as_deref(), Some(family_dir.join("nifH.dmnd").as_path()));

    // seeds are unaligned: no gap symbols survive reconciliation
    let seeds = fs::read_to_string(&outcome.artifacts.seeds).unwrap();
    assert!(!seeds.contains('-'));
    let report = fs::read_to_string(&outcome.artifacts.verification).unwrap();
    assert!(report.lines().any(|l| l == "g2_001"));
}

#[test]
fn negative_pattern_prunes_and_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = setup(dir.path());
    let config = CurationConfig::for_gene("amoA")
        .with_negative(Some("(?i)archaeal"))
        .unwrap();

    let curated = pipeline::curate(&config, &inputs, &PadAligner, dir.path()).unwrap();
    assert_eq!(curated.diagnostics.excluded, 1);
    assert_eq!(curated.diagnostics.seed_count, 2);
    assert!(curated.candidates.ids().all(|id| id != "g2_003"));
}

#[test]
fn curate_all_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = setup(dir.path());
    let outdir = dir.path().join("batch");
    fs::create_dir_all(&outdir).unwrap();

    let manifest = FamilyManifest::parse(
        r#"
[defaults]
gap_threshold = 0.5

[[family]]
name = "nifH"

[[family]]
name = "mcrA"

[[family]]
name = "bad"
gene = "amoA"
gap_threshold = 2.0
"#,
    )
    .unwrap();

    let tools = Collaborators {
        aligner: &PadAligner,
        profile_builder: &CopyProfileBuilder,
        search_engine: None,
    };
    let results = pipeline::curate_all(manifest.configs(), &inputs, tools, &outdir);
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["nifH", "mcrA", "bad"]);

    assert!(results[0].1.is_ok());
    assert!(matches!(
        results[1].1,
        Err(CurationError::EmptyResult { stage: "retrieval", .. })
    ));
    assert!(matches!(
        results[2].1,
        Err(CurationError::InvalidParameter { name: "gap_threshold", .. })
    ));

    let summary = outdir.join("curation_summary.tsv");
    pipeline::write_summary(&results, &summary).unwrap();
    let text = fs::read_to_string(&summary).unwrap();
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[1].starts_with("nifH\tOK\t3\t"));
    assert!(rows[2].starts_with("mcrA\tEmptyResult\t"));
    assert!(rows[3].starts_with("bad\tInvalidParameter\t"));
}

#[test]
fn profile_builder_failure_is_tool_error() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = setup(dir.path());
    let tools = Collaborators {
        aligner: &PadAligner,
        profile_builder: &FailingProfileBuilder,
        search_engine: None,
    };
    let config = CurationConfig {
        gap_threshold: 0.5,
        ..CurationConfig::for_gene("nifH")
    };

    let err = pipeline::run_family(&config, &inputs, tools, dir.path()).unwrap_err();
    match err {
        CurationError::Tool { tool, unit, .. } => {
            assert_eq!(tool, "broken-profile");
            assert_eq!(unit, "nifH");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_pangenome_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = setup(dir.path());
    inputs.pangenome.push(dir.path().join("absent.faa"));

    let err = pipeline::curate(&CurationConfig::for_gene("nifH"), &inputs, &PadAligner, dir.path())
        .unwrap_err();
    assert!(matches!(err, CurationError::SourceUnavailable { .. }));
}
