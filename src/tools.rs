//! External Collaborators
//!
//! Adapters around the command-line tools the curation and quantification
//! pipelines delegate to. Each tool sits behind a trait so that the core
//! only sees typed values (`Corpus`, `Alignment`, `SearchHit`); text formats
//! stay inside this module.
//!
//! | Trait            | Default tool | Invocation                                   |
//! |------------------|--------------|----------------------------------------------|
//! | `Aligner`        | MAFFT        | `mafft --maxiterate 1000 --localpair`        |
//! | `ProfileBuilder` | HMMER        | `hmmbuild --amino --informat afa`            |
//! | `SearchEngine`   | DIAMOND      | `diamond makedb`, `diamond blastx -k 1 -e`   |

use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::alignment::Alignment;
use crate::hits::{HitReader, SearchHit};
use crate::store::Corpus;

/// E-value cutoff for counting a read as a family hit.
pub const SEARCH_EVALUE: f64 = 1e-10;

// ============================================================================
// Traits
// ============================================================================

/// Multiple sequence aligner.
pub trait Aligner: Sync {
    fn name(&self) -> &'static str;

    /// Aligns `records`, using `workdir` for any scratch files. The returned
    /// alignment must cover exactly the input ids.
    fn align(&self, records: &Corpus, workdir: &Path) -> Result<Alignment>;
}

/// Builds a profile artifact from an aligned FASTA file.
pub trait ProfileBuilder: Sync {
    fn name(&self) -> &'static str;

    /// Returns the path of the written profile.
    fn build(&self, family: &str, alignment_fasta: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Translated nucleotide-to-protein search engine.
pub trait SearchEngine: Sync {
    fn name(&self) -> &'static str;

    /// Builds a search database from unaligned seed proteins.
    fn make_db(&self, family: &str, seeds_fasta: &Path, out_dir: &Path) -> Result<PathBuf>;

    /// Searches reads against `db`, keeping only the best hit per read at or
    /// below [`SEARCH_EVALUE`].
    fn search(&self, db: &Path, reads: &Path, workdir: &Path) -> Result<Vec<SearchHit>>;
}

// ============================================================================
// Process helpers
// ============================================================================

/// Resolves a tool name against PATH. Absolute paths are accepted as-is.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() && path.exists() {
        return Ok(path.to_path_buf());
    }

    if let Ok(paths) = env::var("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    anyhow::bail!("{} not found in PATH. Please install it or add it to your PATH.", name)
}

/// Runs a command to completion, failing with its stderr on non-zero exit.
fn run_checked(cmd: &mut Command, tool: &str) -> Result<Output> {
    log::debug!("Running {}: {:?}", tool, cmd);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {}", tool))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "{} failed (exit code: {:?}): {}",
            tool,
            output.status.code(),
            stderr.trim()
        );
    }
    Ok(output)
}

// ============================================================================
// MAFFT
// ============================================================================

/// MAFFT in L-INS-i mode: local pairwise scoring with iterative refinement.
pub struct Mafft {
    binary: PathBuf,
    threads: usize,
    max_iterate: usize,
}

impl Mafft {
    pub fn new(binary: PathBuf, threads: usize) -> Self {
        Self {
            binary,
            threads: threads.max(1),
            max_iterate: 1000,
        }
    }

    fn args(&self, input: &Path) -> Vec<String> {
        vec![
            "--amino".to_string(),
            "--maxiterate".to_string(),
            self.max_iterate.to_string(),
            "--localpair".to_string(),
            "--thread".to_string(),
            self.threads.to_string(),
            "--quiet".to_string(),
            input.to_string_lossy().into_owned(),
        ]
    }
}

impl Aligner for Mafft {
    fn name(&self) -> &'static str {
        "mafft"
    }

    fn align(&self, records: &Corpus, workdir: &Path) -> Result<Alignment> {
        let input = workdir.join("alignment_input.faa");
        records.write_fasta(&input)?;

        let result = run_checked(Command::new(&self.binary).args(self.args(&input)), "mafft")
            .and_then(|output| {
                Alignment::from_fasta_bytes(&output.stdout).context("Failed to parse MAFFT output")
            });

        let _ = std::fs::remove_file(&input);
        result
    }
}

// ============================================================================
// hmmbuild
// ============================================================================

/// HMMER `hmmbuild` producing a `<family>.hmm` profile.
pub struct Hmmbuild {
    binary: PathBuf,
    threads: usize,
}

impl Hmmbuild {
    pub fn new(binary: PathBuf, threads: usize) -> Self {
        Self {
            binary,
            threads: threads.max(1),
        }
    }
}

impl ProfileBuilder for Hmmbuild {
    fn name(&self) -> &'static str {
        "hmmbuild"
    }

    fn build(&self, family: &str, alignment_fasta: &Path, out_dir: &Path) -> Result<PathBuf> {
        let hmm_path = out_dir.join(format!("{}.hmm", family));
        run_checked(
            Command::new(&self.binary)
                .args(["--amino", "--informat", "afa", "-n", family])
                .arg("--cpu")
                .arg(self.threads.to_string())
                .arg(&hmm_path)
                .arg(alignment_fasta)
                .stdout(Stdio::null()),
            "hmmbuild",
        )?;
        Ok(hmm_path)
    }
}

// ============================================================================
// DIAMOND
// ============================================================================

/// DIAMOND protein database builder and `blastx` translated search.
pub struct Diamond {
    binary: PathBuf,
    threads: usize,
}

impl Diamond {
    pub fn new(binary: PathBuf, threads: usize) -> Self {
        Self {
            binary,
            threads: threads.max(1),
        }
    }
}

impl SearchEngine for Diamond {
    fn name(&self) -> &'static str {
        "diamond"
    }

    fn make_db(&self, family: &str, seeds_fasta: &Path, out_dir: &Path) -> Result<PathBuf> {
        let db_path = out_dir.join(format!("{}.dmnd", family));
        run_checked(
            Command::new(&self.binary)
                .arg("makedb")
                .arg("--in")
                .arg(seeds_fasta)
                .arg("--db")
                .arg(&db_path)
                .arg("--threads")
                .arg(self.threads.to_string())
                .arg("--quiet"),
            "diamond makedb",
        )?;
        Ok(db_path)
    }

    fn search(&self, db: &Path, reads: &Path, workdir: &Path) -> Result<Vec<SearchHit>> {
        let hits_path = workdir.join("hits.m8");
        run_checked(
            Command::new(&self.binary)
                .arg("blastx")
                .arg("--db")
                .arg(db)
                .arg("--query")
                .arg(reads)
                .arg("--out")
                .arg(&hits_path)
                .args(["--outfmt", "6", "--max-target-seqs", "1"])
                .arg("--evalue")
                .arg(SEARCH_EVALUE.to_string())
                .arg("--threads")
                .arg(self.threads.to_string())
                .arg("--quiet"),
            "diamond blastx",
        )?;

        if !hits_path.exists() {
            return Ok(Vec::new());
        }
        HitReader::open(&hits_path)?.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mafft_uses_iterative_refinement() {
        let mafft = Mafft::new(PathBuf::from("mafft"), 0);
        let args = mafft.args(Path::new("in.faa"));
        assert!(args.windows(2).any(|w| w[0] == "--maxiterate" && w[1] == "1000"));
        assert!(args.contains(&"--localpair".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--thread" && w[1] == "1"));
        assert_eq!(args.last().map(String::as_str), Some("in.faa"));
    }

    #[test]
    fn test_mafft_failure_removes_scratch_input() {
        let dir = tempfile::tempdir().unwrap();
        let mafft = Mafft::new(PathBuf::from("/nonexistent/bin/mafft"), 1);
        let records: Corpus = vec![crate::store::SequenceRecord::new("a", "a", "MKV")]
            .into_iter()
            .collect();
        assert!(mafft.align(&records, dir.path()).is_err());
        assert!(!dir.path().join("alignment_input.faa").exists());
    }

    #[test]
    fn test_search_evalue_literal() {
        assert_eq!(SEARCH_EVALUE.to_string(), "0.0000000001");
    }

    #[test]
    fn test_find_executable_missing() {
        assert!(find_executable("definitely-not-a-real-tool-xyz").is_err());
    }

    #[test]
    fn test_run_checked_reports_failure() {
        let err = run_checked(&mut Command::new("sh").args(["-c", "echo boom >&2; exit 3"]), "sh")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code: Some(3)"));
        assert!(msg.contains("boom"));
    }
}
