use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use genefam::config::{CurationConfig, FamilyManifest};
use genefam::length::{DEFAULT_LENGTH_MARGIN, DEFAULT_MIN_LEN};
use genefam::pipeline::{self, Collaborators, CurationInputs};
use genefam::quantify::{self, QuantifyOptions, ResultsTable, Sample};
use genefam::store::Corpus;
use genefam::tools::{find_executable, Diamond, Hmmbuild, Mafft, SearchEngine};

fn parse_gap_threshold(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if val > 0.0 && val < 1.0 {
        Ok(val)
    } else {
        Err(format!("Gap threshold must be between 0 and 1 (exclusive), got {}", val))
    }
}

fn parse_min_len(s: &str) -> Result<usize, String> {
    let val: usize = s.parse().map_err(|_| format!("Invalid length: {}", s))?;
    if val == 0 {
        Err("Minimum length must be at least 1".to_string())
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "genefam")]
#[command(version)]
#[command(about = "Gene-family profile curation and metagenomic abundance quantification")]
#[command(long_about = r#"
genefam - curate gene-family seed sets from pangenome proteins, build
profiles, and count family hits in metagenomic reads.

CURATION (per gene family):
  pangenome headers -> gene-token match -> negative-pattern exclusion
  -> reference proteome cross-check (advisory) -> N50 length band
  -> MAFFT L-INS-i (with control records) -> gap-fraction trimming
  -> seed reconciliation -> hmmbuild profile + DIAMOND database

QUANTIFICATION (per sample):
  reads -> DIAMOND blastx (best hit per read, e-value <= 1e-10) -> count

OUTPUT FILES (curate):
  {outdir}/{family}/{family}.aln.faa           Gap-trimmed alignment
  {outdir}/{family}/{family}.seeds.faa         Unaligned curated seeds
  {outdir}/{family}/{family}.hmm               Profile HMM
  {outdir}/{family}/{family}.dmnd              DIAMOND database
  {outdir}/{family}/{family}.verification.tsv  Ids missing from reference
  {outdir}/curation_summary.tsv                One row per family

EXAMPLES:
  # Single family
  genefam curate -g mcrA -p pangenome/*.faa.gz -r uniprot.faa.gz -c controls.faa -o db/

  # Families from a manifest
  genefam curate -l families.toml -p pangenome/*.faa.gz -r uniprot.faa.gz -c controls.faa -o db/

  # Quantify a directory of samples
  genefam quantify -d db/mcrA/mcrA.dmnd -l reads/ -o mcrA_counts.tsv
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true, help_heading = "Runtime")]
    verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long, global = true, help_heading = "Runtime")]
    quiet: bool,

    /// Total worker threads (0 = all cores)
    #[arg(short = 't', long, value_name = "NUM", default_value = "0", global = true, help_heading = "Runtime")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Curate gene families and build their profiles
    Curate(CurateArgs),
    /// Count family hits in metagenomic samples
    Quantify(QuantifyArgs),
}

#[derive(Args)]
struct CurateArgs {
    #[arg(short = 'g', long, value_name = "TOKEN", conflicts_with = "families", help_heading = "Family")]
    gene: Option<String>,

    #[arg(short = 'n', long, value_name = "REGEX", requires = "gene", help_heading = "Family")]
    negative: Option<String>,

    #[arg(short = 'l', long, value_name = "TOML", help_heading = "Family")]
    families: Option<PathBuf>,

    #[arg(short = 'p', long, value_name = "FILE(S)", num_args = 1.., required = true, help_heading = "Input")]
    pangenome: Vec<PathBuf>,

    #[arg(short = 'r', long, value_name = "FILE(S)", num_args = 1.., required = true, help_heading = "Input")]
    reference: Vec<PathBuf>,

    #[arg(short = 'c', long, value_name = "FILE(S)", num_args = 1.., required = true, help_heading = "Input")]
    controls: Vec<PathBuf>,

    #[arg(short = 'm', long, value_name = "AA", default_value_t = DEFAULT_MIN_LEN,
          value_parser = parse_min_len, help_heading = "Filtering")]
    min_len: usize,

    #[arg(short = 'G', long, value_name = "FRACTION", default_value = "0.3",
          value_parser = parse_gap_threshold, help_heading = "Filtering")]
    gap_threshold: f64,

    #[arg(long, value_name = "AA", default_value_t = DEFAULT_LENGTH_MARGIN, help_heading = "Filtering")]
    length_margin: usize,

    #[arg(short = 'o', long, value_name = "DIR", default_value = ".", help_heading = "Output")]
    outdir: PathBuf,

    /// Skip building the DIAMOND search database
    #[arg(long, help_heading = "Output")]
    no_search_db: bool,

    #[arg(long, value_name = "PATH", default_value = "mafft", help_heading = "Tools")]
    mafft: String,

    #[arg(long, value_name = "PATH", default_value = "hmmbuild", help_heading = "Tools")]
    hmmbuild: String,

    #[arg(long, value_name = "PATH", default_value = "diamond", help_heading = "Tools")]
    diamond: String,
}

#[derive(Args)]
struct QuantifyArgs {
    #[arg(short = 'd', long, value_name = "FILE", help_heading = "Database")]
    db: PathBuf,

    /// Gene family label (defaults to the database file stem)
    #[arg(short = 'F', long, value_name = "NAME", help_heading = "Database")]
    family: Option<String>,

    #[arg(short = 'i', long, value_name = "FILE(S)", num_args = 1.., conflicts_with = "samples", help_heading = "Input")]
    reads: Vec<PathBuf>,

    #[arg(short = 'l', long, value_name = "PATH", help_heading = "Input")]
    samples: Option<PathBuf>,

    #[arg(short = 'o', long, value_name = "FILE", default_value = "abundance.tsv", help_heading = "Output")]
    output: PathBuf,

    /// Also write a samples x families count matrix
    #[arg(short = 'M', long, value_name = "FILE", help_heading = "Output")]
    matrix: Option<PathBuf>,

    #[arg(short = 'w', long, value_name = "DIR", default_value = "genefam_tmp", help_heading = "Output")]
    workdir: PathBuf,

    #[arg(short = 'u', long, help_heading = "Output")]
    keep_temp: bool,

    #[arg(short = 's', long, value_name = "NUM", default_value = "8", help_heading = "Runtime")]
    threads_per_sample: usize,

    #[arg(long, value_name = "PATH", default_value = "diamond", help_heading = "Tools")]
    diamond: String,
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let mut cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);
    let start_time = Instant::now();

    if cli.threads == 0 {
        cli.threads = num_cpus::get();
    }

    match cli.command {
        Commands::Curate(args) => run_curate(args, cli.threads)?,
        Commands::Quantify(args) => run_quantify(args, cli.threads)?,
    }

    log::info!("Total time: {:.1}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn run_curate(args: CurateArgs, threads: usize) -> Result<()> {
    let configs = match (&args.gene, &args.families) {
        (Some(gene), None) => {
            let config = CurationConfig {
                min_len: args.min_len,
                gap_threshold: args.gap_threshold,
                length_margin: args.length_margin,
                ..CurationConfig::for_gene(gene)
            }
            .with_negative(args.negative.as_deref());
            vec![(gene.clone(), config)]
        }
        (None, Some(manifest)) => FamilyManifest::load(manifest)?.configs(),
        _ => anyhow::bail!("Provide either --gene or --families"),
    };

    let mafft = Mafft::new(find_executable(&args.mafft)?, threads);
    let hmmbuild = Hmmbuild::new(find_executable(&args.hmmbuild)?, threads);
    let diamond = if args.no_search_db {
        None
    } else {
        Some(Diamond::new(find_executable(&args.diamond)?, threads))
    };
    log::debug!("Tools resolved: {}, {}", args.mafft, args.hmmbuild);

    let (controls, control_stats) = Corpus::load(&args.controls)?;
    if control_stats.skipped > 0 {
        log::warn!("{} malformed control record(s) skipped", control_stats.skipped);
    }
    let inputs = CurationInputs {
        pangenome: args.pangenome,
        reference: args.reference,
        controls,
    };

    fs::create_dir_all(&args.outdir)
        .with_context(|| format!("Failed to create {}", args.outdir.display()))?;

    log::info!(
        "Curating {} gene famil{} with {} threads",
        configs.len(),
        if configs.len() == 1 { "y" } else { "ies" },
        threads
    );

    let tools = Collaborators {
        aligner: &mafft,
        profile_builder: &hmmbuild,
        search_engine: diamond.as_ref().map(|d| d as &dyn SearchEngine),
    };

    // The aligner parallelises internally; families run one at a time.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .context("Failed to build thread pool")?;
    let results = pool.install(|| pipeline::curate_all(configs, &inputs, tools, &args.outdir));

    let summary_path = args.outdir.join("curation_summary.tsv");
    pipeline::write_summary(&results, &summary_path)?;

    let succeeded = results.iter().filter(|(_, r)| r.is_ok()).count();
    for (name, result) in &results {
        if let Ok(outcome) = result {
            let d = &outcome.curated.diagnostics;
            log::info!(
                "{}: headers={} seeds={} verified={}/{} post_filter={} post_trim={} -> {}",
                name,
                d.header_matches,
                d.seed_count,
                d.verification.found,
                d.verification.checked,
                d.post_filter,
                d.post_trim,
                outcome.artifacts.profile.display()
            );
        }
    }
    log::info!(
        "Families curated: {}/{} (summary: {})",
        succeeded,
        results.len(),
        summary_path.display()
    );

    if succeeded == 0 {
        anyhow::bail!("No gene family was curated successfully");
    }
    Ok(())
}

fn run_quantify(args: QuantifyArgs, threads: usize) -> Result<()> {
    let samples: Vec<Sample> = if let Some(list) = &args.samples {
        quantify::parse_samples(list)?
    } else {
        args.reads.iter().cloned().map(Sample::from_path).collect()
    };
    if samples.is_empty() {
        anyhow::bail!("No samples provided. Use -i or --samples");
    }
    quantify::ensure_unique_names(&samples)?;

    let family = match &args.family {
        Some(f) => f.clone(),
        None => args
            .db
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("Cannot derive family name from database path; use --family")?,
    };

    let threads_per_sample = args.threads_per_sample.clamp(1, threads.max(1));
    let max_concurrent = (threads / threads_per_sample).max(1);
    let diamond = Diamond::new(find_executable(&args.diamond)?, threads_per_sample);

    log::info!(
        "Quantifying {} in {} sample(s) ({} concurrent, {} threads/sample)",
        family,
        samples.len(),
        max_concurrent,
        threads_per_sample
    );

    let options = QuantifyOptions {
        gene_family: family,
        db: args.db.clone(),
        workdir: args.workdir.clone(),
        keep_temp: args.keep_temp,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrent)
        .build()
        .context("Failed to build thread pool")?;
    let results = pool.install(|| quantify::quantify_all(&samples, &options, &diamond));

    let mut table = ResultsTable::new();
    let mut failed = 0usize;
    for (_, result) in results {
        match result {
            Ok(count) => table.insert(count),
            Err(_) => failed += 1,
        }
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    table.write_long_tsv(&args.output)?;
    if let Some(matrix) = &args.matrix {
        table.write_matrix_tsv(matrix)?;
    }
    if !args.keep_temp {
        let _ = fs::remove_dir(&args.workdir);
    }

    log::info!(
        "Results: {} sample(s) written to {} ({} failed)",
        table.len(),
        args.output.display(),
        failed
    );
    if table.is_empty() {
        anyhow::bail!("No sample was quantified successfully");
    }
    Ok(())
}
