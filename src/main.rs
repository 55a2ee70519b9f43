mod deconv;
mod input;
mod logging;
mod markers;
mod report;
mod stats;
mod symbols;

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::deconv::combine::run_combiner;
use crate::deconv::estimator::{Estimator, EstimatorError, SignatureEstimator};
use crate::deconv::{CombineOptions, DeconvError, MinMarkers, MixtureInput, OutputPaths};
use crate::input::table::read_table;
use crate::input::{InputError, load_id_list, load_mixture};
use crate::logging::{Verbosity, init_logging};
use crate::markers::EstimatorId;
use crate::markers::mapping::build_symbol_set;
use crate::report::json::{build_summary, write_summary_json};
use crate::report::write_matrix;
use crate::stats::StatsError;
use crate::stats::completeness::filter_complete;
use crate::stats::correlation::{CorrelationMethod, correlate};
use crate::stats::outliers::cap_outliers;
use crate::symbols::hgnc::{NomenclatureTable, resolve_table_path};
use crate::symbols::{SymbolError, standardize_symbols, write_matches};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Deconv(#[from] DeconvError),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Parser)]
#[command(name = "ctdeconv", version, about = "Bulk expression deconvolution and matrix helpers")]
struct Cli {
    /// Debug-level logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Warnings and errors only.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ensemble cell-type deconvolution across reference estimators.
    Deconv(DeconvArgs),
    /// Drop rows and columns with too many missing values.
    Filter(FilterArgs),
    /// Correlate every row of one matrix with every row of another.
    Correlate(CorrelateArgs),
    /// Cap values outside per-row quantiles.
    Cap(CapArgs),
    /// Standardize gene symbols against an HGNC table.
    Symbols(SymbolsArgs),
}

#[derive(Debug, Args)]
struct DeconvArgs {
    /// Genes x samples mixture shared by all estimators.
    #[arg(long, required_unless_present = "mixture_for", conflicts_with = "mixture_for")]
    mixture: Option<PathBuf>,
    /// Per-estimator mixture, as ID=PATH (repeatable).
    #[arg(long, value_parser = parse_key_path)]
    mixture_for: Vec<(EstimatorId, PathBuf)>,
    /// Reference signature, as ID=PATH (repeatable; ID is lm22, epic or quantiseq).
    #[arg(long, required = true, value_parser = parse_key_path)]
    signature: Vec<(EstimatorId, PathBuf)>,
    /// Minimum marker overlap, as ID=N (repeatable).
    #[arg(long, value_parser = parse_key_count)]
    min_markers: Vec<(EstimatorId, usize)>,
    /// Mixture is RNA-seq; skips quantile normalization.
    #[arg(long)]
    rnaseq: bool,
    /// Protein mode: six-category average over protein-coding genes.
    #[arg(long, requires = "protein_genes")]
    protein: bool,
    /// Protein-coding gene list used to narrow signatures in protein mode.
    #[arg(long)]
    protein_genes: Option<PathBuf>,
    /// Output paths for prop and cellProp (exactly two).
    #[arg(long, num_args = 1.., value_name = "PATH")]
    out: Vec<PathBuf>,
    /// JSON run summary.
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct FilterArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Minimum fraction of present values per row.
    #[arg(long, default_value_t = 0.8)]
    min_row: f64,
    /// Minimum fraction of present values per column.
    #[arg(long, default_value_t = 0.8)]
    min_col: f64,
}

#[derive(Debug, Args)]
struct CorrelateArgs {
    #[arg(long)]
    x: PathBuf,
    /// Defaults to `x`.
    #[arg(long)]
    y: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CorrelationMethod::Pearson)]
    method: CorrelationMethod,
    /// Worker threads; defaults to one per logical core.
    #[arg(short, long)]
    threads: Option<usize>,
    #[arg(long)]
    out_r: PathBuf,
    #[arg(long)]
    out_p: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CapArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0.05)]
    lower: f64,
    #[arg(long, default_value_t = 0.95)]
    upper: f64,
}

#[derive(Debug, Args)]
struct SymbolsArgs {
    /// Symbol list, one per line.
    #[arg(long)]
    symbols: PathBuf,
    /// HGNC export; takes precedence over the cache directory.
    #[arg(long, required_unless_present = "cache_dir")]
    table: Option<PathBuf>,
    /// Directory holding hgnc_complete_set_<YYYY-MM>.txt files.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(Verbosity::from_flags(cli.verbose, cli.quiet));
    if let Err(err) = run(cli.command) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Deconv(args) => run_deconv(args),
        Command::Filter(args) => run_filter(args),
        Command::Correlate(args) => run_correlate(args),
        Command::Cap(args) => run_cap(args),
        Command::Symbols(args) => run_symbols(args),
    }
}

fn run_deconv(args: DeconvArgs) -> Result<(), CliError> {
    let output = if args.out.is_empty() {
        None
    } else {
        Some(OutputPaths::from_paths(&args.out)?)
    };

    let mut options = CombineOptions::with_builtin_tables(args.rnaseq, args.protein)?;
    options.min_markers = resolve_min_markers(&args.min_markers);

    let protein_genes: Option<HashSet<String>> = match (&args.protein_genes, args.protein) {
        (Some(path), true) => Some(build_symbol_set(&load_id_list(path)?)),
        _ => None,
    };

    let mut estimators = Vec::with_capacity(args.signature.len());
    for (id, path) in &args.signature {
        let est = SignatureEstimator::load(*id, path)?;
        let est = match &protein_genes {
            Some(genes) => est.restrict_to(genes),
            None => est,
        };
        estimators.push(est);
    }
    let refs: Vec<&dyn Estimator> = estimators.iter().map(|e| e as &dyn Estimator).collect();

    let mixture = match &args.mixture {
        Some(path) => MixtureInput::File(path.clone()),
        None => {
            let mut per = BTreeMap::new();
            for (id, path) in &args.mixture_for {
                if per.insert(*id, load_mixture(path)?).is_some() {
                    return Err(CliError::Usage(format!(
                        "--mixture-for {id} given more than once"
                    )));
                }
            }
            MixtureInput::PerEstimator(per)
        }
    };

    let bundle = run_combiner(mixture, &refs, &options, output.as_ref())?;
    let used: Vec<&str> = bundle
        .used_comb
        .iter()
        .filter(|(_, used)| **used)
        .map(|(id, _)| id.name())
        .collect();
    tracing::info!(
        "combined {} samples from estimators: {}",
        bundle.prop.n_rows(),
        used.join(", ")
    );

    let summary_path = args
        .summary
        .clone()
        .or_else(|| output.as_ref().map(|o| sibling_path(&o.prop, "summary.json")));
    if let Some(path) = summary_path {
        write_summary_json(&path, &build_summary(&bundle, &options))?;
    }
    Ok(())
}

fn resolve_min_markers(overrides: &[(EstimatorId, usize)]) -> MinMarkers {
    let mut min = MinMarkers::default();
    for &(id, value) in overrides {
        min.set(id, value);
    }
    min
}

fn sibling_path(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn run_filter(args: FilterArgs) -> Result<(), CliError> {
    let matrix = read_table(&args.input)?;
    let (filtered, _) = filter_complete(&matrix, args.min_row, args.min_col)?;
    write_matrix(&args.out, &filtered, "id")?;
    Ok(())
}

fn run_correlate(args: CorrelateArgs) -> Result<(), CliError> {
    let x = read_table(&args.x)?;
    let y = match &args.y {
        Some(path) => read_table(path)?,
        None => x.clone(),
    };
    let result = correlate(&x, &y, args.method, args.threads)?;
    tracing::info!(
        "correlated {} x {} rows over {} shared samples",
        result.r.n_rows(),
        result.r.n_cols(),
        result.n_samples
    );
    write_matrix(&args.out_r, &result.r, "id")?;
    if let Some(path) = &args.out_p {
        write_matrix(path, &result.p, "id")?;
    }
    Ok(())
}

fn run_cap(args: CapArgs) -> Result<(), CliError> {
    let matrix = read_table(&args.input)?;
    let (capped, _) = cap_outliers(&matrix, args.lower, args.upper)?;
    write_matrix(&args.out, &capped, "id")?;
    Ok(())
}

fn run_symbols(args: SymbolsArgs) -> Result<(), CliError> {
    let symbols = load_id_list(&args.symbols)?;
    let path = resolve_table_path(
        args.table.as_deref(),
        args.cache_dir.as_deref(),
        chrono::Utc::now(),
    )?;
    let table = NomenclatureTable::load(&path)?;
    if table.is_empty() {
        return Err(CliError::Usage(format!(
            "{} has no approved symbols",
            path.display()
        )));
    }
    let matches = standardize_symbols(&symbols, &table);
    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_matches(&matches, BufWriter::new(File::create(&args.out)?))?;
    tracing::info!("wrote {}", args.out.display());
    Ok(())
}

fn parse_key_path(raw: &str) -> Result<(EstimatorId, PathBuf), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got {raw}"))?;
    if value.trim().is_empty() {
        return Err(format!("empty path in {raw}"));
    }
    Ok((key.parse()?, PathBuf::from(value.trim())))
}

fn parse_key_count(raw: &str) -> Result<(EstimatorId, usize), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=N, got {raw}"))?;
    let count = value
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid count in {raw}: {e}"))?;
    Ok((key.parse()?, count))
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
