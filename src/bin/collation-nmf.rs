#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use collation_nmf::{
    Collation, CollationConfig, FactorizationReport, Init, MatrixTable, Pipeline,
};

#[derive(Parser)]
#[command(
    name = "collation-nmf",
    version,
    about = "Group manuscript witnesses by factoring a collation matrix"
)]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CollationArgs {
    /// Collation JSON file
    input: PathBuf,
    /// Run configuration (.json or .toml); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Identifier prefix of ambiguous readings
    #[arg(short = 'w', long)]
    ambiguous_prefix: Option<String>,
    /// Subwitness suffix to strip from sigla (repeatable)
    #[arg(short = 's', long = "suffix")]
    suffixes: Vec<String>,
    /// Reading type folded into the preceding substantive reading (repeatable)
    #[arg(short = 't', long = "trivial-type")]
    trivial_types: Vec<String>,
    /// Reading type to ignore (repeatable)
    #[arg(short = 'z', long = "ignore-type")]
    ignore_types: Vec<String>,
    /// Reading type treated as ambiguous (repeatable)
    #[arg(long = "ambiguous-type")]
    ambiguous_types: Vec<String>,
    /// Minimum share of extant units for a complete witness
    #[arg(short = 'p', long)]
    proportion: Option<f64>,
    /// Weight readings by inverse witness frequency
    #[arg(long)]
    use_tfidf: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the collation matrix
    Matrix {
        #[command(flatten)]
        collation: CollationArgs,
        #[arg(long, value_enum, default_value_t = MatrixFormat::Json)]
        format: MatrixFormat,
        /// Export the complete-witness matrix used for factorization
        #[arg(long)]
        training: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Sweep a rank range and report fit quality per rank
    EstimateRank {
        #[command(flatten)]
        collation: CollationArgs,
        min_rank: usize,
        max_rank: usize,
        /// Random restarts per rank
        #[arg(long)]
        nrun: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Factor at a fixed rank and classify every witness
    Factorize {
        #[command(flatten)]
        collation: CollationArgs,
        rank: usize,
        #[arg(long, value_enum)]
        init: Option<InitArg>,
        #[arg(long)]
        max_iter: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Rescale fragmentary coefficients to sum to one
        #[arg(long)]
        normalize: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MatrixFormat {
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum InitArg {
    Nndsvd,
    Random,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Matrix {
            collation,
            format,
            training,
            out,
        } => {
            let (config, input) = load(&collation)?;
            let pipeline = Pipeline::new(config)?;
            // Only the training export needs a complete witness.
            let table = if training {
                MatrixTable::training(&pipeline.prepare(&input)?)
            } else {
                MatrixTable::full(&pipeline.assemble(&input)?)
            };
            match format {
                MatrixFormat::Json => write_json(out.as_deref(), &table)?,
                MatrixFormat::Csv => {
                    let mut sink = open_output(out.as_deref())?;
                    table.write_csv(&mut sink)?;
                    sink.flush()?;
                }
            }
        }
        Commands::EstimateRank {
            collation,
            min_rank,
            max_rank,
            nrun,
            seed,
            out,
        } => {
            let (mut config, input) = load(&collation)?;
            if let Some(nrun) = nrun {
                config.nmf.n_run = nrun;
            }
            if let Some(seed) = seed {
                config.nmf.seed = seed;
            }
            let pipeline = Pipeline::new(config)?;
            let prepared = pipeline.prepare(&input)?;
            let metrics = pipeline.estimate_rank(&prepared, min_rank, max_rank)?;
            write_json(out.as_deref(), &metrics)?;
        }
        Commands::Factorize {
            collation,
            rank,
            init,
            max_iter,
            seed,
            normalize,
            out,
        } => {
            let (mut config, input) = load(&collation)?;
            if let Some(init) = init {
                config.nmf.init = match init {
                    InitArg::Nndsvd => Init::Nndsvd,
                    InitArg::Random => Init::RandomVcol,
                };
            }
            if let Some(max_iter) = max_iter {
                config.nmf.max_iter = max_iter;
            }
            if let Some(seed) = seed {
                config.nmf.seed = seed;
            }
            config.normalize_fragmentary |= normalize;

            let pipeline = Pipeline::new(config)?;
            let prepared = pipeline.prepare(&input)?;
            let output = pipeline.factorize(&prepared, rank)?;
            write_json(out.as_deref(), &FactorizationReport::new(&prepared, &output))?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

/// Config file (if any) with CLI overrides applied, plus the parsed collation.
fn load(args: &CollationArgs) -> Result<(CollationConfig, Collation), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => CollationConfig::from_path(path)?,
        None => CollationConfig::default(),
    };
    if let Some(prefix) = &args.ambiguous_prefix {
        config.ambiguous_prefix = prefix.clone();
    }
    if !args.suffixes.is_empty() {
        config.trivial_suffixes = args.suffixes.clone();
    }
    if !args.trivial_types.is_empty() {
        config.trivial_types = args.trivial_types.clone();
    }
    if !args.ignore_types.is_empty() {
        config.ignore_types = args.ignore_types.clone();
    }
    if !args.ambiguous_types.is_empty() {
        config.ambiguous_types = args.ambiguous_types.clone();
    }
    if let Some(p) = args.proportion {
        config.min_extant_proportion = p;
    }
    config.use_tfidf |= args.use_tfidf;

    let collation = Collation::from_path(&args.input)?;
    Ok((config, collation))
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, io::Error> {
    Ok(match path {
        Some(path) => Box::new(io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    })
}

fn write_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    match path {
        Some(path) => std::fs::write(path, json),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")
        }
    }
}
