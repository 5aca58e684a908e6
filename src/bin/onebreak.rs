use std::path::Path;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, error};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use onebreak::config::ParseConfig;
use onebreak::pipeline::{ParseRunner, cluster_file};

#[derive(Parser)]
#[command(name = "onebreak")]
#[command(
    about = "Junction-read breakpoint extraction and clustering",
    long_about = "Extracts soft/hard-clipped junction evidence from coordinate-sorted BAM/CRAM files and clusters it into breakpoint candidates for somatic structural variant discovery."
)]
struct Cli {
    /// Log verbosity level
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Write log output to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,
    /// Append to log file instead of truncating
    #[arg(long, global = true)]
    append_log: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Parameter overrides shared by both subcommands; unset flags keep the
/// value from `--config` (or the built-in default).
#[derive(Args)]
struct ParamArgs {
    /// Path to a JSON parameter file (key_seq_size, min_major_clip_size, max_minor_clip_size, check_interval).
    #[arg(long)]
    config: Option<String>,
    /// Maximum junction position gap before the clustering window is closed.
    #[arg(long)]
    check_interval: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract junction evidence from an alignment file and cluster it
    Parse {
        /// Coordinate-sorted BAM/CRAM file. A .bai/.crai index is only needed with --region.
        #[arg(long, required = true)]
        bam: String,
        /// Reference genome FASTA (required for CRAM input). Must be indexed (.fai).
        #[arg(long)]
        reference: Option<String>,
        /// Output breakpoint file. Paths ending in .gz are bgzip-compressed and tabix-indexed.
        #[arg(short, long, required = true)]
        output: String,
        /// Restrict extraction to a region (e.g., "chr7:55000000-56000000"). Requires an index.
        #[arg(long)]
        region: Option<String>,
        #[command(flatten)]
        params: ParamArgs,
        /// Number of clipped bases kept as the junction sequence.
        #[arg(long)]
        key_seq_size: Option<usize>,
        /// Minimum clip length for a side to count as junction evidence.
        #[arg(long)]
        min_major_clip_size: Option<u32>,
        /// Maximum clip length tolerated on the opposite side (used by downstream filtering).
        #[arg(long)]
        max_minor_clip_size: Option<u32>,
        /// Keep the sorted, unclustered evidence in <output>.bp.tmp.txt.
        #[arg(long)]
        debug: bool,
        /// Write run statistics as JSON to this path.
        #[arg(long)]
        stats: Option<String>,
        /// Force overwrite of existing output files.
        #[arg(short, long)]
        force: bool,
    },
    /// Re-cluster an existing raw or clustered breakpoint file
    Cluster {
        /// Breakpoint file sorted by chromosome and junction position (plain or .gz).
        #[arg(short, long, required = true)]
        input: String,
        /// Output breakpoint file. Paths ending in .gz are bgzip-compressed and tabix-indexed.
        #[arg(short, long, required = true)]
        output: String,
        #[command(flatten)]
        params: ParamArgs,
        /// Force overwrite of existing output files.
        #[arg(short, long)]
        force: bool,
    },
}

// Helper to check output paths and create directories
fn check_output_paths(paths: &[&str], force: bool) -> Result<(), Box<dyn std::error::Error>> {
    for p in paths {
        let path = Path::new(p);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty() && !parent.exists() {
                info!("Creating output directory: {:?}", parent);
                std::fs::create_dir_all(parent)?;
            }

        if !force && path.exists() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("Output file {} already exists. Use --force to overwrite.", p),
            )));
        }
    }
    Ok(())
}

fn load_config(params: &ParamArgs) -> Result<ParseConfig, onebreak::error::Error> {
    let mut config = match &params.config {
        Some(path) => ParseConfig::load(path)?,
        None => ParseConfig::default(),
    };
    if let Some(v) = params.check_interval {
        config.check_interval = v;
    }
    Ok(config)
}

struct StepTimer {
    start: std::time::Instant,
}

impl StepTimer {
    fn start(name: &str) -> Self {
        info!("===== [STAGE] {} =====", name);
        Self { start: std::time::Instant::now() }
    }
    fn end(&self) {
        info!("----- Total Time: {:.2?} -----", self.start.elapsed());
    }
}

fn main() {
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder
        .filter_level(cli.log_level.to_level_filter())
        .format_module_path(false);
    if let Some(ref path) = cli.log_file {
        let file = if cli.append_log {
            std::fs::File::options().create(true).append(true).open(path)
        } else {
            std::fs::File::create(path)
        };
        match file {
            Ok(file) => {
                log_builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Could not open log file '{}': {}", path, e);
                std::process::exit(1);
            }
        }
    }
    log_builder.init();

    match &cli.command {
        Commands::Parse {
            bam,
            reference,
            output,
            region,
            params,
            key_seq_size,
            min_major_clip_size,
            max_minor_clip_size,
            debug,
            stats,
            force,
        } => {
            let raw_path = format!("{}.bp.tmp.txt", output);
            let tbi_path = format!("{}.tbi", output);
            let mut outputs = vec![output.as_str()];
            if output.ends_with(".gz") {
                outputs.push(&tbi_path);
            }
            if *debug {
                outputs.push(&raw_path);
            }
            if let Some(s) = stats {
                outputs.push(s);
            }
            if let Err(e) = check_output_paths(&outputs, *force) {
                error!("{}", e);
                std::process::exit(1);
            }

            let mut config = match load_config(params) {
                Ok(c) => c,
                Err(e) => {
                    error!("Error loading parameters: {}", e);
                    std::process::exit(1);
                }
            };
            if let Some(v) = key_seq_size {
                config.key_seq_size = *v;
            }
            if let Some(v) = min_major_clip_size {
                config.min_major_clip_size = *v;
            }
            if let Some(v) = max_minor_clip_size {
                config.max_minor_clip_size = *v;
            }

            let timer = StepTimer::start("Parse");
            let result = ParseRunner::new(bam, output)
                .with_reference(reference.as_deref())
                .with_region(region.as_deref())
                .with_config(config)
                .with_debug(*debug)
                .run();
            match result {
                Ok(run_stats) => {
                    if let Some(path) = stats
                        && let Err(e) = run_stats.write_json(path) {
                            error!("Error writing stats {}: {}", path, e);
                            std::process::exit(1);
                        }
                    timer.end();
                }
                Err(e) => {
                    error!("Error parsing {}: {:#}", bam, e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Cluster {
            input,
            output,
            params,
            force,
        } => {
            let tbi_path = format!("{}.tbi", output);
            let mut outputs = vec![output.as_str()];
            if output.ends_with(".gz") {
                outputs.push(&tbi_path);
            }
            if let Err(e) = check_output_paths(&outputs, *force) {
                error!("{}", e);
                std::process::exit(1);
            }
            let config = match load_config(params).and_then(|c| c.validate().map(|_| c)) {
                Ok(c) => c,
                Err(e) => {
                    error!("Error loading parameters: {}", e);
                    std::process::exit(1);
                }
            };

            let timer = StepTimer::start("Cluster");
            if let Err(e) = cluster_file(input, output, config.check_interval) {
                error!("Error clustering {}: {:#}", input, e);
                std::process::exit(1);
            }
            timer.end();
        }
    }
}
