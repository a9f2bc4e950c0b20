//! dupes - Find duplicate files and directory trees.
//!
//! Usage:
//!   dupes report PATHS...                       List duplicate groups
//!   dupes report --golden G... --delete D...    Removal script for copies under D
//!   dupes index PATHS...                        Hash into the cache only
//!   dupes lookup PATHS...                       Show cached copies of each file
//!   dupes find-name PATTERN                     Search cached paths (SQL LIKE)

mod settings;

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dupes_analyze::{
    AggregationConfig, AggregationEngine, AggregationOutcome, AnalyzeError, Blake3Hasher,
    GoldenDelete, MetadataCache, NamePattern, SelectionPolicy, build_report, find_by_content,
    find_by_name,
};
use dupes_scan::{ScanConfig, TreeWalker, Walk, WalkEntry};

use crate::settings::Settings;

/// Exit code after Ctrl+C (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "dupes",
    version,
    about = "Find duplicate files and directory trees",
    long_about = "dupes hashes every file below the given paths, derives a hash for every \
                  directory from its children, and reports identical files and whole \
                  identical trees. Hashes are cached between runs."
)]
struct Cli {
    /// Cache file (defaults to the settings file, then the user cache directory)
    #[arg(long, global = true, value_name = "PATH")]
    cache: Option<PathBuf>,

    /// Settings file (defaults to config.toml in the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug); DUPES_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report duplicate groups, largest first
    Report {
        /// Paths to search for duplicates
        #[arg(required_unless_present = "golden", conflicts_with_all = ["golden", "delete"])]
        paths: Vec<PathBuf>,

        /// Paths whose copies are kept
        #[arg(long, num_args = 1.., requires = "delete", value_name = "PATH")]
        golden: Vec<PathBuf>,

        /// Paths whose copies may be removed when a golden copy exists
        #[arg(long, num_args = 1.., requires = "golden", value_name = "PATH")]
        delete: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Maximum number of groups to show (0 = all)
        #[arg(short = 'n', long, default_value = "0")]
        max_groups: usize,
    },

    /// Hash files into the cache without reporting
    Index {
        /// Paths to hash
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print every cached copy of each file below the paths
    Lookup {
        /// Paths to look up
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print cached paths matching a case-insensitive SQL LIKE pattern
    FindName {
        /// Pattern where % matches any run and _ one character
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("Cannot install interrupt handler")?;
    }

    let cache_path = settings.cache_path(cli.cache.as_deref());
    let mut cache =
        MetadataCache::open(&cache_path).with_autosave_interval(settings.autosave_interval());
    info!(path = %cache_path.display(), entries = cache.len(), "cache opened");

    let ctx = RunContext {
        settings: &settings,
        interrupted: &interrupted,
    };
    let result = match cli.command {
        Command::Report {
            paths,
            golden,
            delete,
            format,
            max_groups,
        } => run_report(&ctx, &mut cache, paths, golden, delete, format, max_groups),
        Command::Index { paths } => run_index(&ctx, &mut cache, paths),
        Command::Lookup { paths } => run_lookup(&ctx, &mut cache, paths),
        Command::FindName { pattern } => run_find_name(&cache, &pattern),
    };

    let stats = cache.stats();
    info!(
        loaded = stats.loaded,
        hits = stats.hits,
        hashed = stats.hashes,
        failures = stats.failures,
        "cache statistics"
    );
    let persisted = cache
        .persist()
        .with_context(|| format!("Cannot save cache {}", cache_path.display()));

    match result {
        Err(err) if is_interrupted(&err) => {
            if let Err(err) = persisted {
                warn!("{err:#}");
            }
            eprintln!("Interrupted.");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(err) => {
            if let Err(err) = persisted {
                warn!("{err:#}");
            }
            Err(err)
        }
        Ok(()) => {
            persisted?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Settings and flags shared by the commands.
struct RunContext<'a> {
    settings: &'a Settings,
    interrupted: &'a Arc<AtomicBool>,
}

impl RunContext<'_> {
    fn check_interrupt(&self) -> Result<(), AnalyzeError> {
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(AnalyzeError::Interrupted);
        }
        Ok(())
    }

    fn walker(&self, roots: Vec<PathBuf>) -> Result<TreeWalker> {
        let config = ScanConfig::builder()
            .roots(roots)
            .ignore_patterns(self.settings.ignore_patterns.clone())
            .include_hidden(self.settings.include_hidden)
            .threads(self.settings.threads)
            .build()
            .context("Invalid scan configuration")?;
        let walker = TreeWalker::new(config).context("Invalid ignore pattern")?;
        Ok(walker.with_interrupt(Arc::clone(self.interrupted)))
    }

    /// Enumerate `roots`, stopping early on Ctrl+C.
    fn walk(&self, roots: Vec<PathBuf>) -> Result<Walk> {
        let walk = self.walker(roots)?.walk();
        if walk.is_interrupted() {
            return Err(AnalyzeError::Interrupted.into());
        }
        Ok(walk)
    }
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("DUPES_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn is_interrupted(err: &color_eyre::Report) -> bool {
    matches!(
        err.downcast_ref::<AnalyzeError>(),
        Some(AnalyzeError::Interrupted)
    )
}

/// Walk `roots` and aggregate every file and directory by hash.
fn aggregate(
    ctx: &RunContext<'_>,
    cache: &mut MetadataCache,
    roots: Vec<PathBuf>,
) -> Result<AggregationOutcome> {
    let mut walk = ctx.walk(roots)?;
    let walk_warnings = walk.take_warnings().len();
    let walk_stats = walk.stats().clone();

    let config = AggregationConfig::builder()
        .parallel_hashing(ctx.settings.parallel_hashing)
        .autosave_interval(ctx.settings.autosave_interval())
        .build()
        .context("Invalid aggregation configuration")?;

    let mut engine = AggregationEngine::new(cache, Blake3Hasher, config)
        .with_interrupt(Arc::clone(ctx.interrupted));
    engine.consume(walk)?;
    let outcome = engine.finish()?;

    info!(
        files = walk_stats.total_files,
        directories = walk_stats.total_dirs,
        size = %format_size(walk_stats.total_size),
        symlinks = walk_stats.total_symlinks,
        excluded = walk_stats.total_excluded,
        warnings = walk_warnings + outcome.warnings.len(),
        "walk finished"
    );
    Ok(outcome)
}

/// Report duplicate groups on stdout.
fn run_report(
    ctx: &RunContext<'_>,
    cache: &mut MetadataCache,
    paths: Vec<PathBuf>,
    golden: Vec<PathBuf>,
    delete: Vec<PathBuf>,
    format: OutputFormat,
    max_groups: usize,
) -> Result<()> {
    let (roots, policy) = if golden.is_empty() {
        (paths, SelectionPolicy::ReportAll)
    } else {
        let policy = GoldenDelete::new(golden, delete);
        let roots = policy.roots().cloned().collect();
        (roots, SelectionPolicy::GoldenDelete(policy))
    };

    let outcome = aggregate(ctx, cache, roots)?;
    let report = build_report(&outcome.aggregates, &policy, max_groups);
    info!(
        groups = report.group_count,
        duplicated = %format_size(report.total_duplicate_size),
        reclaimable = %format_size(report.total_reclaimable),
        "duplicates found"
    );
    if report.truncated {
        info!("Output limited to {max_groups} groups");
    }

    let mut out = BufWriter::new(io::stdout().lock());
    match format {
        OutputFormat::Text => report
            .write_text(&mut out, &ctx.settings.removal_command)
            .context("Cannot write report")?,
        OutputFormat::Json => report.write_json(&mut out).context("Cannot write report")?,
    }
    out.flush().context("Cannot write report")?;
    Ok(())
}

/// Hash everything below `paths` into the cache.
fn run_index(ctx: &RunContext<'_>, cache: &mut MetadataCache, paths: Vec<PathBuf>) -> Result<()> {
    let outcome = aggregate(ctx, cache, paths)?;
    info!(
        hashed = outcome.stats.hashes,
        cache_hits = outcome.stats.cache_hits,
        unhashable = outcome.stats.unhashable_files,
        "index updated"
    );
    Ok(())
}

/// Print every cached copy of each file below `paths`, one block per file.
fn run_lookup(ctx: &RunContext<'_>, cache: &mut MetadataCache, paths: Vec<PathBuf>) -> Result<()> {
    let walk = ctx.walk(paths)?;
    let mut out = BufWriter::new(io::stdout().lock());

    for entry in walk {
        ctx.check_interrupt()?;
        let WalkEntry::File(file) = entry else {
            continue;
        };
        let Some(identity) = file.identity() else {
            continue;
        };

        let stats = cache.get_or_refresh(&identity, file.size, file.modified_at, &Blake3Hasher)?;
        cache.persist_if_due();
        let Some(hash) = stats.content_hash else {
            warn!("Cannot hash {}", file.path.display());
            continue;
        };

        for path in find_by_content(cache, &hash, stats.size) {
            writeln!(out, "{}", path.display())?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Print cached paths matching a LIKE pattern.
fn run_find_name(cache: &MetadataCache, pattern: &str) -> Result<()> {
    let pattern = NamePattern::new(pattern)
        .with_context(|| format!("Invalid pattern {pattern:?}"))?;

    let mut out = BufWriter::new(io::stdout().lock());
    for path in find_by_name(cache, &pattern) {
        writeln!(out, "{}", path.display())?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
