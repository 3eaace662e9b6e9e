//! # lbacopy CLI
//!
//! Copy a directory tree in ascending physical block order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use lbacopy_io_fs::{
    BlockAddressResolver, EnumCopyFileConflictStrategy, EnumCopyHardlinkStrategy,
    EnumCopyPatternMode, EnumCopySymlinkStrategy, EnumCopyUnmappedStrategy, FiemapResolver,
    InodeResolver, ProgressSink, ReportCopy, SpecCopyOptions, default_resolver, replicate,
    scan_tree,
};

/// Copy a directory tree, reading files in the order their data sits on disk.
#[derive(Parser, Debug)]
#[command(name = "lbacopy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source directory tree
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Destination directory, created if missing
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// Block address lookup
    #[arg(long, value_enum, default_value_t = ArgResolver::Auto)]
    resolver: ArgResolver,

    /// What to do when a destination file already exists
    #[arg(long, value_enum, default_value_t = ArgConflict::Error)]
    on_conflict: ArgConflict,

    /// Recreate or skip symbolic links
    #[arg(long, value_enum, default_value_t = ArgCopyOrSkip::Copy)]
    symlinks: ArgCopyOrSkip,

    /// Copy files sharing a block address as independent files, or skip them
    #[arg(long, value_enum, default_value_t = ArgCopyOrSkip::Copy)]
    hardlinks: ArgCopyOrSkip,

    /// Copy or skip files without a block address (usually empty files)
    #[arg(long, value_enum, default_value_t = ArgCopyOrSkip::Copy)]
    unmapped: ArgCopyOrSkip,

    /// Only copy files whose name matches (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    include: Vec<String>,

    /// Skip files whose name matches (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Only descend into directories whose name matches (repeatable)
    #[arg(long = "include-dir", value_name = "PATTERN")]
    include_dir: Vec<String>,

    /// Do not descend into directories whose name matches (repeatable)
    #[arg(long = "exclude-dir", value_name = "PATTERN")]
    exclude_dir: Vec<String>,

    /// How include/exclude patterns are interpreted
    #[arg(long, value_enum, default_value_t = ArgPatternMode::Glob)]
    pattern_mode: ArgPatternMode,

    /// Threads used for block address lookup
    #[arg(short = 'j', long, env = "LBACOPY_THREADS")]
    threads: Option<usize>,

    /// Scan and plan only, write nothing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the ordered plan (address, relative path)
    #[arg(long)]
    list: bool,

    /// Do not draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ArgResolver {
    /// FIEMAP on Linux, inode numbers elsewhere
    Auto,
    Fiemap,
    Inode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ArgConflict {
    Skip,
    Overwrite,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ArgCopyOrSkip {
    Copy,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ArgPatternMode {
    Glob,
    Regex,
    Literal,
}

impl From<ArgConflict> for EnumCopyFileConflictStrategy {
    fn from(arg: ArgConflict) -> Self {
        match arg {
            ArgConflict::Skip => Self::Skip,
            ArgConflict::Overwrite => Self::Overwrite,
            ArgConflict::Error => Self::Error,
        }
    }
}

impl From<ArgPatternMode> for EnumCopyPatternMode {
    fn from(arg: ArgPatternMode) -> Self {
        match arg {
            ArgPatternMode::Glob => Self::Glob,
            ArgPatternMode::Regex => Self::Regex,
            ArgPatternMode::Literal => Self::Literal,
        }
    }
}

fn non_empty(patterns: &[String]) -> Option<Vec<String>> {
    (!patterns.is_empty()).then(|| patterns.to_vec())
}

impl Cli {
    fn to_copy_options(&self) -> SpecCopyOptions {
        SpecCopyOptions {
            patterns_include_files: non_empty(&self.include),
            patterns_exclude_files: non_empty(&self.exclude),
            patterns_include_dirs: non_empty(&self.include_dir),
            patterns_exclude_dirs: non_empty(&self.exclude_dir),
            rule_pattern: self.pattern_mode.into(),
            rule_conflict_file: self.on_conflict.into(),
            rule_symlink: match self.symlinks {
                ArgCopyOrSkip::Copy => EnumCopySymlinkStrategy::CopySymlinks,
                ArgCopyOrSkip::Skip => EnumCopySymlinkStrategy::SkipSymlinks,
            },
            rule_hardlink: match self.hardlinks {
                ArgCopyOrSkip::Copy => EnumCopyHardlinkStrategy::CopyIndependent,
                ArgCopyOrSkip::Skip => EnumCopyHardlinkStrategy::Skip,
            },
            rule_unmapped: match self.unmapped {
                ArgCopyOrSkip::Copy => EnumCopyUnmappedStrategy::Copy,
                ArgCopyOrSkip::Skip => EnumCopyUnmappedStrategy::Skip,
            },
            num_workers_max: self.threads,
            if_dry_run: self.dry_run,
        }
    }

    fn build_resolver(&self) -> Box<dyn BlockAddressResolver> {
        match self.resolver {
            ArgResolver::Auto => default_resolver(),
            ArgResolver::Fiemap => Box::new(FiemapResolver),
            ArgResolver::Inode => Box::new(InodeResolver),
        }
    }
}

/// Percentage bar on stdout, driven by the replicator.
struct BarProgress {
    if_enabled: bool,
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new(if_enabled: bool) -> Self {
        Self {
            if_enabled,
            bar: None,
        }
    }
}

impl ProgressSink for BarProgress {
    fn start(&mut self, n_total: u64) {
        if !self.if_enabled || n_total == 0 {
            return;
        }
        let bar = ProgressBar::with_draw_target(Some(n_total), ProgressDrawTarget::stdout());
        let style = ProgressStyle::with_template(
            "[{bar:30.blue}] {percent:>3} % {pos}/{len} files, {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn update(&mut self, n_done: u64, _n_total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_position(n_done);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

fn init_tracing(if_quiet: bool) {
    let c_level_default = if if_quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LBACOPY_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(c_level_default)),
        )
        .init();
}

fn run(cli: &Cli) -> Result<ReportCopy> {
    let spec_cp_options = cli.to_copy_options();
    let resolver = cli.build_resolver();
    tracing::debug!(resolver = ?cli.resolver, threads = ?cli.threads, "Options parsed");

    let scan = scan_tree(&cli.source, resolver.as_ref(), &spec_cp_options)
        .with_context(|| format!("Failed to enumerate {}", cli.source.display()))?;
    println!("{}", scan.report.format_scan_summary());

    if cli.list {
        for (address, path_rel) in scan.plan.iter() {
            println!("{address}\t{}", path_rel.display());
        }
    }

    let mut progress = BarProgress::new(!cli.no_progress && !cli.quiet);
    let report = replicate(&scan, &cli.destination, &spec_cp_options, &mut progress)
        .with_context(|| format!("Failed to replicate into {}", cli.destination.display()))?;
    Ok(report)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let report = run(&cli)?;
    println!("{report}");
    Ok(())
}
