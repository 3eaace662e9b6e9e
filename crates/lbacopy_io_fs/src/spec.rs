//! Copy specification models, walk observations and top-level error types.

use std::io;
use std::path::PathBuf;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// What the replicator does with recorded symbolic links.
///
/// Links are never followed during the walk; this only decides what the
/// replicator does with the recorded observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopySymlinkStrategy {
    /// Create a symbolic link at destination with the recorded target text.
    CopySymlinks,
    /// Record symlink entries but do not recreate them.
    SkipSymlinks,
}

/// Behaviour when a destination entry is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyFileConflictStrategy {
    /// Leave the existing entry alone and count the source as skipped.
    Skip,
    /// Remove the existing entry, then write.
    Overwrite,
    /// Abort the run.
    Error,
}

/// What to do with files that share a block address with an already planned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyHardlinkStrategy {
    /// Copy each duplicate entry as an independent file after the ordered plan.
    CopyIndependent,
    /// Report duplicates only; they are absent from the destination.
    Skip,
}

/// What to do with files whose block address could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyUnmappedStrategy {
    /// Copy unmapped files after the ordered plan.
    Copy,
    /// Report unmapped files only; they are absent from the destination.
    Skip,
}

/// How include/exclude name patterns are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyPatternMode {
    /// `globset` wildcards matched against the entry name.
    Glob,
    /// `regex` search against the entry name.
    Regex,
    /// Substring match.
    Literal,
}

/// Result of classifying one non-directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumFileClassification {
    /// Regular file with a usable block address.
    RegularMapped {
        /// Resolved block address, never `0`.
        address: u64,
        /// Path relative to the source root.
        path_rel: PathBuf,
    },
    /// Regular file for which the resolver returned `0`.
    RegularUnmapped(PathBuf),
    /// Symbolic link and its raw target text.
    Symlink {
        /// Absolute path of the link itself.
        path: PathBuf,
        /// Link target as stored, unresolved.
        target: PathBuf,
    },
    /// Special files, broken links and anything else not worth recording.
    Ignored,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Knobs for [`crate::scan_tree`], [`crate::replicate`] and [`crate::copy_tree`].
///
/// The defaults copy everything and stop at the first existing destination file.
#[derive(Debug, Clone)]
pub struct SpecCopyOptions {
    /// Keep only files whose name matches one of these.
    pub patterns_include_files: Option<Vec<String>>,
    /// Drop files whose name matches one of these.
    pub patterns_exclude_files: Option<Vec<String>>,
    /// Descend only into directories whose name matches one of these.
    pub patterns_include_dirs: Option<Vec<String>>,
    /// Never descend into directories whose name matches one of these.
    pub patterns_exclude_dirs: Option<Vec<String>>,
    pub rule_pattern: EnumCopyPatternMode,
    pub rule_conflict_file: EnumCopyFileConflictStrategy,
    pub rule_symlink: EnumCopySymlinkStrategy,
    pub rule_hardlink: EnumCopyHardlinkStrategy,
    pub rule_unmapped: EnumCopyUnmappedStrategy,
    /// Maximum worker threads for the address-resolution stage.
    pub num_workers_max: Option<usize>,
    /// Do not mutate filesystem; scan and plan only.
    pub if_dry_run: bool,
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        Self {
            patterns_include_files: None,
            patterns_exclude_files: None,
            patterns_include_dirs: None,
            patterns_exclude_dirs: None,
            rule_pattern: EnumCopyPatternMode::Glob,
            rule_conflict_file: EnumCopyFileConflictStrategy::Error,
            rule_symlink: EnumCopySymlinkStrategy::CopySymlinks,
            rule_hardlink: EnumCopyHardlinkStrategy::CopyIndependent,
            rule_unmapped: EnumCopyUnmappedStrategy::Copy,
            num_workers_max: None,
            if_dry_run: false,
        }
    }
}

/// Second directory entry found at an address the plan already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecHardlinkObservation {
    /// Relative path already stored in the plan for this address.
    pub path_rel_existing: PathBuf,
    /// Absolute path of the entry that was not planned.
    pub path_abs_duplicate: PathBuf,
}

/// Symbolic link seen during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSymlinkObservation {
    /// Absolute path of the link.
    pub path_abs: PathBuf,
    /// Raw link target text.
    pub target: PathBuf,
}

/// Failure of the naive relativizer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelativizeError {
    #[error("path or base was empty; couldn't generate relative path")]
    EmptyInput,
}

/// "Top-level call failed" errors (validation, contract and replication stage).
#[derive(Debug, thiserror::Error)]
pub enum CopyTreeError {
    /// Invalid include/exclude pattern.
    #[error("{0}")]
    InvalidPattern(String),

    /// Source path is not a directory.
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    /// Source and destination overlap (`src` contains `dst` or vice versa).
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        .path_dir_src.display(),
        .path_dir_dst.display()
    )]
    SourceDestinationOverlap {
        /// Normalized source directory.
        path_dir_src: PathBuf,
        /// Normalized destination directory.
        path_dir_dst: PathBuf,
    },

    /// Destination directory initialization failed.
    #[error("Failed to initialize destination {}: {message}", .path.display())]
    DestinationInitFailed {
        /// Destination path that failed initialization.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },

    /// Relative path computation was handed an empty path.
    #[error(transparent)]
    Relativize(#[from] RelativizeError),

    /// Destination item would escape the destination root.
    #[error("{0}")]
    UnsafeDestination(String),

    /// Destination file exists and the conflict rule is `Error`.
    #[error("Destination exists: {}", .0.display())]
    DestinationExists(PathBuf),

    /// Directory creation or content copy failed; the run stops here.
    #[error("Replication failed at {}: {source}", .path.display())]
    ReplicationFailed {
        /// Path being created or written.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
