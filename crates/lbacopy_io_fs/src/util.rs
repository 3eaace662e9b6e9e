use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::spec::{CopyTreeError, EnumCopyPatternMode, SpecCopyOptions};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeNamePatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

impl TypeNamePatternSeq {
    fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Literal(v) => v.iter().any(|p| name.contains(p.as_str())),
            Self::Glob(v) => v.iter().any(|p| p.is_match(name)),
            Self::Regex(v) => v.iter().any(|p| p.is_match(name)),
        }
    }
}

/// Compiled include/exclude filters for file and directory basenames.
#[derive(Debug, Clone, Default)]
pub(crate) struct SpecNameFilters {
    patterns_include_files: Option<TypeNamePatternSeq>,
    patterns_exclude_files: Option<TypeNamePatternSeq>,
    patterns_include_dirs: Option<TypeNamePatternSeq>,
    patterns_exclude_dirs: Option<TypeNamePatternSeq>,
}

impl SpecNameFilters {
    pub(crate) fn from_options(spec_cp_options: &SpecCopyOptions) -> Result<Self, CopyTreeError> {
        let rule_pattern = spec_cp_options.rule_pattern;
        Ok(Self {
            patterns_include_files: _compile(
                spec_cp_options.patterns_include_files.as_deref(),
                rule_pattern,
            )?,
            patterns_exclude_files: _compile(
                spec_cp_options.patterns_exclude_files.as_deref(),
                rule_pattern,
            )?,
            patterns_include_dirs: _compile(
                spec_cp_options.patterns_include_dirs.as_deref(),
                rule_pattern,
            )?,
            patterns_exclude_dirs: _compile(
                spec_cp_options.patterns_exclude_dirs.as_deref(),
                rule_pattern,
            )?,
        })
    }

    pub(crate) fn is_file_excluded(&self, name_file: &str) -> bool {
        _is_excluded(
            name_file,
            self.patterns_include_files.as_ref(),
            self.patterns_exclude_files.as_ref(),
        )
    }

    pub(crate) fn is_dir_excluded(&self, name_dir: &str) -> bool {
        _is_excluded(
            name_dir,
            self.patterns_include_dirs.as_ref(),
            self.patterns_exclude_dirs.as_ref(),
        )
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumCopyPatternMode,
) -> Result<Option<TypeNamePatternSeq>, CopyTreeError> {
    let Some(patterns) = patterns.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let seq = match rule_pattern {
        EnumCopyPatternMode::Literal => TypeNamePatternSeq::Literal(patterns.to_vec()),
        EnumCopyPatternMode::Glob => TypeNamePatternSeq::Glob(
            patterns
                .iter()
                .map(|p| Glob::new(p).map(|g| g.compile_matcher()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    CopyTreeError::InvalidPattern(format!("Invalid pattern in include/exclude: {e}"))
                })?,
        ),
        EnumCopyPatternMode::Regex => TypeNamePatternSeq::Regex(
            patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    CopyTreeError::InvalidPattern(format!("Invalid pattern in include/exclude: {e}"))
                })?,
        ),
    };
    Ok(Some(seq))
}

// No include list means "include everything"; exclude wins over include.
fn _is_excluded(
    name: &str,
    patterns_include: Option<&TypeNamePatternSeq>,
    patterns_exclude: Option<&TypeNamePatternSeq>,
) -> bool {
    let b_included = patterns_include.is_none_or(|p| p.is_match(name));
    let b_excluded = patterns_exclude.is_some_and(|p| p.is_match(name));
    !b_included || b_excluded
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    absolutize_path(path)
}

/// Join relative paths onto the working directory; absolute paths pass through.
pub(crate) fn absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// Reject destination items that leave the root or whose parent passes through a symlink.
///
/// Relative plan paths come from the naive relativizer, so a source root given
/// with `..` segments could otherwise write outside `path_dir_dst_root`.
pub(crate) fn validate_destination_path_safety(
    path_dst_item: &Path,
    path_dir_dst_root: &Path,
) -> Result<(), CopyTreeError> {
    let path_dst_item_abs = absolutize_path(path_dst_item);
    let path_dir_dst_root_abs = absolutize_path(path_dir_dst_root);

    let path_rel = path_dst_item_abs
        .strip_prefix(&path_dir_dst_root_abs)
        .map_err(|_| {
            CopyTreeError::UnsafeDestination(format!(
                "Unsafe destination path escapes destination root: {} (root={})",
                path_dst_item.display(),
                path_dir_dst_root.display()
            ))
        })?;
    if path_rel
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(CopyTreeError::UnsafeDestination(format!(
            "Unsafe destination path climbs out of destination root: {}",
            path_dst_item.display()
        )));
    }

    // The item itself may be a link; the conflict rule decides what happens to it.
    let path_parent_rel = path_rel.parent().unwrap_or(Path::new(""));
    let mut path_cursor = path_dir_dst_root_abs;
    for part_rel in path_parent_rel.components() {
        path_cursor.push(part_rel.as_os_str());
        match fs::symlink_metadata(&path_cursor) {
            Ok(meta_cursor) if meta_cursor.file_type().is_symlink() => {
                return Err(CopyTreeError::UnsafeDestination(format!(
                    "Unsafe destination path traverses symlink component: {}",
                    path_cursor.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(CopyTreeError::UnsafeDestination(format!(
                    "Failed to inspect destination path component {} ({e})",
                    path_cursor.display()
                )));
            }
        }
    }

    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CopyPrimitives

/// Create every missing directory above `path_dst`.
pub(crate) fn ensure_parent_dirs(path_dst: &Path) -> Result<(), CopyTreeError> {
    let Some(path_parent) = path_dst.parent() else {
        return Ok(());
    };
    fs::create_dir_all(path_parent).map_err(|e| CopyTreeError::ReplicationFailed {
        path: path_parent.to_path_buf(),
        source: e,
    })
}

/// Byte-for-byte content copy; permissions and timestamps are not carried.
pub(crate) fn copy_file_content(path_file_src: &Path, path_file_dst: &Path) -> Result<u64, CopyTreeError> {
    let mut file_src = fs::File::open(path_file_src).map_err(|e| CopyTreeError::ReplicationFailed {
        path: path_file_src.to_path_buf(),
        source: e,
    })?;
    let mut file_dst =
        fs::File::create(path_file_dst).map_err(|e| CopyTreeError::ReplicationFailed {
            path: path_file_dst.to_path_buf(),
            source: e,
        })?;
    io::copy(&mut file_src, &mut file_dst).map_err(|e| CopyTreeError::ReplicationFailed {
        path: path_file_dst.to_path_buf(),
        source: e,
    })
}

pub(crate) fn create_symbolic_link(target: &Path, path_dst: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, path_dst)
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};
        let path_target_abs = path_dst
            .parent()
            .map(|p| p.join(target))
            .unwrap_or_else(|| target.to_path_buf());
        if path_target_abs.is_dir() {
            symlink_dir(target, path_dst)
        } else {
            symlink_file(target, path_dst)
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, path_dst);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Symbolic links are unsupported on this platform",
        ))
    }
}

/// Remove whatever sits at `path_dst` so it can be rewritten.
pub(crate) fn remove_existing_entry(path_dst: &Path) -> Result<(), CopyTreeError> {
    fs::remove_file(path_dst).map_err(|e| CopyTreeError::ReplicationFailed {
        path: path_dst.to_path_buf(),
        source: e,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Scheduling

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

/// How many items pass between two progress updates.
///
/// Aims for about 100 updates per run and never returns zero, so it is safe to
/// use as a modulus for any total, including empty and single-item plans.
pub(crate) fn calculate_progress_interval(n_total: u64) -> u64 {
    (n_total / 100).max(1)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        SpecNameFilters, calculate_progress_interval, calculate_worker_limit,
        validate_destination_path_safety,
    };
    use crate::spec::{CopyTreeError, EnumCopyPatternMode, SpecCopyOptions};

    #[test]
    fn name_filters_glob_include_and_exclude() {
        let spec_cp_options = SpecCopyOptions {
            patterns_include_files: Some(vec!["*.raw".to_string()]),
            patterns_exclude_files: Some(vec!["tmp_*".to_string()]),
            ..SpecCopyOptions::default()
        };
        let filters = SpecNameFilters::from_options(&spec_cp_options).expect("compile");

        assert!(!filters.is_file_excluded("img_0001.raw"));
        assert!(filters.is_file_excluded("tmp_0001.raw"));
        assert!(filters.is_file_excluded("img_0001.jpg"));
        assert!(!filters.is_dir_excluded("anything"));
    }

    #[test]
    fn name_filters_regex_and_literal() {
        let spec_cp_options = SpecCopyOptions {
            patterns_exclude_dirs: Some(vec![r"^\.git$".to_string()]),
            rule_pattern: EnumCopyPatternMode::Regex,
            ..SpecCopyOptions::default()
        };
        let filters = SpecNameFilters::from_options(&spec_cp_options).expect("compile");
        assert!(filters.is_dir_excluded(".git"));
        assert!(!filters.is_dir_excluded(".github"));

        let spec_cp_options = SpecCopyOptions {
            patterns_include_files: Some(vec!["report".to_string()]),
            rule_pattern: EnumCopyPatternMode::Literal,
            ..SpecCopyOptions::default()
        };
        let filters = SpecNameFilters::from_options(&spec_cp_options).expect("compile");
        assert!(!filters.is_file_excluded("q3_report.csv"));
        assert!(filters.is_file_excluded("notes.txt"));
    }

    #[test]
    fn name_filters_reject_invalid_patterns() {
        let spec_cp_options = SpecCopyOptions {
            patterns_include_files: Some(vec!["(".to_string()]),
            rule_pattern: EnumCopyPatternMode::Regex,
            ..SpecCopyOptions::default()
        };
        let err = SpecNameFilters::from_options(&spec_cp_options).expect_err("must fail");
        assert!(matches!(err, CopyTreeError::InvalidPattern(_)));

        let spec_cp_options = SpecCopyOptions {
            patterns_include_files: Some(vec!["[".to_string()]),
            ..SpecCopyOptions::default()
        };
        let err = SpecNameFilters::from_options(&spec_cp_options).expect_err("must fail");
        assert!(matches!(err, CopyTreeError::InvalidPattern(_)));
    }

    #[test]
    fn destination_safety_rejects_escape() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_root = tmp.path().join("dst");
        std::fs::create_dir_all(&path_root).expect("mkdir");

        assert!(validate_destination_path_safety(&path_root.join("a/b.txt"), &path_root).is_ok());
        assert!(matches!(
            validate_destination_path_safety(&path_root.join("../out.txt"), &path_root),
            Err(CopyTreeError::UnsafeDestination(_))
        ));
        assert!(matches!(
            validate_destination_path_safety(Path::new("/elsewhere/x"), &path_root),
            Err(CopyTreeError::UnsafeDestination(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn destination_safety_rejects_symlink_component() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_root = tmp.path().join("dst");
        let path_outside = tmp.path().join("outside");
        std::fs::create_dir_all(&path_root).expect("mkdir dst");
        std::fs::create_dir_all(&path_outside).expect("mkdir outside");
        std::os::unix::fs::symlink(&path_outside, path_root.join("escape")).expect("symlink");

        assert!(matches!(
            validate_destination_path_safety(&path_root.join("escape/file.txt"), &path_root),
            Err(CopyTreeError::UnsafeDestination(_))
        ));
    }

    #[test]
    fn destination_safety_allows_existing_symlink_leaf() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_root = tmp.path().join("dst");
        std::fs::create_dir_all(path_root.join("sub")).expect("mkdir dst");
        std::fs::write(path_root.join("sub/a.bin"), b"a").expect("write");
        std::os::unix::fs::symlink("a.bin", path_root.join("sub/link_a")).expect("symlink");

        assert!(validate_destination_path_safety(&path_root.join("sub/link_a"), &path_root).is_ok());
    }

    #[test]
    fn progress_interval_never_zero() {
        assert_eq!(calculate_progress_interval(0), 1);
        assert_eq!(calculate_progress_interval(1), 1);
        assert_eq!(calculate_progress_interval(29), 1);
        assert_eq!(calculate_progress_interval(250), 2);
        assert_eq!(calculate_progress_interval(1_000_000), 10_000);
    }

    #[test]
    fn worker_limit_clamps_to_at_least_one() {
        assert_eq!(calculate_worker_limit(Some(0)), 1);
        assert!(calculate_worker_limit(None) >= 1);
    }
}
