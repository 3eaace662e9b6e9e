//! Address-ordered replication and `copy_tree` orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use crate::path::relativize;
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::resolve::BlockAddressResolver;
use crate::spec::{
    CopyTreeError, EnumCopyFileConflictStrategy, EnumCopyHardlinkStrategy,
    EnumCopySymlinkStrategy, EnumCopyUnmappedStrategy, SpecCopyOptions,
};
use crate::util::{
    absolutize_path, calculate_progress_interval, copy_file_content, create_symbolic_link,
    ensure_parent_dirs, is_overlap, remove_existing_entry, validate_destination_path_safety,
};
use crate::walk::{SpecTreeScan, scan_tree};

/// Receiver of replication progress.
///
/// `update` is called at most about a hundred times per run and always once
/// with `n_done == n_total` at the end of a non-empty run.
pub trait ProgressSink {
    fn start(&mut self, _n_total: u64) {}
    fn update(&mut self, n_done: u64, n_total: u64);
    fn finish(&mut self) {}
}

/// Discards progress.
impl ProgressSink for () {
    fn update(&mut self, _n_done: u64, _n_total: u64) {}
}

struct SpecProgressTicker<'a> {
    progress: &'a mut dyn ProgressSink,
    n_done: u64,
    n_total: u64,
    n_interval: u64,
}

impl<'a> SpecProgressTicker<'a> {
    fn new(progress: &'a mut dyn ProgressSink, n_total: u64) -> Self {
        progress.start(n_total);
        Self {
            progress,
            n_done: 0,
            n_total,
            n_interval: calculate_progress_interval(n_total),
        }
    }

    fn tick(&mut self) {
        self.n_done += 1;
        if self.n_done % self.n_interval == 0 || self.n_done == self.n_total {
            self.progress.update(self.n_done, self.n_total);
        }
    }
}

impl Drop for SpecProgressTicker<'_> {
    fn drop(&mut self) {
        self.progress.finish();
    }
}

/// Copy a directory tree from `dir_source` to `dir_destination` in block order.
///
/// Overlapping source and destination are rejected before the walk starts.
/// This function then performs:
/// 1. Source walk, classification and address-ordered planning ([`scan_tree`]).
/// 2. Destination validation and replication ([`replicate`]).
///
/// Returns the combined [`ReportCopy`]. Any failure while writing the
/// destination aborts the run.
pub fn copy_tree<P, Q, R>(
    dir_source: P,
    dir_destination: Q,
    resolver: &R,
    spec_cp_options: &SpecCopyOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ReportCopy, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: BlockAddressResolver + ?Sized,
{
    let path_dir_src = absolutize_path(dir_source.as_ref());
    let path_dir_dst = absolutize_path(dir_destination.as_ref());
    if is_overlap(&path_dir_src, &path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            path_dir_src,
            path_dir_dst,
        });
    }

    let scan = scan_tree(&path_dir_src, resolver, spec_cp_options)?;
    tracing::info!("{}", scan.report.format_scan_summary());
    replicate(&scan, &path_dir_dst, spec_cp_options, progress)
}

/// Write the scanned tree below `dir_destination`.
///
/// The ordered plan is replicated first, in ascending block address. Then, as
/// configured, unmapped files, hard-link duplicates and symbolic links follow.
/// Directory hierarchies are created as needed.
///
/// # Errors
/// Every error is fatal; nothing is retried and already written files stay.
/// - [`CopyTreeError::SourceDestinationOverlap`] / [`CopyTreeError::DestinationInitFailed`]
///   before anything is written.
/// - [`CopyTreeError::ReplicationFailed`] for directory creation or copy failures.
/// - [`CopyTreeError::DestinationExists`] when the conflict rule is `Error`.
/// - [`CopyTreeError::UnsafeDestination`] for items escaping the destination root.
pub fn replicate<Q>(
    scan: &SpecTreeScan,
    dir_destination: Q,
    spec_cp_options: &SpecCopyOptions,
    progress: &mut dyn ProgressSink,
) -> Result<ReportCopy, CopyTreeError>
where
    Q: AsRef<Path>,
{
    let path_dir_src = &scan.path_dir_src;
    let path_dir_dst = prepare_destination(
        path_dir_src,
        dir_destination.as_ref(),
        spec_cp_options.if_dry_run,
    )?;
    let mut builder_report = ReportCopyBuilder::from_report(scan.report.clone());

    let b_copy_unmapped = spec_cp_options.rule_unmapped == EnumCopyUnmappedStrategy::Copy;
    let b_copy_hardlinks =
        spec_cp_options.rule_hardlink == EnumCopyHardlinkStrategy::CopyIndependent;
    let b_copy_symlinks = spec_cp_options.rule_symlink == EnumCopySymlinkStrategy::CopySymlinks;

    if spec_cp_options.if_dry_run {
        let n_skipped =
            scan.plan.len() + scan.unmapped.len() + scan.hardlinks().len() + scan.symlinks.len();
        builder_report.add_counts(&["cnt_skipped"], n_skipped as u64);
        return Ok(builder_report.build());
    }

    let n_total = scan.plan.len() as u64
        + if b_copy_unmapped { scan.unmapped.len() as u64 } else { 0 }
        + if b_copy_hardlinks { scan.hardlinks().len() as u64 } else { 0 }
        + if b_copy_symlinks { scan.symlinks.len() as u64 } else { 0 };
    let mut ticker = SpecProgressTicker::new(progress, n_total);
    let rule_conflict = spec_cp_options.rule_conflict_file;

    tracing::info!(files = scan.plan.len(), destination = %path_dir_dst.display(), "Replicating in block order");
    for (address, path_rel) in scan.plan.iter() {
        tracing::trace!(address, path = %path_rel.display(), "Copy");
        replicate_file(
            &path_dir_src.join(path_rel),
            &path_dir_dst.join(path_rel),
            &path_dir_dst,
            rule_conflict,
            &mut builder_report,
        )?;
        ticker.tick();
    }

    for path_file_src in &scan.unmapped {
        if !b_copy_unmapped {
            builder_report.add_skipped();
            continue;
        }
        let path_rel = relativize(path_file_src, path_dir_src)?;
        replicate_file(
            path_file_src,
            &path_dir_dst.join(path_rel),
            &path_dir_dst,
            rule_conflict,
            &mut builder_report,
        )?;
        ticker.tick();
    }

    for spec_hardlink in scan.hardlinks() {
        if !b_copy_hardlinks {
            builder_report.add_skipped();
            continue;
        }
        let path_rel = relativize(&spec_hardlink.path_abs_duplicate, path_dir_src)?;
        replicate_file(
            &spec_hardlink.path_abs_duplicate,
            &path_dir_dst.join(path_rel),
            &path_dir_dst,
            rule_conflict,
            &mut builder_report,
        )?;
        ticker.tick();
    }

    for spec_symlink in &scan.symlinks {
        if !b_copy_symlinks {
            builder_report.add_skipped();
            continue;
        }
        let path_rel = relativize(&spec_symlink.path_abs, path_dir_src)?;
        let path_link_dst = path_dir_dst.join(path_rel);
        if prepare_entry_destination(&path_link_dst, &path_dir_dst, rule_conflict)? {
            create_symbolic_link(&spec_symlink.target, &path_link_dst).map_err(|e| {
                CopyTreeError::ReplicationFailed {
                    path: path_link_dst.clone(),
                    source: e,
                }
            })?;
            builder_report.add_copied();
        } else {
            builder_report.add_skipped();
        }
        ticker.tick();
    }

    let report = builder_report.build();
    tracing::info!(copied = report.cnt_copied, skipped = report.cnt_skipped, "Replication finished");
    Ok(report)
}

fn prepare_destination(
    path_dir_src: &Path,
    dir_destination: &Path,
    if_dry_run: bool,
) -> Result<PathBuf, CopyTreeError> {
    let path_dir_dst = absolutize_path(dir_destination);
    if is_overlap(path_dir_src, &path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            path_dir_src: path_dir_src.to_path_buf(),
            path_dir_dst,
        });
    }
    if if_dry_run {
        return Ok(path_dir_dst);
    }

    fs::create_dir_all(&path_dir_dst).map_err(|e| CopyTreeError::DestinationInitFailed {
        path: path_dir_dst.clone(),
        message: e.to_string(),
    })?;
    let meta_dir_dst =
        fs::symlink_metadata(&path_dir_dst).map_err(|e| CopyTreeError::DestinationInitFailed {
            path: path_dir_dst.clone(),
            message: e.to_string(),
        })?;
    if meta_dir_dst.file_type().is_symlink() {
        return Err(CopyTreeError::DestinationInitFailed {
            path: path_dir_dst,
            message: "Destination root path must not be a symbolic link.".to_string(),
        });
    }
    Ok(path_dir_dst)
}

/// Validate, create parents and resolve conflicts; `false` means skip.
fn prepare_entry_destination(
    path_dst: &Path,
    path_dir_dst_root: &Path,
    rule_conflict: EnumCopyFileConflictStrategy,
) -> Result<bool, CopyTreeError> {
    validate_destination_path_safety(path_dst, path_dir_dst_root)?;
    ensure_parent_dirs(path_dst)?;

    let Ok(meta_dst) = fs::symlink_metadata(path_dst) else {
        return Ok(true);
    };
    if meta_dst.is_dir() {
        return Err(CopyTreeError::DestinationExists(path_dst.to_path_buf()));
    }
    match rule_conflict {
        EnumCopyFileConflictStrategy::Skip => Ok(false),
        EnumCopyFileConflictStrategy::Error => {
            Err(CopyTreeError::DestinationExists(path_dst.to_path_buf()))
        }
        EnumCopyFileConflictStrategy::Overwrite => {
            remove_existing_entry(path_dst)?;
            Ok(true)
        }
    }
}

fn replicate_file(
    path_file_src: &Path,
    path_file_dst: &Path,
    path_dir_dst_root: &Path,
    rule_conflict: EnumCopyFileConflictStrategy,
    builder_report: &mut ReportCopyBuilder,
) -> Result<(), CopyTreeError> {
    if !prepare_entry_destination(path_file_dst, path_dir_dst_root, rule_conflict)? {
        builder_report.add_skipped();
        return Ok(());
    }
    copy_file_content(path_file_src, path_file_dst)?;
    builder_report.add_copied();
    Ok(())
}
