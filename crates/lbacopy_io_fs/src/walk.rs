//! Source tree traversal and entry classification.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::path::relativize;
use crate::plan::{CopyPlan, EnumPlanInsert};
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::resolve::{BlockAddressResolver, N_ADDRESS_UNMAPPED};
use crate::spec::{
    CopyTreeError, EnumFileClassification, SpecCopyOptions, SpecHardlinkObservation,
    SpecSymlinkObservation,
};
use crate::util::{SpecNameFilters, absolutize_path, calculate_worker_limit};

const N_CLASSIFY_BATCH: usize = 4096;
const N_PROGRESS_EVERY: u64 = 1000;

#[derive(Debug, Clone)]
struct SpecClassifyTask {
    path_entry: PathBuf,
    path_rel: PathBuf,
}

/// Everything the walk learned about a source tree.
#[derive(Debug, Clone)]
pub struct SpecTreeScan {
    /// Absolute source root every relative path is anchored to.
    pub path_dir_src: PathBuf,
    /// Address-ordered plan, including its hard-link observations.
    pub plan: CopyPlan,
    /// Symbolic links, in walk order.
    pub symlinks: Vec<SpecSymlinkObservation>,
    /// Absolute paths of regular files without a block address, in walk order.
    pub unmapped: Vec<PathBuf>,
    /// Scan counters and per-entry warnings.
    pub report: ReportCopy,
}

impl SpecTreeScan {
    pub fn hardlinks(&self) -> &[SpecHardlinkObservation] {
        self.plan.hardlinks()
    }
}

struct SpecScanContext<'a, R: ?Sized> {
    path_dir_src: PathBuf,
    resolver: &'a R,
    spec_filters: SpecNameFilters,
    thread_pool: Option<ThreadPool>,
    builder_report: ReportCopyBuilder,
    plan: CopyPlan,
    l_symlinks: Vec<SpecSymlinkObservation>,
    l_unmapped: Vec<PathBuf>,
    l_tasks_classify: Vec<SpecClassifyTask>,
}

/// Walk `dir_source` once and build the copy plan.
///
/// Symbolic links are recorded, never descended into. Per-entry failures
/// (permissions, entries vanishing mid-walk) become warnings in the report and
/// the walk moves on.
///
/// # Errors
/// - [`CopyTreeError::SourceNotDirectory`] if the root is not a directory.
/// - [`CopyTreeError::InvalidPattern`] for include/exclude patterns that do not compile.
/// - [`CopyTreeError::Relativize`] if an entry path cannot be made relative.
pub fn scan_tree<P, R>(
    dir_source: P,
    resolver: &R,
    spec_cp_options: &SpecCopyOptions,
) -> Result<SpecTreeScan, CopyTreeError>
where
    P: AsRef<Path>,
    R: BlockAddressResolver + ?Sized,
{
    let path_dir_src = absolutize_path(dir_source.as_ref());
    if !path_dir_src.is_dir() {
        return Err(CopyTreeError::SourceNotDirectory(path_dir_src));
    }
    let spec_filters = SpecNameFilters::from_options(spec_cp_options)?;

    let mut builder_report = ReportCopyBuilder::default();
    let n_workers_max = calculate_worker_limit(spec_cp_options.num_workers_max);
    let thread_pool = if n_workers_max <= 1 {
        None
    } else {
        match ThreadPoolBuilder::new().num_threads(n_workers_max).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                builder_report.add_warning(format!(
                    "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial classification ({e})"
                ));
                None
            }
        }
    };

    let mut spec_scan_ctx = SpecScanContext {
        path_dir_src: path_dir_src.clone(),
        resolver,
        spec_filters,
        thread_pool,
        builder_report,
        plan: CopyPlan::new(),
        l_symlinks: Vec::new(),
        l_unmapped: Vec::new(),
        l_tasks_classify: Vec::new(),
    };

    tracing::info!(source = %path_dir_src.display(), workers = n_workers_max, "Enumerating files");
    walk_directory(&path_dir_src, &mut spec_scan_ctx)?;
    flush_classify_tasks(&mut spec_scan_ctx);

    let report = spec_scan_ctx.builder_report.build();
    tracing::info!(
        scanned = report.cnt_scanned,
        planned = report.cnt_planned,
        unmapped = report.cnt_unmapped,
        hardlinks = report.cnt_hardlinks,
        symlinks = report.cnt_symlinks,
        "Enumeration finished"
    );

    Ok(SpecTreeScan {
        path_dir_src,
        plan: spec_scan_ctx.plan,
        symlinks: spec_scan_ctx.l_symlinks,
        unmapped: spec_scan_ctx.l_unmapped,
        report,
    })
}

/// Classify one non-directory entry.
///
/// Two stat calls are needed: the followed status gives the provisional type,
/// the unfollowed one tells whether the entry itself is a link. Regular files
/// are handed to `resolver`; `path_rel` is carried into
/// [`EnumFileClassification::RegularMapped`] unchanged.
///
/// A link whose target is missing is [`EnumFileClassification::Ignored`].
pub fn classify_entry<R>(
    path_entry: &Path,
    path_rel: &Path,
    resolver: &R,
) -> io::Result<EnumFileClassification>
where
    R: BlockAddressResolver + ?Sized,
{
    let stat_link = fs::symlink_metadata(path_entry)?;
    let b_is_symlink = stat_link.file_type().is_symlink();
    let stat_followed = match fs::metadata(path_entry) {
        Ok(v) => v,
        Err(e) if b_is_symlink && e.kind() == io::ErrorKind::NotFound => {
            return Ok(EnumFileClassification::Ignored);
        }
        Err(e) => return Err(e),
    };
    let file_type = stat_followed.file_type();

    if file_type.is_file() && !b_is_symlink {
        let address = resolver.resolve(path_entry);
        if address == N_ADDRESS_UNMAPPED {
            return Ok(EnumFileClassification::RegularUnmapped(
                path_entry.to_path_buf(),
            ));
        }
        return Ok(EnumFileClassification::RegularMapped {
            address,
            path_rel: path_rel.to_path_buf(),
        });
    }

    if b_is_symlink && (file_type.is_file() || file_type.is_dir()) {
        let target = fs::read_link(path_entry)?;
        return Ok(EnumFileClassification::Symlink {
            path: path_entry.to_path_buf(),
            target,
        });
    }

    Ok(EnumFileClassification::Ignored)
}

fn walk_directory<R>(
    path_root: &Path,
    spec_scan_ctx: &mut SpecScanContext<'_, R>,
) -> Result<(), CopyTreeError>
where
    R: BlockAddressResolver + ?Sized,
{
    let iter_entries = match fs::read_dir(path_root) {
        Ok(iter) => iter,
        Err(e) => {
            spec_scan_ctx.builder_report.add_warning(format!(
                "Failed to read directory {} ({e})",
                path_root.display()
            ));
            return Ok(());
        }
    };

    let mut l_dirs: Vec<(String, PathBuf)> = Vec::new();
    let mut l_files: Vec<(String, PathBuf)> = Vec::new();
    for _entry_res in iter_entries {
        let entry = match _entry_res {
            Ok(v) => v,
            Err(e) => {
                spec_scan_ctx.builder_report.add_warning(format!(
                    "Failed to read directory entry under {} ({e})",
                    path_root.display()
                ));
                continue;
            }
        };

        let path_entry = entry.path();
        let c_name = entry.file_name().to_string_lossy().to_string();
        // Unfollowed: a symlink to a directory lands in `l_files`.
        let cfg_file_type = match entry.file_type() {
            Ok(v) => v,
            Err(e) => {
                spec_scan_ctx
                    .builder_report
                    .add_warning(format!("Failed to inspect {} ({e})", path_entry.display()));
                continue;
            }
        };

        if cfg_file_type.is_dir() {
            if !spec_scan_ctx.spec_filters.is_dir_excluded(&c_name) {
                l_dirs.push((c_name, path_entry));
            }
        } else if !spec_scan_ctx.spec_filters.is_file_excluded(&c_name) {
            l_files.push((c_name, path_entry));
        }
    }

    l_dirs.sort_by(|a, b| a.0.cmp(&b.0));
    l_files.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, path_dir_sub) in l_dirs {
        walk_directory(&path_dir_sub, spec_scan_ctx)?;
    }

    for (_, path_entry) in l_files {
        let path_rel = relativize(&path_entry, &spec_scan_ctx.path_dir_src)?;
        spec_scan_ctx.builder_report.add_scanned();
        let cnt_scanned = spec_scan_ctx.builder_report.cnt_scanned;
        if cnt_scanned % N_PROGRESS_EVERY == 0 {
            tracing::info!(scanned = cnt_scanned, "Enumerating files");
        }

        spec_scan_ctx
            .l_tasks_classify
            .push(SpecClassifyTask { path_entry, path_rel });
        if spec_scan_ctx.l_tasks_classify.len() >= N_CLASSIFY_BATCH {
            flush_classify_tasks(spec_scan_ctx);
        }
    }

    Ok(())
}

// Classification may run on the pool; recording always happens here, in walk
// order, so hard-link pairing does not depend on thread scheduling.
fn flush_classify_tasks<R>(spec_scan_ctx: &mut SpecScanContext<'_, R>)
where
    R: BlockAddressResolver + ?Sized,
{
    let l_tasks_classify = std::mem::take(&mut spec_scan_ctx.l_tasks_classify);
    if l_tasks_classify.is_empty() {
        return;
    }

    let resolver = spec_scan_ctx.resolver;
    let classify = |spec_task: SpecClassifyTask| {
        let res_class = classify_entry(&spec_task.path_entry, &spec_task.path_rel, resolver);
        (spec_task.path_entry, res_class)
    };

    let l_results: Vec<_> = match &spec_scan_ctx.thread_pool {
        Some(thread_pool) => {
            thread_pool.install(|| l_tasks_classify.into_par_iter().map(classify).collect())
        }
        None => l_tasks_classify.into_iter().map(classify).collect(),
    };

    for (path_entry, res_class) in l_results {
        record_classification(path_entry, res_class, spec_scan_ctx);
    }
}

fn record_classification<R>(
    path_entry: PathBuf,
    res_class: io::Result<EnumFileClassification>,
    spec_scan_ctx: &mut SpecScanContext<'_, R>,
) where
    R: BlockAddressResolver + ?Sized,
{
    let builder_report = &mut spec_scan_ctx.builder_report;
    match res_class {
        Ok(EnumFileClassification::RegularMapped { address, path_rel }) => {
            match spec_scan_ctx.plan.insert(address, path_rel, &path_entry) {
                EnumPlanInsert::Planned => builder_report.add_planned(),
                EnumPlanInsert::Hardlink => builder_report.add_hardlink(),
            }
        }
        Ok(EnumFileClassification::RegularUnmapped(path_file)) => {
            spec_scan_ctx.l_unmapped.push(path_file);
            builder_report.add_unmapped();
        }
        Ok(EnumFileClassification::Symlink { path, target }) => {
            spec_scan_ctx.l_symlinks.push(SpecSymlinkObservation {
                path_abs: path,
                target,
            });
            builder_report.add_symlink();
        }
        Ok(EnumFileClassification::Ignored) => {
            tracing::debug!(path = %path_entry.display(), "Entry ignored");
            builder_report.add_ignored();
        }
        Err(e) => {
            builder_report.add_warning(format!(
                "Warning error accessing {} ({e})",
                path_entry.display()
            ));
        }
    }
}
