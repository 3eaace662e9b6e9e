//! Run report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

/// Aggregate counters and diagnostics for one scan/replicate run.
#[derive(Debug, Default, Clone)]
pub struct ReportCopy {
    /// Total non-directory entries visited by the walk.
    pub cnt_scanned: u64,
    /// Regular files placed in the ordered plan.
    pub cnt_planned: u64,
    /// Regular files the resolver could not map.
    pub cnt_unmapped: u64,
    /// Regular files sharing an address with a planned file.
    pub cnt_hardlinks: u64,
    /// Symbolic links recorded.
    pub cnt_symlinks: u64,
    /// Special files and broken entries.
    pub cnt_ignored: u64,
    /// Files and links written to the destination.
    pub cnt_copied: u64,
    /// Entries not written because of a strategy, a conflict or dry-run.
    pub cnt_skipped: u64,
    /// Non-fatal warnings collected during traversal.
    pub warnings: Vec<String>,
}

impl ReportCopy {
    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_planned".to_string(), self.cnt_planned);
        dict_counts.insert("cnt_unmapped".to_string(), self.cnt_unmapped);
        dict_counts.insert("cnt_hardlinks".to_string(), self.cnt_hardlinks);
        dict_counts.insert("cnt_symlinks".to_string(), self.cnt_symlinks);
        dict_counts.insert("cnt_ignored".to_string(), self.cnt_ignored);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} scanned={} planned={} unmapped={} hardlinks={} symlinks={} ignored={} copied={} skipped={} warnings={}",
            self.cnt_scanned,
            self.cnt_planned,
            self.cnt_unmapped,
            self.cnt_hardlinks,
            self.cnt_symlinks,
            self.cnt_ignored,
            self.cnt_copied,
            self.cnt_skipped,
            self.warning_count()
        )
    }

    /// Classification summary printed once the walk completes.
    pub fn format_scan_summary(&self) -> String {
        format!(
            "{} symbolic links, {} hardlinks, {} regular files",
            self.cnt_symlinks, self.cnt_hardlinks, self.cnt_planned
        )
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[COPY]"))
    }
}

/// Mutable accumulator for run statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    /// See [`ReportCopy::cnt_scanned`].
    pub cnt_scanned: u64,
    /// See [`ReportCopy::cnt_planned`].
    pub cnt_planned: u64,
    /// See [`ReportCopy::cnt_unmapped`].
    pub cnt_unmapped: u64,
    /// See [`ReportCopy::cnt_hardlinks`].
    pub cnt_hardlinks: u64,
    /// See [`ReportCopy::cnt_symlinks`].
    pub cnt_symlinks: u64,
    /// See [`ReportCopy::cnt_ignored`].
    pub cnt_ignored: u64,
    /// See [`ReportCopy::cnt_copied`].
    pub cnt_copied: u64,
    /// See [`ReportCopy::cnt_skipped`].
    pub cnt_skipped: u64,
    /// See [`ReportCopy::warnings`].
    pub warnings: Vec<String>,
}

impl ReportCopyBuilder {
    /// Resume accumulation from a finished report.
    pub fn from_report(report: ReportCopy) -> Self {
        Self {
            cnt_scanned: report.cnt_scanned,
            cnt_planned: report.cnt_planned,
            cnt_unmapped: report.cnt_unmapped,
            cnt_hardlinks: report.cnt_hardlinks,
            cnt_symlinks: report.cnt_symlinks,
            cnt_ignored: report.cnt_ignored,
            cnt_copied: report.cnt_copied,
            cnt_skipped: report.cnt_skipped,
            warnings: report.warnings,
        }
    }

    /// Increment one or more named counters by `value`.
    ///
    /// Unknown names are ignored.
    pub fn add_counts(&mut self, field_names: &[&str], value: u64) {
        for field_name in field_names {
            match *field_name {
                "cnt_scanned" => self.cnt_scanned += value,
                "cnt_planned" => self.cnt_planned += value,
                "cnt_unmapped" => self.cnt_unmapped += value,
                "cnt_hardlinks" => self.cnt_hardlinks += value,
                "cnt_symlinks" => self.cnt_symlinks += value,
                "cnt_ignored" => self.cnt_ignored += value,
                "cnt_copied" => self.cnt_copied += value,
                "cnt_skipped" => self.cnt_skipped += value,
                _ => {}
            }
        }
    }

    pub fn add_scanned(&mut self) {
        self.cnt_scanned += 1;
    }

    pub fn add_planned(&mut self) {
        self.cnt_planned += 1;
    }

    pub fn add_unmapped(&mut self) {
        self.cnt_unmapped += 1;
    }

    pub fn add_hardlink(&mut self) {
        self.cnt_hardlinks += 1;
    }

    pub fn add_symlink(&mut self) {
        self.cnt_symlinks += 1;
    }

    pub fn add_ignored(&mut self) {
        self.cnt_ignored += 1;
    }

    pub fn add_copied(&mut self) {
        self.cnt_copied += 1;
    }

    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    /// Add warning message and emit it on the diagnostic channel.
    pub fn add_warning(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportCopy {
        ReportCopy {
            cnt_scanned: self.cnt_scanned,
            cnt_planned: self.cnt_planned,
            cnt_unmapped: self.cnt_unmapped,
            cnt_hardlinks: self.cnt_hardlinks,
            cnt_symlinks: self.cnt_symlinks,
            cnt_ignored: self.cnt_ignored,
            cnt_copied: self.cnt_copied,
            cnt_skipped: self.cnt_skipped,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportCopy, ReportCopyBuilder};

    #[test]
    fn report_copy_to_dict_and_format() {
        let report = ReportCopy {
            cnt_scanned: 9,
            cnt_planned: 5,
            cnt_unmapped: 1,
            cnt_hardlinks: 1,
            cnt_symlinks: 2,
            cnt_ignored: 0,
            cnt_copied: 8,
            cnt_skipped: 1,
            warnings: vec!["w".to_string()],
        };

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_planned"], 5);
        assert_eq!(dict_counts["cnt_symlinks"], 2);
        assert_eq!(dict_counts["cnt_warnings"], 1);

        let txt = report.format("[COPY]");
        assert_eq!(
            txt,
            "[COPY] scanned=9 planned=5 unmapped=1 hardlinks=1 symlinks=2 ignored=0 copied=8 skipped=1 warnings=1"
        );
        assert_eq!(report.to_string(), txt);
        assert_eq!(
            report.format_scan_summary(),
            "2 symbolic links, 1 hardlinks, 5 regular files"
        );
    }

    #[test]
    fn builder_resumes_from_report() {
        let mut builder = ReportCopyBuilder::default();
        builder.add_scanned();
        builder.add_planned();
        builder.add_warning("Failed to inspect x".to_string());

        let mut builder = ReportCopyBuilder::from_report(builder.build());
        builder.add_copied();
        let report = builder.build();

        assert_eq!(report.cnt_scanned, 1);
        assert_eq!(report.cnt_planned, 1);
        assert_eq!(report.cnt_copied, 1);
        assert_eq!(report.warning_count(), 1);
    }
}
