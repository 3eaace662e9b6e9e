//! `lbacopy_io_fs` v1:
//! Directory tree copy ordered by physical block address.
//!
//! Files are planned by where their data sits on disk and replicated in
//! ascending address order, which turns a directory-order copy into a mostly
//! sequential read on rotating media.
//!
//! - `path`    : naive relative-path computation
//! - `resolve` : block address lookup (FIEMAP, inode, or injected)
//! - `walk`    : traversal and entry classification
//! - `plan`    : address-ordered, hard-link-aware copy plan
//! - `copy`    : replication and `copy_tree` orchestration
//! - `spec`    : enums/options/observations/errors
//! - `report`  : run-time report model
//! - `util`    : shared helper functions

pub mod copy;
pub mod path;
pub mod plan;
pub mod report;
pub mod resolve;
pub mod spec;
mod util;
pub mod walk;

pub use copy::{ProgressSink, copy_tree, replicate};
pub use path::relativize;
pub use plan::{CopyPlan, EnumPlanInsert};
pub use report::{ReportCopy, ReportCopyBuilder};
pub use resolve::{
    BlockAddressResolver, FiemapResolver, InodeResolver, N_ADDRESS_UNMAPPED, default_resolver,
};
pub use spec::{
    CopyTreeError, EnumCopyFileConflictStrategy, EnumCopyHardlinkStrategy, EnumCopyPatternMode,
    EnumCopySymlinkStrategy, EnumCopyUnmappedStrategy, EnumFileClassification, RelativizeError,
    SpecCopyOptions, SpecHardlinkObservation, SpecSymlinkObservation,
};
pub use walk::{SpecTreeScan, classify_entry, scan_tree};
