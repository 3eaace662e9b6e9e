//! Address-ordered copy plan.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use crate::resolve::N_ADDRESS_UNMAPPED;
use crate::spec::SpecHardlinkObservation;

/// Outcome of one [`CopyPlan::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumPlanInsert {
    /// New address; the path is now planned.
    Planned,
    /// Address already planned; recorded as a hard-link observation.
    Hardlink,
}

/// Mapping from block address to source-relative path.
///
/// Each address holds at most one path and iteration is always in ascending
/// address order. Entries arriving at a known address are kept aside as
/// [`SpecHardlinkObservation`]s instead of being planned twice.
#[derive(Debug, Default, Clone)]
pub struct CopyPlan {
    map_files: BTreeMap<u64, PathBuf>,
    l_hardlinks: Vec<SpecHardlinkObservation>,
}

impl CopyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan `path_rel` at `address`, or record a hard link if the address is taken.
    ///
    /// `address` must not be the unmapped sentinel.
    pub fn insert(&mut self, address: u64, path_rel: PathBuf, path_abs: &Path) -> EnumPlanInsert {
        debug_assert_ne!(address, N_ADDRESS_UNMAPPED);
        match self.map_files.entry(address) {
            Entry::Vacant(slot) => {
                slot.insert(path_rel);
                EnumPlanInsert::Planned
            }
            Entry::Occupied(slot) => {
                tracing::debug!(
                    address,
                    existing = %slot.get().display(),
                    duplicate = %path_abs.display(),
                    "Duplicate block address"
                );
                self.l_hardlinks.push(SpecHardlinkObservation {
                    path_rel_existing: slot.get().clone(),
                    path_abs_duplicate: path_abs.to_path_buf(),
                });
                EnumPlanInsert::Hardlink
            }
        }
    }

    /// Number of planned files.
    pub fn len(&self) -> usize {
        self.map_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_files.is_empty()
    }

    /// Planned path at `address`.
    pub fn get(&self, address: u64) -> Option<&Path> {
        self.map_files.get(&address).map(PathBuf::as_path)
    }

    /// Planned `(address, path_rel)` pairs, ascending by address.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Path)> + '_ {
        self.map_files
            .iter()
            .map(|(address, path_rel)| (*address, path_rel.as_path()))
    }

    /// Hard-link observations in the order they were seen.
    pub fn hardlinks(&self) -> &[SpecHardlinkObservation] {
        &self.l_hardlinks
    }
}
