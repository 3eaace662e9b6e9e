//! Naive relative-path computation between two absolute paths.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::spec::RelativizeError;

const C_PARENT_DIR: &str = "..";
const C_CURRENT_DIR: &str = "./";

/// Compute the path that leads from `base` to `target`.
///
/// Both inputs are expected to be absolute and already normalized by the
/// caller. `..` segments are compared literally, never collapsed, so
/// `relativize("/a/../b", "/a")` yields `../b` rather than `../../b`.
///
/// # Errors
/// - [`RelativizeError::EmptyInput`] when either path has no components.
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use lbacopy_io_fs::relativize;
///
/// let path_rel = relativize(Path::new("/a/b/c"), Path::new("/a/b/d")).unwrap();
/// assert_eq!(path_rel, PathBuf::from("../c"));
/// ```
pub fn relativize(target: &Path, base: &Path) -> Result<PathBuf, RelativizeError> {
    if target == base {
        return Ok(PathBuf::from(C_CURRENT_DIR));
    }

    let l_segs_target = _to_segments(target);
    let l_segs_base = _to_segments(base);
    if l_segs_target.is_empty() || l_segs_base.is_empty() {
        return Err(RelativizeError::EmptyInput);
    }

    let n_shared = l_segs_target
        .iter()
        .zip(l_segs_base.iter())
        .take_while(|(seg_target, seg_base)| seg_target == seg_base)
        .count();

    let mut path_rel = PathBuf::new();
    for seg in &l_segs_base[n_shared..] {
        if _is_skippable(seg) {
            continue;
        }
        path_rel.push(C_PARENT_DIR);
    }
    for seg in &l_segs_target[n_shared..] {
        if _is_skippable(seg) {
            continue;
        }
        path_rel.push(seg);
    }
    Ok(path_rel)
}

fn _to_segments(path: &Path) -> Vec<&OsStr> {
    path.components().map(Component::as_os_str).collect()
}

// Root separators and "." never count as a level.
fn _is_skippable(seg: &OsStr) -> bool {
    seg == "." || seg == "/" || seg.is_empty()
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use proptest::prelude::*;

    use super::relativize;
    use crate::spec::RelativizeError;

    fn rel(target: &str, base: &str) -> PathBuf {
        relativize(Path::new(target), Path::new(base)).expect("relativize")
    }

    #[test]
    fn relativize_sibling_file() {
        assert_eq!(rel("/a/b/c", "/a/b/d"), PathBuf::from("../c"));
    }

    #[test]
    fn relativize_climbs_every_remaining_base_level() {
        assert_eq!(rel("/a/x", "/a/y/z"), PathBuf::from("../../x"));
    }

    #[test]
    fn relativize_entry_below_base() {
        assert_eq!(rel("/src/tree/sub/f.bin", "/src/tree"), PathBuf::from("sub/f.bin"));
    }

    #[test]
    fn relativize_ancestor_of_base() {
        assert_eq!(rel("/a", "/a/b"), PathBuf::from(".."));
    }

    #[test]
    fn relativize_equal_paths_yield_current_dir() {
        let path_rel = rel("/data/photos", "/data/photos");
        assert_eq!(path_rel.to_str(), Some("./"));
    }

    #[test]
    fn relativize_skips_current_dir_segments() {
        assert_eq!(rel("/a/./b/c", "/a/x"), PathBuf::from("../b/c"));
    }

    #[test]
    fn relativize_does_not_collapse_parent_segments() {
        assert_eq!(rel("/a/../b", "/a"), PathBuf::from("../b"));
    }

    #[test]
    fn relativize_rejects_empty_inputs() {
        assert_eq!(
            relativize(Path::new(""), Path::new("/a")),
            Err(RelativizeError::EmptyInput)
        );
        assert_eq!(
            relativize(Path::new("/a"), Path::new("")),
            Err(RelativizeError::EmptyInput)
        );
    }

    fn arb_abs_path() -> impl Strategy<Value = PathBuf> {
        prop::collection::vec("[a-z]{1,6}", 1..6).prop_map(|l_segs| {
            let mut path = PathBuf::from("/");
            for seg in l_segs {
                path.push(seg);
            }
            path
        })
    }

    proptest! {
        #[test]
        fn relativize_identity_is_current_dir(path in arb_abs_path()) {
            prop_assert_eq!(relativize(&path, &path).unwrap(), PathBuf::from("./"));
        }

        #[test]
        fn relativize_walk_from_base_reaches_target(
            target in arb_abs_path(),
            base in arb_abs_path(),
        ) {
            prop_assume!(target != base);
            let path_rel = relativize(&target, &base).unwrap();

            let mut path_cursor = base.clone();
            for seg in path_rel.iter() {
                if seg == ".." {
                    path_cursor.pop();
                } else {
                    path_cursor.push(seg);
                }
            }
            prop_assert_eq!(path_cursor, target);
        }
    }
}
