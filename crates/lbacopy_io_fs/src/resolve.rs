//! Physical block address lookup.
//!
//! The walk only needs an ordering key per regular file. A resolver returns the
//! key for a path, or `0` when the file has no usable mapping (empty file,
//! inline data, unsupported filesystem, any lookup failure).
//!
//! - `FiemapResolver` : first extent's LBA via `FS_IOC_FIEMAP` (Linux)
//! - `InodeResolver`  : inode number as a locality approximation (Unix)

use std::fs;
use std::path::Path;

/// Sentinel for "no physical mapping".
pub const N_ADDRESS_UNMAPPED: u64 = 0;

/// Lookup of a file's physical location, used purely as a sort key.
///
/// Implementations must be `Sync`: the walk may resolve several files in
/// parallel.
pub trait BlockAddressResolver: Sync {
    /// Return the block address of `path`, or [`N_ADDRESS_UNMAPPED`].
    fn resolve(&self, path: &Path) -> u64;
}

impl<F> BlockAddressResolver for F
where
    F: Fn(&Path) -> u64 + Sync,
{
    fn resolve(&self, path: &Path) -> u64 {
        self(path)
    }
}

/// Resolver backed by the Linux FIEMAP ioctl.
///
/// Returns the physical offset of the file's first extent in 512-byte sectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FiemapResolver;

impl BlockAddressResolver for FiemapResolver {
    fn resolve(&self, path: &Path) -> u64 {
        #[cfg(target_os = "linux")]
        {
            match fiemap_first_extent_linux(path) {
                Ok(address) => address,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "FIEMAP lookup failed");
                    N_ADDRESS_UNMAPPED
                }
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = path;
            N_ADDRESS_UNMAPPED
        }
    }
}

#[cfg(target_os = "linux")]
fn fiemap_first_extent_linux(path: &Path) -> std::io::Result<u64> {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    // _IOWR('f', 11, struct fiemap)
    const FS_IOC_FIEMAP: libc::c_ulong = 0xC020_660B;
    const FIEMAP_FLAG_SYNC: u32 = 0x0000_0001;
    const FIEMAP_EXTENT_UNKNOWN: u32 = 0x0000_0002;
    const FIEMAP_EXTENT_DATA_INLINE: u32 = 0x0000_0200;
    const N_SECTOR_SIZE: u64 = 512;

    #[repr(C)]
    #[derive(Default)]
    #[allow(dead_code)]
    struct FiemapExtent {
        fe_logical: u64,
        fe_physical: u64,
        fe_length: u64,
        fe_reserved64: [u64; 2],
        fe_flags: u32,
        fe_reserved: [u32; 3],
    }

    // `struct fiemap` with room for exactly one extent.
    #[repr(C)]
    #[derive(Default)]
    #[allow(dead_code)]
    struct FiemapOneExtent {
        fm_start: u64,
        fm_length: u64,
        fm_flags: u32,
        fm_mapped_extents: u32,
        fm_extent_count: u32,
        fm_reserved: u32,
        fm_extent: FiemapExtent,
    }

    let file = File::open(path)?;
    let mut fiemap = FiemapOneExtent {
        fm_length: u64::MAX,
        fm_flags: FIEMAP_FLAG_SYNC,
        fm_extent_count: 1,
        ..FiemapOneExtent::default()
    };

    let ret = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            FS_IOC_FIEMAP as _,
            &mut fiemap as *mut FiemapOneExtent,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    if fiemap.fm_mapped_extents == 0 {
        return Ok(N_ADDRESS_UNMAPPED);
    }
    if fiemap.fm_extent.fe_flags & (FIEMAP_EXTENT_UNKNOWN | FIEMAP_EXTENT_DATA_INLINE) != 0 {
        return Ok(N_ADDRESS_UNMAPPED);
    }
    Ok(fiemap.fm_extent.fe_physical / N_SECTOR_SIZE)
}

/// Resolver using the inode number as the ordering key.
///
/// Inode order roughly follows allocation order on ext-style filesystems.
/// Hard links share an inode, so they collapse the same way FIEMAP addresses do.
#[derive(Debug, Clone, Copy, Default)]
pub struct InodeResolver;

impl BlockAddressResolver for InodeResolver {
    fn resolve(&self, path: &Path) -> u64 {
        let Ok(stat_file) = fs::symlink_metadata(path) else {
            return N_ADDRESS_UNMAPPED;
        };
        if stat_file.len() == 0 {
            return N_ADDRESS_UNMAPPED;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            stat_file.ino()
        }
        #[cfg(not(unix))]
        {
            N_ADDRESS_UNMAPPED
        }
    }
}

/// Platform default: FIEMAP on Linux, inode numbers elsewhere.
pub fn default_resolver() -> Box<dyn BlockAddressResolver> {
    #[cfg(target_os = "linux")]
    {
        Box::new(FiemapResolver)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(InodeResolver)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use super::{BlockAddressResolver, InodeResolver, N_ADDRESS_UNMAPPED};

    #[test]
    fn closure_acts_as_resolver() {
        let map_addresses: HashMap<PathBuf, u64> =
            HashMap::from([(PathBuf::from("/t/a"), 7), (PathBuf::from("/t/b"), 3)]);
        let resolver = |path: &Path| map_addresses.get(path).copied().unwrap_or(0);

        assert_eq!(resolver.resolve(Path::new("/t/a")), 7);
        assert_eq!(resolver.resolve(Path::new("/t/missing")), N_ADDRESS_UNMAPPED);
    }

    #[cfg(unix)]
    #[test]
    fn inode_resolver_maps_empty_files_to_sentinel() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_empty = tmp.path().join("empty.bin");
        let path_full = tmp.path().join("full.bin");
        std::fs::write(&path_empty, b"").expect("write empty");
        std::fs::write(&path_full, b"payload").expect("write full");

        assert_eq!(InodeResolver.resolve(&path_empty), N_ADDRESS_UNMAPPED);
        assert_ne!(InodeResolver.resolve(&path_full), N_ADDRESS_UNMAPPED);
    }

    #[cfg(unix)]
    #[test]
    fn inode_resolver_collapses_hard_links() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_base = tmp.path().join("base.txt");
        let path_alias = tmp.path().join("alias.txt");
        std::fs::write(&path_base, b"base").expect("write base");
        std::fs::hard_link(&path_base, &path_alias).expect("hard link");

        assert_eq!(
            InodeResolver.resolve(&path_base),
            InodeResolver.resolve(&path_alias)
        );
    }

    #[test]
    fn inode_resolver_missing_file_is_unmapped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            InodeResolver.resolve(&tmp.path().join("nope")),
            N_ADDRESS_UNMAPPED
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn fiemap_resolver_empty_file_is_unmapped() {
        use super::FiemapResolver;

        let tmp = tempfile::tempdir().expect("tempdir");
        let path_empty = tmp.path().join("empty.bin");
        std::fs::write(&path_empty, b"").expect("write empty");

        assert_eq!(FiemapResolver.resolve(&path_empty), N_ADDRESS_UNMAPPED);
    }
}
