//! Filesystem access to the overlay storage root.
//!
//! The storage root holds one directory per layer:
//! ```text
//! /var/lib/docker/overlay2/
//! ├── <layer-id>/          # One directory per layer
//! │   ├── diff/            # Layer file contents
//! │   ├── link             # Short link ID
//! │   ├── lower            # Parent layer references
//! │   ├── merged/          # Mountpoint (containers only)
//! │   └── work/            # Overlay work directory
//! ├── <layer-id>-init/     # Container init layer
//! └── l/                   # Short link directory (symlinks)
//! ```
//!
//! [`OverlayRoot`] performs all operations relative to a cap-std [`Dir`]
//! handle on the root, so identifiers can never name anything outside it.
//! The [`LayerFs`] trait is the seam the reclaimer works against.

use std::io;
use std::path::Path;

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::error::{ReclaimError, Result};

/// Operations the reclaimer needs on the layer directories.
pub trait LayerFs {
    /// Identifiers of the immediate subdirectories of the storage root,
    /// sorted.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Total apparent size in bytes of the layer directory tree.
    fn measure(&self, id: &str) -> io::Result<u64>;

    /// Recursively delete the layer directory.
    fn remove(&self, id: &str) -> io::Result<()>;
}

/// The overlay storage root, opened as a directory handle.
#[derive(Debug)]
pub struct OverlayRoot {
    dir: Dir,
}

impl OverlayRoot {
    /// Open the storage root at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReclaimError::RootNotFound`] if the path does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dir = Dir::open_ambient_dir(path, ambient_authority()).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ReclaimError::RootNotFound(path.to_path_buf())
            } else {
                ReclaimError::Io(e)
            }
        })?;
        Ok(Self { dir })
    }

    /// Wrap an already opened directory handle.
    pub fn from_dir(dir: Dir) -> Self {
        Self { dir }
    }

    /// Get a reference to the underlying directory handle.
    pub fn as_dir(&self) -> &Dir {
        &self.dir
    }
}

impl LayerFs for OverlayRoot {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in self.dir.entries()? {
            let entry = entry?;
            // file_type() does not follow symlinks
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => ids.push(name),
                Err(name) => {
                    tracing::warn!(name = ?name, "ignoring non-UTF-8 directory name");
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn measure(&self, id: &str) -> io::Result<u64> {
        check_identifier(id)?;
        let layer = self.dir.open_dir(id)?;
        dir_size(&layer)
    }

    fn remove(&self, id: &str) -> io::Result<()> {
        check_identifier(id)?;
        self.dir.remove_dir_all(id)
    }
}

/// Reject identifiers that are not a single normal path component.
fn check_identifier(id: &str) -> io::Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid layer identifier {:?}", id),
        ));
    }
    Ok(())
}

/// Sum the apparent sizes of everything below `dir`.
///
/// Symlinks are counted as links, not followed. The first error aborts the
/// walk, so a permission problem anywhere in the tree is reported to the
/// caller rather than hidden in an undercount.
pub fn dir_size(dir: &Dir) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in dir.entries()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let sub = entry.open_dir()?;
            total = total.saturating_add(dir_size(&sub)?);
        } else {
            total = total.saturating_add(entry.metadata()?.len());
        }
    }
    Ok(total)
}

/// Size of the directory tree at `path`, opened with ambient authority.
pub fn path_size<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    let dir = Dir::open_ambient_dir(path.as_ref(), ambient_authority())?;
    dir_size(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn populated_root() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("aaa/diff/etc")).unwrap();
        std::fs::write(root.join("aaa/diff/etc/hosts"), vec![0u8; 100]).unwrap();
        std::fs::write(root.join("aaa/link"), "ABCDEFGHIJKLMNOPQRSTUVWXYZ").unwrap();
        std::fs::create_dir_all(root.join("bbb/diff")).unwrap();
        std::fs::create_dir_all(root.join("l")).unwrap();
        std::fs::write(root.join("stray-file"), "x").unwrap();
        tmp
    }

    #[test]
    fn test_open_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = OverlayRoot::open(tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, ReclaimError::RootNotFound(_)));
    }

    #[test]
    fn test_list_only_directories_sorted() {
        let tmp = populated_root();
        symlink(tmp.path().join("aaa"), tmp.path().join("zzz-link")).unwrap();
        let root = OverlayRoot::open(tmp.path()).unwrap();
        assert_eq!(root.list().unwrap(), vec!["aaa", "bbb", "l"]);
    }

    #[test]
    fn test_measure_counts_file_bytes() {
        let tmp = populated_root();
        let root = OverlayRoot::open(tmp.path()).unwrap();
        assert_eq!(root.measure("aaa").unwrap(), 126);
        assert_eq!(root.measure("bbb").unwrap(), 0);
    }

    #[test]
    fn test_measure_does_not_follow_symlinks() {
        let tmp = populated_root();
        std::fs::write(tmp.path().join("big"), vec![0u8; 4096]).unwrap();
        symlink(tmp.path().join("big"), tmp.path().join("bbb/diff/big")).unwrap();
        let root = OverlayRoot::open(tmp.path()).unwrap();
        let size = root.measure("bbb").unwrap();
        assert!(size < 4096, "symlink target was counted: {}", size);
    }

    #[test]
    fn test_remove_layer() {
        let tmp = populated_root();
        let root = OverlayRoot::open(tmp.path()).unwrap();
        root.remove("aaa").unwrap();
        assert!(!tmp.path().join("aaa").exists());
        assert!(tmp.path().join("bbb").exists());
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        let tmp = populated_root();
        let root = OverlayRoot::open(tmp.path()).unwrap();
        for id in ["", ".", "..", "aaa/diff", "../escape"] {
            let err = root.remove(id).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "id {:?}", id);
        }
        assert!(tmp.path().join("aaa/diff").exists());
    }

    #[test]
    fn test_path_size() {
        let tmp = populated_root();
        assert_eq!(path_size(tmp.path().join("aaa/diff")).unwrap(), 100);
    }
}
