//! Per-invocation scratch directories.

use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A private directory under the scratch root, removed with everything in it
/// when dropped.
///
/// Every invocation gets its own directory, so files named after a source
/// basename never collide with another invocation handling the same basename.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn create(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("derive-").tempdir_in(root)?;
        let scratch = Self { dir };
        debug!("created scratch directory {}", scratch.path().display());
        Ok(scratch)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a scratch file named `name`. Only the final path component of
    /// `name` is used.
    pub fn file(&self, name: &str) -> PathBuf {
        let name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "scratch".into());
        self.path().join(name)
    }

    /// Remove the directory now, logging instead of failing if removal errors.
    pub fn close(self) {
        let path = self.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!("failed to remove scratch directory {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_directory_and_contents() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchSpace::create(root.path()).unwrap();
            std::fs::write(scratch.file("a.jpg"), b"x").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn invocations_get_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchSpace::create(root.path()).unwrap();
        let b = ScratchSpace::create(root.path()).unwrap();
        assert_ne!(a.file("cat.jpg"), b.file("cat.jpg"));
        a.close();
        b.close();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_names_cannot_escape_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::create(root.path()).unwrap();
        let path = scratch.file("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), scratch.path());
    }
}
