//! Scratch directory management for in-flight jobs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::MediaResult;

/// Per-job scratch directory, removed on drop.
pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    /// Create a scratch directory under the given root (or the system
    /// temp dir when `root` is `None`).
    pub fn create(root: Option<&Path>, prefix: &str) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_lifecycle() {
        let path = {
            let workdir = Workdir::create(None, "spotgen-test-").unwrap();
            assert!(workdir.path().exists());
            std::fs::write(workdir.file("scene.mp4"), b"x").unwrap();
            assert!(workdir.file("scene.mp4").exists());
            workdir.path().to_path_buf()
        };
        // removed on drop
        assert!(!path.exists());
    }
}
