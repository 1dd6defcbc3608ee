//! Destination files that disappear unless fully written

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Destination file that is deleted on drop unless committed
pub(crate) struct PendingFile {
    path: PathBuf,
    pub(crate) file: File,
    committed: bool,
}

impl PendingFile {
    pub(crate) fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            committed: false,
        })
    }

    pub(crate) fn with_permissions(path: &Path, permissions: Permissions) -> io::Result<Self> {
        let pending = Self::create(path)?;
        pending.file.set_permissions(permissions)?;
        Ok(pending)
    }

    pub(crate) fn commit(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.committed {
            // best effort; the original error is what gets reported
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Write `contents` to `path`; nothing is left behind if the write fails.
pub(crate) fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut pending = PendingFile::create(path)?;
    pending.file.write_all(contents)?;
    pending.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_uncommitted_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SHA256SUMS");
        {
            let mut pending = PendingFile::create(&path).unwrap();
            pending.file.write_all(b"partial").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_committed_file_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SHA256SUMS.sig");
        write_file(&path, b"signature\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"signature\n");
    }

    #[test]
    fn test_failed_create_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing/SHA256SUMS");
        assert!(write_file(&path, b"x").is_err());
        assert!(!dir.path().join("missing").exists());
    }
}
