//! Top-level walk from the source tree to the destination tree
//!
//! Every regular file is handed to the transformer with a depth-1 path.
//! Untouched files are copied with their modification time; directories are
//! recreated with their permissions. A file that is not completely written
//! is removed before the error propagates.

use std::fs::{self, File, Permissions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::deep_path::DeepPath;
use crate::pending::PendingFile;
use crate::transform::{sibling_entry_name, TransformError, Transformer};

/// Errors walking or writing the trees
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("expected regular file: {}", .0.display())]
    NotRegularFile(PathBuf),

    #[error("{path}: {source}")]
    Transform {
        path: DeepPath,
        #[source]
        source: TransformError,
    },
}

/// `path` relative to `root`, `/`-separated. `None` for `root` itself or
/// paths outside it.
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel_path = path.strip_prefix(root).ok()?;
    if rel_path.as_os_str().is_empty() {
        return None;
    }
    let parts: Vec<_> = rel_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Copy `source_dir` into `destination_dir`, transforming every file.
///
/// Returns the relative names of all files written, in walk order, with
/// filesystem siblings directly after the file they belong to.
pub fn copy_tree(
    transformer: &mut Transformer,
    source_dir: &Path,
    destination_dir: &Path,
) -> Result<Vec<String>, TreeError> {
    fs::create_dir_all(destination_dir)?;
    let mut written = Vec::new();

    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
    {
        let entry = entry?;
        let Some(name) = relative_name(source_dir, entry.path()) else {
            continue;
        };
        let target = destination_dir.join(&name);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            create_dir(&target, entry.metadata()?.permissions())?;
        } else if file_type.is_file() {
            let path = DeepPath::new(name.as_str());
            let sibling = copy_or_transform(transformer, &path, entry.path(), &target)?;
            written.push(name.clone());
            if let Some(sibling) = sibling {
                written.push(sibling_entry_name(&name, &sibling));
            }
        } else {
            return Err(TreeError::NotRegularFile(entry.path().to_path_buf()));
        }
    }
    Ok(written)
}

fn create_dir(path: &Path, permissions: Permissions) -> io::Result<()> {
    match fs::create_dir(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    fs::set_permissions(path, permissions)
}

/// Transform one top-level file into `destination_path`.
///
/// Returns the file name of the sibling written next to it, if any.
pub fn copy_or_transform(
    transformer: &mut Transformer,
    path: &DeepPath,
    source_path: &Path,
    destination_path: &Path,
) -> Result<Option<String>, TreeError> {
    let metadata = fs::metadata(source_path)?;
    if !metadata.is_file() {
        return Err(TreeError::NotRegularFile(source_path.to_path_buf()));
    }

    let mut source = File::open(source_path)?;
    let mut pending = PendingFile::with_permissions(destination_path, metadata.permissions())?;

    let result = transformer
        .transform(path, &mut source)
        .map_err(|source| TreeError::Transform {
            path: path.clone(),
            source,
        })?;

    match result.replacement() {
        Some(replacement) => pending.file.write_all(replacement)?,
        None => {
            source.rewind()?;
            io::copy(&mut source, &mut pending.file)?;
            pending.file.set_modified(metadata.modified()?)?;
        }
    }
    pending.commit()?;

    let Some(sibling) = result.sibling() else {
        return Ok(None);
    };
    let sibling_path = destination_path.with_file_name(&sibling.name);
    debug!(path = %sibling_path.display(), "writing sibling file");
    let mut pending =
        PendingFile::with_permissions(&sibling_path, without_execute(metadata.permissions()))?;
    pending.file.write_all(&sibling.content)?;
    pending.commit()?;
    Ok(Some(sibling.name.clone()))
}

#[cfg(unix)]
fn without_execute(permissions: Permissions) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(permissions.mode() & !0o111)
}

#[cfg(not(unix))]
fn without_execute(permissions: Permissions) -> Permissions {
    permissions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SignOperation, TransformRegistry};
    use crate::transform::Signers;
    use release_signers::{SignedArtifact, SigningBackend, SigningError, SigningResult};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct AscSigner;

    impl SigningBackend for AscSigner {
        fn label(&self) -> &'static str {
            "asc"
        }

        fn sign(&self, name: &str, _content: &[u8]) -> SigningResult<SignedArtifact> {
            Ok(SignedArtifact::Detached {
                signature_name: format!("{}.asc", name.rsplit('/').next().unwrap_or(name)),
                signature: b"-----BEGIN PGP SIGNATURE-----\n".to_vec(),
            })
        }

        fn verify(&self, _: &str, _: &[u8], _: &SignedArtifact) -> SigningResult<()> {
            Ok(())
        }
    }

    struct FailingSigner;

    impl SigningBackend for FailingSigner {
        fn label(&self) -> &'static str {
            "failing"
        }

        fn sign(&self, _: &str, _: &[u8]) -> SigningResult<SignedArtifact> {
            Err(SigningError::VerificationFailed {
                backend: "failing",
                reason: "no".to_string(),
            })
        }

        fn verify(&self, _: &str, _: &[u8], _: &SignedArtifact) -> SigningResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_relative_name() {
        let root = Path::new("/src");
        assert_eq!(
            relative_name(root, Path::new("/src/manual/linux.tar.gz")).as_deref(),
            Some("manual/linux.tar.gz")
        );
        assert_eq!(relative_name(root, root), None);
        assert_eq!(relative_name(root, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn test_copy_tree_preserves_plain_files() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        fs::create_dir(source.path().join("docs")).unwrap();
        fs::write(source.path().join("docs/README"), b"readme").unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(source.path().join("docs/README"))
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let mut transformer = Transformer::new(TransformRegistry::new(), Signers::new());
        let written = copy_tree(&mut transformer, source.path(), destination.path()).unwrap();

        assert_eq!(written, vec!["docs/README".to_string()]);
        let copied = destination.path().join("docs/README");
        assert_eq!(fs::read(&copied).unwrap(), b"readme");
        assert_eq!(fs::metadata(&copied).unwrap().modified().unwrap(), mtime);
    }

    #[test]
    fn test_sibling_written_next_to_file() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        fs::create_dir(source.path().join("source")).unwrap();
        fs::write(source.path().join("source/app.tar.xz"), b"tarball").unwrap();

        let mut registry = TransformRegistry::new();
        registry.insert(DeepPath::new("source/app.tar.xz"), SignOperation::DetachedSignature);
        let signers = Signers::new().with(SignOperation::DetachedSignature, Box::new(AscSigner));
        let mut transformer = Transformer::new(registry, signers);

        let written = copy_tree(&mut transformer, source.path(), destination.path()).unwrap();
        assert_eq!(written, ["source/app.tar.xz", "source/app.tar.xz.asc"]);
        assert_eq!(
            fs::read(destination.path().join("source/app.tar.xz")).unwrap(),
            b"tarball"
        );
        assert!(destination.path().join("source/app.tar.xz.asc").is_file());
    }

    #[test]
    fn test_failed_transform_leaves_no_partial_file() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        fs::write(source.path().join("app"), b"binary").unwrap();

        let mut registry = TransformRegistry::new();
        registry.insert(DeepPath::new("app"), SignOperation::CodeSign);
        let signers = Signers::new().with(SignOperation::CodeSign, Box::new(FailingSigner));
        let mut transformer = Transformer::new(registry, signers);

        let err = copy_tree(&mut transformer, source.path(), destination.path()).unwrap_err();
        assert!(matches!(err, TreeError::Transform { .. }));
        assert!(!destination.path().join("app").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_rejected() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        fs::write(source.path().join("real"), b"x").unwrap();
        std::os::unix::fs::symlink("real", source.path().join("link")).unwrap();

        let mut transformer = Transformer::new(TransformRegistry::new(), Signers::new());
        let err = copy_tree(&mut transformer, source.path(), destination.path()).unwrap_err();
        assert!(matches!(err, TreeError::NotRegularFile(_)));
    }
}
