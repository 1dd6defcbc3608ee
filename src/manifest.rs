//! `SHA256SUMS`-style digest manifest
//!
//! One line per file: 64 lowercase hex characters, two spaces, the path
//! relative to the manifest's directory, newline. The format is the one
//! `sha256sum --check` reads.

use std::fs::{self, File};
use std::path::Path;

use crate::cache::ContentDigest;
use crate::pending::write_file;

/// Errors writing or verifying a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest line {line} is malformed: {text:?}")]
    Malformed { line: usize, text: String },

    #[error("{} file(s) do not match the manifest: {}", .0.len(), .0.join(", "))]
    Mismatch(Vec<String>),
}

impl ManifestError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ManifestError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Ordered list of (digest, relative name) lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestManifest {
    lines: Vec<(ContentDigest, String)>,
}

impl DigestManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, digest: ContentDigest, name: impl Into<String>) {
        self.lines.push((digest, name.into()));
    }

    /// Hash the file at `path` and list it as `name`.
    pub fn add_file(&mut self, path: &Path, name: impl Into<String>) -> Result<(), ManifestError> {
        let mut file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
        let digest = ContentDigest::of_reader(&mut file).map_err(|e| ManifestError::io(path, e))?;
        self.add(digest, name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ContentDigest, &str)> {
        self.lines.iter().map(|(digest, name)| (digest, name.as_str()))
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|(digest, name)| format!("{}  {}\n", digest, name))
            .collect()
    }

    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        write_file(path, self.render().as_bytes()).map_err(|e| ManifestError::io(path, e))
    }

    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut manifest = Self::new();
        for (index, line) in text.lines().enumerate() {
            let malformed = || ManifestError::Malformed {
                line: index + 1,
                text: line.to_string(),
            };
            let (hex_digest, name) = line.split_once("  ").ok_or_else(malformed)?;
            let bytes: [u8; 32] = hex::decode(hex_digest)
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(malformed)?;
            if name.is_empty() {
                return Err(malformed());
            }
            manifest.add(ContentDigest::from_bytes(bytes), name);
        }
        Ok(manifest)
    }

    /// Re-hash every listed file under `root`, reporting all mismatches.
    ///
    /// A listed file that cannot be read counts as a mismatch.
    pub fn verify(&self, root: &Path) -> Result<(), ManifestError> {
        let mismatched: Vec<String> = self
            .lines
            .iter()
            .filter(|(expected, name)| {
                File::open(root.join(name))
                    .and_then(|mut file| ContentDigest::of_reader(&mut file))
                    .map_or(true, |actual| actual != *expected)
            })
            .map(|(_, name)| name.clone())
            .collect();
        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Mismatch(mismatched))
        }
    }

    /// Read the manifest at `path` and verify it against its own directory.
    pub fn verify_file(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
        let manifest = Self::parse(&text)?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.verify(root)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_format() {
        let mut manifest = DigestManifest::new();
        manifest.add(ContentDigest::of(b""), "source/app.tar.gz");
        assert_eq!(
            manifest.render(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855  source/app.tar.gz\n"
        );
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(matches!(
            DigestManifest::parse("abc  file\n"),
            Err(ManifestError::Malformed { line: 1, .. })
        ));
        let good = DigestManifest::parse(&format!("{}  a b.txt\n", ContentDigest::of(b"x"))).unwrap();
        assert_eq!(good.entries().next().map(|(_, n)| n), Some("a b.txt"));
    }

    #[test]
    fn test_verify_file_detects_tampering() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("manual")).unwrap();
        fs::write(dir.path().join("manual/linux.tar.gz"), b"tarball").unwrap();
        fs::write(dir.path().join("README"), b"readme").unwrap();

        let mut manifest = DigestManifest::new();
        manifest
            .add_file(&dir.path().join("README"), "README")
            .unwrap();
        manifest
            .add_file(&dir.path().join("manual/linux.tar.gz"), "manual/linux.tar.gz")
            .unwrap();
        let path = dir.path().join("SHA256SUMS");
        manifest.write(&path).unwrap();

        assert_eq!(DigestManifest::verify_file(&path).unwrap(), manifest);

        fs::write(dir.path().join("README"), b"tampered").unwrap();
        match DigestManifest::verify_file(&path) {
            Err(ManifestError::Mismatch(names)) => assert_eq!(names, vec!["README".to_string()]),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut manifest = DigestManifest::new();
        manifest.add(ContentDigest::of(b"gone"), "gone.zip");
        assert!(matches!(
            manifest.verify(dir.path()),
            Err(ManifestError::Mismatch(_))
        ));
    }
}
