//! Post-run invariant checks
//!
//! Both checks run after the destination tree is fully written:
//! - completeness: every registry entry was consumed
//! - determinism: bit-identical source files became bit-identical
//!   destination files, wherever they sit (including inside archives)
//!
//! The determinism check re-hashes both trees from disk instead of trusting
//! the transform cache, so it catches dispatcher bugs the cache would hide.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::{debug, error};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::cache::ContentDigest;
use crate::deep_path::{DeepPath, DeepPathError};
use crate::registry::TransformRegistry;
use crate::transform::{looks_like_tar_gz, looks_like_zip};
use crate::tree::relative_name;

/// Errors from the post-run checks
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    DeepPath(#[from] DeepPathError),

    #[error("{} registered file(s) were never signed: {}", .0.len(), join(.0))]
    UnsignedFiles(Vec<DeepPath>),

    #[error("{} destination(s) differ despite bit-identical sources", .0.len())]
    DoubleSigning(Vec<Violation>),
}

/// Two destination paths whose sources were identical but which differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub first: DeepPath,
    pub second: DeepPath,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "destination {} and {} have different hashes despite coming from bit-identical sources",
            self.first, self.second
        )
    }
}

fn join(paths: &[DeepPath]) -> String {
    paths
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fail if any registry entry was never consumed, listing all of them.
pub fn check_unsigned_files(registry: &TransformRegistry) -> Result<(), CheckError> {
    let remaining = registry.remaining_entries();
    if remaining.is_empty() {
        return Ok(());
    }
    for path in &remaining {
        error!("file should have been signed but wasn't: {}", path);
    }
    Err(CheckError::UnsignedFiles(remaining))
}

/// Digest of every file in a tree, descending into archives.
///
/// Archives are recorded themselves and then entered, down to the same
/// depth the transformer understands. Directories and non-regular archive
/// entries are skipped.
#[derive(Debug, Default)]
pub struct DeepHasher {
    digests: BTreeMap<DeepPath, ContentDigest>,
}

impl DeepHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_directory(&mut self, root: &Path) -> Result<(), CheckError> {
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = relative_name(root, entry.path()) else {
                continue;
            };
            let path = DeepPath::new(name);
            if path.can_descend() && is_archive(path.last()) {
                let mut content = Vec::new();
                File::open(entry.path())?.read_to_end(&mut content)?;
                self.hash_content(path, &content)?;
            } else {
                let digest = ContentDigest::of_reader(&mut File::open(entry.path())?)?;
                self.digests.insert(path, digest);
            }
        }
        Ok(())
    }

    /// Record `content` at `path`, then descend if it is an archive.
    pub fn hash_content(&mut self, path: DeepPath, content: &[u8]) -> Result<(), CheckError> {
        self.digests.insert(path.clone(), ContentDigest::of(content));
        if !path.can_descend() {
            return Ok(());
        }
        let name = path.last();
        if looks_like_tar_gz(name) {
            self.hash_tar_gz(&path, content)
        } else if looks_like_zip(name) {
            self.hash_zip(&path, content)
        } else {
            Ok(())
        }
    }

    fn hash_tar_gz(&mut self, archive_path: &DeepPath, content: &[u8]) -> Result<(), CheckError> {
        let mut archive = tar::Archive::new(MultiGzDecoder::new(content));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            self.hash_content(archive_path.append(name)?, &data)?;
        }
        Ok(())
    }

    fn hash_zip(&mut self, archive_path: &DeepPath, content: &[u8]) -> Result<(), CheckError> {
        let mut archive = ZipArchive::new(Cursor::new(content))?;
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            self.hash_content(archive_path.append(name)?, &data)?;
        }
        Ok(())
    }

    pub fn get(&self, path: &DeepPath) -> Option<ContentDigest> {
        self.digests.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeepPath, &ContentDigest)> {
        self.digests.iter()
    }
}

fn is_archive(name: &str) -> bool {
    looks_like_tar_gz(name) || looks_like_zip(name)
}

/// Compare two deep-hashed trees.
///
/// Returns every violation: for each group of source paths sharing a digest,
/// one representative per distinct destination digest, reported pairwise.
/// A source path missing from the destination counts as its own digest.
pub fn find_double_signing(source: &DeepHasher, destination: &DeepHasher) -> Vec<Violation> {
    let mut groups: BTreeMap<ContentDigest, BTreeMap<Option<ContentDigest>, Vec<&DeepPath>>> =
        BTreeMap::new();
    for (path, source_digest) in source.iter() {
        groups
            .entry(*source_digest)
            .or_default()
            .entry(destination.get(path))
            .or_default()
            .push(path);
    }

    let mut violations = Vec::new();
    for by_destination in groups.values() {
        if by_destination.len() < 2 {
            continue;
        }
        let representatives: Vec<&DeepPath> =
            by_destination.values().filter_map(|paths| paths.first().copied()).collect();
        for pair in representatives.windows(2) {
            violations.push(Violation {
                first: pair[1].clone(),
                second: pair[0].clone(),
            });
        }
    }
    violations
}

/// Deep-hash both trees and fail if identical sources became different
/// destinations.
pub fn check_double_signing(source_dir: &Path, destination_dir: &Path) -> Result<(), CheckError> {
    let mut source = DeepHasher::new();
    source.hash_directory(source_dir)?;
    let mut destination = DeepHasher::new();
    destination.hash_directory(destination_dir)?;
    debug!(
        source = source.len(),
        destination = destination.len(),
        "deep-hashed trees"
    );

    let violations = find_double_signing(&source, &destination);
    if violations.is_empty() {
        return Ok(());
    }
    for violation in &violations {
        error!("bug detected: {}", violation);
    }
    Err(CheckError::DoubleSigning(violations))
}
