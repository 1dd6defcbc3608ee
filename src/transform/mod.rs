//! Archive transform dispatcher
//!
//! Given a deep path and its bytes, decide what happens to the file:
//! - `.tar.gz`/`.tgz`: rebuild the archive, transforming every entry
//! - `.zip`/`.nupkg`/`.vsix`: likewise, via the zip rebuilder
//! - registered leaf: sign it (through the content cache)
//! - anything else: leave it alone
//!
//! Archives are always rewritten, even when nothing inside them is
//! registered, so their timestamps may change while entry contents do not.

mod tar_gz;
mod zip_archive;

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use release_signers::{SignedArtifact, SigningBackend, SigningError};
use tracing::{debug, info};

use crate::cache::{CacheStats, ContentDigest, TransformCache};
use crate::deep_path::{DeepPath, DeepPathError};
use crate::registry::{SignOperation, TransformRegistry};

pub use self::tar_gz::rebuild as rebuild_tar_gz;
pub use self::zip_archive::rebuild as rebuild_zip;

/// Errors raised while transforming a file or archive
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    DeepPath(#[from] DeepPathError),

    #[error("{path}: header declares {declared} bytes but {actual} were read")]
    CorruptEntry {
        path: DeepPath,
        declared: u64,
        actual: u64,
    },

    #[error("{path} is registered for {operation} but no signer is configured for it")]
    MissingSigner {
        path: DeepPath,
        operation: SignOperation,
    },

    #[error("signing {path} failed: {source}")]
    Signing {
        path: DeepPath,
        #[source]
        source: SigningError,
    },

    #[error("timestamp {0} cannot be stored in a zip header")]
    Timestamp(DateTime<Utc>),
}

/// A file added next to a transformed entry (e.g. a detached signature)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingFile {
    /// File name without directory; placed in the original's directory
    pub name: String,
    pub content: Arc<[u8]>,
}

/// Outcome of transforming one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// Keep the original bytes
    Unchanged,

    /// Replace the file's bytes
    Replace(Arc<[u8]>),

    /// Write the file (replaced, or original when `replacement` is `None`)
    /// and add a sibling file in the same directory
    ReplaceAndAddSibling {
        replacement: Option<Arc<[u8]>>,
        sibling: SiblingFile,
    },
}

impl TransformResult {
    pub fn replace(content: Vec<u8>) -> Self {
        TransformResult::Replace(content.into())
    }

    /// New bytes for the original file, if any
    pub fn replacement(&self) -> Option<&[u8]> {
        match self {
            TransformResult::Unchanged => None,
            TransformResult::Replace(content) => Some(&content[..]),
            TransformResult::ReplaceAndAddSibling { replacement, .. } => replacement.as_deref(),
        }
    }

    pub fn sibling(&self) -> Option<&SiblingFile> {
        match self {
            TransformResult::ReplaceAndAddSibling { sibling, .. } => Some(sibling),
            _ => None,
        }
    }
}

impl From<SignedArtifact> for TransformResult {
    fn from(signed: SignedArtifact) -> Self {
        match signed {
            SignedArtifact::Replaced(content) => TransformResult::replace(content),
            SignedArtifact::Detached {
                signature_name,
                signature,
            } => TransformResult::ReplaceAndAddSibling {
                replacement: None,
                sibling: SiblingFile {
                    name: signature_name,
                    content: signature.into(),
                },
            },
        }
    }
}

/// One signing backend per operation
#[derive(Default)]
pub struct Signers {
    code_sign: Option<Box<dyn SigningBackend>>,
    detached: Option<Box<dyn SigningBackend>>,
    executable: Option<Box<dyn SigningBackend>>,
}

impl Signers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `backend` for `operation`, replacing any previous one
    pub fn with(mut self, operation: SignOperation, backend: Box<dyn SigningBackend>) -> Self {
        *self.slot(operation) = Some(backend);
        self
    }

    pub fn get(&self, operation: SignOperation) -> Option<&dyn SigningBackend> {
        let backend = match operation {
            SignOperation::CodeSign => &self.code_sign,
            SignOperation::DetachedSignature => &self.detached,
            SignOperation::ExecutableSign => &self.executable,
        };
        backend.as_deref()
    }

    fn slot(&mut self, operation: SignOperation) -> &mut Option<Box<dyn SigningBackend>> {
        match operation {
            SignOperation::CodeSign => &mut self.code_sign,
            SignOperation::DetachedSignature => &mut self.detached,
            SignOperation::ExecutableSign => &mut self.executable,
        }
    }
}

impl std::fmt::Debug for Signers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = |b: &Option<Box<dyn SigningBackend>>| b.as_ref().map(|b| b.label());
        f.debug_struct("Signers")
            .field("code_sign", &label(&self.code_sign))
            .field("detached", &label(&self.detached))
            .field("executable", &label(&self.executable))
            .finish()
    }
}

/// Dispatcher state: the registry, the cache, and the signers.
///
/// Owned by a single run; every archive rebuild borrows it mutably while it
/// recurses into entries.
#[derive(Debug)]
pub struct Transformer {
    registry: TransformRegistry,
    cache: TransformCache,
    signers: Signers,
    /// Stamped on every replaced or added archive entry
    started_at: DateTime<Utc>,
}

impl Transformer {
    pub fn new(registry: TransformRegistry, signers: Signers) -> Self {
        Self {
            registry,
            cache: TransformCache::new(),
            signers,
            started_at: Utc::now(),
        }
    }

    /// Fix the timestamp used for rewritten entries
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn signers(&self) -> &Signers {
        &self.signers
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Transform the file at `path` whose content is readable from `reader`.
    ///
    /// `reader` is left untouched when the result is `Unchanged` for an
    /// unregistered leaf.
    pub fn transform(
        &mut self,
        path: &DeepPath,
        reader: &mut dyn Read,
    ) -> Result<TransformResult, TransformError> {
        let name = path.last();

        if looks_like_tar_gz(name) {
            debug!(%path, "rewriting tar.gz");
            let rebuilt = tar_gz::rebuild(self, path, reader)?;
            return Ok(TransformResult::replace(rebuilt));
        }

        if looks_like_zip(name) {
            debug!(%path, "rewriting zip");
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            let rebuilt = zip_archive::rebuild(self, path, &content)?;
            return Ok(TransformResult::replace(rebuilt));
        }

        let Some(operation) = self.registry.lookup(path) else {
            return Ok(TransformResult::Unchanged);
        };

        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let digest = ContentDigest::of(&content);

        if let Some(cached) = self.cache.get(&digest) {
            debug!(%path, %digest, "reusing cached {}", operation);
            self.registry.consume(path);
            return Ok(cached);
        }

        let result = self.sign(path, operation, &content)?;
        self.cache.put(digest, result.clone());
        self.registry.consume(path);
        Ok(result)
    }

    fn sign(
        &self,
        path: &DeepPath,
        operation: SignOperation,
        content: &[u8],
    ) -> Result<TransformResult, TransformError> {
        let signer = self
            .signers
            .get(operation)
            .ok_or_else(|| TransformError::MissingSigner {
                path: path.clone(),
                operation,
            })?;

        info!("signing with {}: {}", signer.label(), path);
        let signed = signer
            .sign_verified(path.last(), content)
            .map_err(|source| TransformError::Signing {
                path: path.clone(),
                source,
            })?;
        Ok(signed.into())
    }
}

/// Whether `name` is a gzip-compressed tarball
pub fn looks_like_tar_gz(name: &str) -> bool {
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Whether `name` is a zip-family archive
pub fn looks_like_zip(name: &str) -> bool {
    name.ends_with(".zip") || name.ends_with(".nupkg") || name.ends_with(".vsix")
}

/// Entry name for a sibling placed in the same directory as `entry_name`.
pub fn sibling_entry_name(entry_name: &str, sibling_name: &str) -> String {
    match entry_name.trim_end_matches('/').rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() && dir != "." => format!("{}/{}", dir, sibling_name),
        _ => sibling_name.to_string(),
    }
}
