//! Run orchestration
//!
//! 1. Walk the source tree into the destination, transforming every file
//! 2. Completeness check (registry fully consumed)
//! 3. Determinism check (identical sources gave identical destinations)
//! 4. Write the digest manifest, detached-sign it, verify the signature
//!    read back from disk, and re-verify the manifest itself
//! 5. Detached-sign the source tarball, if configured
//!
//! A failed check aborts before the manifest exists, so a destination
//! without a signed manifest is never a finished release.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use release_signers::{SignedArtifact, SigningBackend};
use tracing::info;

use crate::cache::CacheStats;
use crate::check::{check_double_signing, check_unsigned_files};
use crate::config::SigningConfig;
use crate::error::{ReleaseError, ReleaseResult};
use crate::manifest::DigestManifest;
use crate::pending::write_file;
use crate::registry::SignOperation;
use crate::transform::{Signers, Transformer};
use crate::tree::copy_tree;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Top-level destination files, relative, in walk order
    pub files: Vec<String>,
    pub cache: CacheStats,
    pub manifest: PathBuf,
    pub manifest_signature: PathBuf,
    pub source_tarball_signature: Option<PathBuf>,
}

/// A configured run over one source/destination pair
#[derive(Debug)]
pub struct Pipeline {
    transformer: Transformer,
    manifest_name: String,
    source_tarball: Option<String>,
}

impl Pipeline {
    pub fn new(transformer: Transformer, manifest_name: impl Into<String>) -> Self {
        Self {
            transformer,
            manifest_name: manifest_name.into(),
            source_tarball: None,
        }
    }

    /// Validate `config` and build the registry and signers from it.
    pub fn from_config(config: &SigningConfig) -> ReleaseResult<Self> {
        let registry = config.registry()?;
        let signers: Signers = config.build_signers(&registry)?;
        info!(
            registered = registry.len(),
            detached = ?config.detached_backend,
            "loaded signing configuration"
        );
        let pipeline = Self::new(Transformer::new(registry, signers), config.manifest_name.as_str());
        Ok(match &config.source_tarball {
            Some(tarball) => pipeline.with_source_tarball(tarball.as_str()),
            None => pipeline,
        })
    }

    /// Detached-sign this destination-relative file after the manifest
    pub fn with_source_tarball(mut self, name: impl Into<String>) -> Self {
        self.source_tarball = Some(name.into());
        self
    }

    /// Fix the timestamp stamped on rewritten archive entries
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.transformer = self.transformer.with_start_time(started_at);
        self
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    pub fn run(mut self, source_dir: &Path, destination_dir: &Path) -> ReleaseResult<RunSummary> {
        if !source_dir.is_dir() {
            return Err(ReleaseError::NotADirectory(source_dir.to_path_buf()));
        }
        info!(
            source = %source_dir.display(),
            destination = %destination_dir.display(),
            "signing release"
        );

        let files = copy_tree(&mut self.transformer, source_dir, destination_dir)?;

        check_unsigned_files(self.transformer.registry())?;
        check_double_signing(source_dir, destination_dir)?;

        let signer = self
            .transformer
            .signers()
            .get(SignOperation::DetachedSignature)
            .ok_or(ReleaseError::NoDetachedSigner)?;

        let mut manifest = DigestManifest::new();
        for name in &files {
            manifest.add_file(&destination_dir.join(name), name.as_str())?;
        }
        let manifest_path = destination_dir.join(&self.manifest_name);
        manifest.write(&manifest_path)?;
        let manifest_signature = sign_detached_file(signer, &manifest_path)?;
        DigestManifest::verify_file(&manifest_path)?;

        let source_tarball_signature = match &self.source_tarball {
            Some(name) => Some(sign_detached_file(signer, &destination_dir.join(name))?),
            None => None,
        };

        let cache = self.transformer.cache_stats();
        info!(
            files = files.len(),
            signed = cache.entries,
            reused = cache.hits,
            "release signed"
        );
        Ok(RunSummary {
            files,
            cache,
            manifest: manifest_path,
            manifest_signature,
            source_tarball_signature,
        })
    }
}

/// Write a detached signature next to `path`, then verify the copy on disk.
pub fn sign_detached_file(signer: &dyn SigningBackend, path: &Path) -> ReleaseResult<PathBuf> {
    let signing_error = |source| ReleaseError::Signing {
        path: path.to_path_buf(),
        source,
    };
    let name = path.to_string_lossy();
    let content = fs::read(path)?;

    info!("signing with {}: {}", signer.label(), path.display());
    let signature_name = match signer.sign_verified(&name, &content).map_err(signing_error)? {
        SignedArtifact::Detached {
            signature_name,
            signature,
        } => {
            write_file(&path.with_file_name(&signature_name), &signature)?;
            signature_name
        }
        SignedArtifact::Replaced(_) => {
            return Err(ReleaseError::NotDetached {
                backend: signer.label(),
                path: path.to_path_buf(),
            })
        }
    };

    let signature_path = path.with_file_name(&signature_name);
    let on_disk = SignedArtifact::Detached {
        signature_name,
        signature: fs::read(&signature_path)?,
    };
    signer
        .verify(&name, &content, &on_disk)
        .map_err(signing_error)?;
    Ok(signature_path)
}
