//! Top-level error type

use std::io;
use std::path::PathBuf;

use release_signers::SigningError;

use crate::check::CheckError;
use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::tree::TreeError;

/// Any failure that aborts a run
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("signing {} failed: {source}", path.display())]
    Signing {
        path: PathBuf,
        #[source]
        source: SigningError,
    },

    #[error("{backend} did not produce a detached signature for {}", path.display())]
    NotDetached { backend: &'static str, path: PathBuf },

    #[error("no detached signer is configured")]
    NoDetachedSigner,

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ReleaseResult<T> = Result<T, ReleaseError>;
