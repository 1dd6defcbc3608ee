//! sign-release: sign files buried in nested release archives
//!
//! Copies a directory of release artifacts, replacing registered files
//! (found up to three archives deep) with signed versions or adding detached
//! signatures next to them. Everything else comes out byte-identical.
//! Afterwards it checks that every registered file was signed and that
//! identical inputs produced identical outputs, then writes and signs a
//! `SHA256SUMS` manifest.

pub mod cache;
pub mod check;
pub mod config;
pub mod deep_path;
pub mod error;
pub mod manifest;
mod pending;
pub mod pipeline;
pub mod registry;
pub mod transform;
pub mod tree;

pub use cache::{ContentDigest, TransformCache};
pub use check::{check_double_signing, check_unsigned_files, CheckError, DeepHasher, Violation};
pub use config::{ConfigError, SigningConfig};
pub use deep_path::{DeepPath, DeepPathError, MAX_DEPTH};
pub use error::{ReleaseError, ReleaseResult};
pub use manifest::{DigestManifest, ManifestError};
pub use pipeline::{Pipeline, RunSummary};
pub use registry::{RegistryEntry, SignOperation, TransformRegistry};
pub use transform::{Signers, SiblingFile, TransformError, TransformResult, Transformer};
