//! Typed signing configuration
//!
//! Deserialized from the merged layers. Relative paths are resolved against
//! the working directory.

use std::fs;
use std::path::{Path, PathBuf};

use release_signers::{
    decode_signing_key, decode_verifying_key, AppleCodesign, Ed25519Detached, GpgDetached,
    Osslsigncode, SigningBackend,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ConfigError, EffectiveConfig};
use crate::registry::{RegistryEntry, SignOperation, TransformRegistry};
use crate::transform::Signers;

/// Backend producing detached signatures (registered files and the manifest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetachedBackend {
    Gpg,
    Ed25519,
}

/// External programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub codesign: PathBuf,
    pub gpg: PathBuf,
    pub osslsigncode: PathBuf,
}

/// Everything a run needs besides the two directories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    /// Identity passed to `codesign --sign`
    pub apple_codesign_identity: Option<String>,

    /// Key passed to `gpg --local-user`
    pub gpg_identity: Option<String>,

    /// PKCS#12 container for Authenticode signing
    pub private_key_pkcs12: Option<PathBuf>,

    /// DER certificate: expected code-signing leaf and Authenticode CA
    pub certificate: Option<PathBuf>,

    /// Public key imported to verify GPG signatures
    pub gpg_public_key: Option<PathBuf>,

    pub detached_backend: DetachedBackend,

    /// Base64 Ed25519 signing key file (ed25519 backend)
    pub ed25519_signing_key: Option<PathBuf>,

    /// Base64 Ed25519 public key file signatures are verified against;
    /// defaults to the signing key's own public half
    pub ed25519_public_key: Option<PathBuf>,

    /// Expected SHA-256 fingerprint of the Ed25519 public key
    pub ed25519_fingerprint: Option<String>,

    pub timestamp_url: String,

    pub manifest_name: String,

    /// Top-level destination file detached-signed after the manifest
    pub source_tarball: Option<String>,

    pub tools: ToolPaths,

    #[serde(default, rename = "transform")]
    pub transforms: Vec<RegistryEntry>,
}

impl SigningConfig {
    pub fn from_effective(effective: &EffectiveConfig) -> Result<Self, ConfigError> {
        serde_json::from_value(effective.config.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Build the layers and deserialize them
    pub fn load(
        config_path: Option<&Path>,
        cli_overrides: Option<serde_json::Value>,
    ) -> Result<Self, ConfigError> {
        let effective = EffectiveConfig::build(config_path, cli_overrides)?;
        for source in &effective.sources {
            debug!(origin = ?source.origin, path = ?source.path, digest = ?source.digest, "config layer");
        }
        Self::from_effective(&effective)
    }

    /// Transform registry from the `[[transform]]` tables
    pub fn registry(&self) -> Result<TransformRegistry, ConfigError> {
        Ok(TransformRegistry::from_entries(self.transforms.iter().cloned())?)
    }

    /// Check that every credential the registry (and the manifest signature)
    /// needs is present, listing everything missing.
    pub fn validate(&self, registry: &TransformRegistry) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let mut require = |present: bool, what: &str| {
            if !present && !missing.iter().any(|m| m == what) {
                missing.push(what.to_string());
            }
        };

        if registry.uses(SignOperation::CodeSign) {
            require(self.apple_codesign_identity.is_some(), "apple_codesign_identity");
            require(self.certificate.is_some(), "certificate");
        }
        if registry.uses(SignOperation::ExecutableSign) {
            require(self.private_key_pkcs12.is_some(), "private_key_pkcs12");
            require(self.certificate.is_some(), "certificate");
        }
        match self.detached_backend {
            DetachedBackend::Gpg => {
                require(self.gpg_identity.is_some(), "gpg_identity");
                require(self.gpg_public_key.is_some(), "gpg_public_key");
            }
            DetachedBackend::Ed25519 => {
                require(self.ed25519_signing_key.is_some(), "ed25519_signing_key");
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }

    /// Construct the backends the registry needs. The detached signer is
    /// always installed because the manifest is always signed.
    pub fn build_signers(&self, registry: &TransformRegistry) -> Result<Signers, ConfigError> {
        self.validate(registry)?;
        let mut signers = Signers::new().with(SignOperation::DetachedSignature, self.detached_signer()?);

        if registry.uses(SignOperation::CodeSign) {
            let identity = required(&self.apple_codesign_identity, "apple_codesign_identity")?;
            let certificate = read_file(required(&self.certificate, "certificate")?)?;
            let signer = AppleCodesign::new(identity.as_str(), &certificate)
                .with_program(&self.tools.codesign);
            signers = signers.with(SignOperation::CodeSign, Box::new(signer));
        }
        if registry.uses(SignOperation::ExecutableSign) {
            let pkcs12 = required(&self.private_key_pkcs12, "private_key_pkcs12")?;
            let certificate = read_file(required(&self.certificate, "certificate")?)?;
            let signer = Osslsigncode::new(pkcs12, certificate)
                .with_timestamp_url(self.timestamp_url.as_str())
                .with_program(&self.tools.osslsigncode);
            signers = signers.with(SignOperation::ExecutableSign, Box::new(signer));
        }
        Ok(signers)
    }

    fn detached_signer(&self) -> Result<Box<dyn SigningBackend>, ConfigError> {
        match self.detached_backend {
            DetachedBackend::Gpg => {
                let identity = required(&self.gpg_identity, "gpg_identity")?;
                let public_key = read_file(required(&self.gpg_public_key, "gpg_public_key")?)?;
                Ok(Box::new(
                    GpgDetached::new(identity.as_str(), public_key).with_program(&self.tools.gpg),
                ))
            }
            DetachedBackend::Ed25519 => {
                let key_path = required(&self.ed25519_signing_key, "ed25519_signing_key")?;
                let mut signer = Ed25519Detached::new(decode_signing_key(&read_key(key_path)?)?);
                if let Some(public_key) = &self.ed25519_public_key {
                    let verifying_key = decode_verifying_key(&read_key(public_key)?)?;
                    signer = signer.with_verifying_key(verifying_key);
                }
                if let Some(fingerprint) = &self.ed25519_fingerprint {
                    signer = signer.with_pinned_fingerprint(fingerprint.as_str());
                }
                Ok(Box::new(signer))
            }
        }
    }
}

fn required<'a, T>(value: &'a Option<T>, name: &str) -> Result<&'a T, ConfigError> {
    value
        .as_ref()
        .ok_or_else(|| ConfigError::MissingCredentials(vec![name.to_string()]))
}

fn read_key(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map(|encoded| encoded.trim().to_string())
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))
}
