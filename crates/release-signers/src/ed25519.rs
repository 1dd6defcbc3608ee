//! Native Ed25519 detached signatures
//!
//! An in-process alternative to GPG for detached signatures:
//! - the signature file is `<name>.sig` holding the base64 signature
//! - keys are stored base64-encoded (32 raw bytes)
//! - verification may pin the SHA-256 fingerprint of the public key

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{SigningError, SigningResult};
use crate::tool::base_name;
use crate::{SignedArtifact, SigningBackend};

const LABEL: &str = "Ed25519";

/// Detached signer holding its key in memory
pub struct Ed25519Detached {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    pinned_fingerprint: Option<String>,
}

impl Ed25519Detached {
    /// Signer whose signatures are verified against its own public key
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            pinned_fingerprint: None,
        }
    }

    /// Verify against a separately distributed public key instead
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = key;
        self
    }

    /// Require the verifying key to have this SHA-256 fingerprint (hex)
    pub fn with_pinned_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.pinned_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }
}

impl std::fmt::Debug for Ed25519Detached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Detached")
            .field("fingerprint", &compute_key_fingerprint(&self.verifying_key))
            .field("pinned_fingerprint", &self.pinned_fingerprint)
            .finish_non_exhaustive()
    }
}

impl SigningBackend for Ed25519Detached {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn sign(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let signature = self.signing_key.sign(content);
        let mut encoded = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());
        encoded.push('\n');
        Ok(SignedArtifact::Detached {
            signature_name: format!("{}.sig", base_name(name)),
            signature: encoded.into_bytes(),
        })
    }

    fn verify(&self, name: &str, content: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        let SignedArtifact::Detached { signature, .. } = signed else {
            return Err(SigningError::UnexpectedArtifact {
                backend: LABEL,
                name: name.to_string(),
            });
        };

        if let Some(pinned) = &self.pinned_fingerprint {
            let actual = compute_key_fingerprint(&self.verifying_key);
            if &actual != pinned {
                return Err(SigningError::FingerprintMismatch {
                    expected: pinned.clone(),
                    actual,
                });
            }
        }

        let text = String::from_utf8_lossy(signature);
        let sig_bytes = base64::engine::general_purpose::STANDARD.decode(text.trim())?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|e| {
            SigningError::VerificationFailed {
                backend: LABEL,
                reason: e.to_string(),
            }
        })?;

        self.verifying_key
            .verify(content, &signature)
            .map_err(|e| SigningError::VerificationFailed {
                backend: LABEL,
                reason: format!("{}: {}", name, e),
            })
    }
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> SigningResult<SigningKey> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Encode a verifying key to base64 for storage
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
}

/// Decode a verifying key from base64
pub fn decode_verifying_key(encoded: &str) -> SigningResult<VerifyingKey> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))
}
