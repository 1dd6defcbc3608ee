//! Apple `codesign` backend

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use sha1::{Digest, Sha1};

use crate::error::{SigningError, SigningResult};
use crate::tool::{self, base_name};
use crate::{SignedArtifact, SigningBackend};

const LABEL: &str = "Apple codesign";

/// Signs Mach-O binaries in place with `codesign`.
///
/// Verification requires the leaf certificate of the new signature to match
/// the SHA-1 of the expected certificate.
#[derive(Debug, Clone)]
pub struct AppleCodesign {
    /// Keychain common name of the signing identity
    identity: String,
    /// SHA-1 of the expected leaf certificate (DER)
    certificate_sha1: [u8; 20],
    program: PathBuf,
}

impl AppleCodesign {
    pub fn new(identity: impl Into<String>, certificate_der: &[u8]) -> Self {
        Self {
            identity: identity.into(),
            certificate_sha1: Sha1::digest(certificate_der).into(),
            program: PathBuf::from("codesign"),
        }
    }

    /// Use a different `codesign` executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Designated requirement pinning the leaf certificate
    pub fn requirement(&self) -> String {
        format!(
            "certificate leaf = H\"{}\"",
            hex::encode(self.certificate_sha1)
        )
    }
}

impl SigningBackend for AppleCodesign {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn sign(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let scratch = tool::scratch_dir()?;
        // codesign may use the file name as the signing Identifier, so keep
        // the original name rather than a random one.
        let path = tool::stage_file(scratch.path(), base_name(name), content)?;

        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("--sign")
                .arg(&self.identity)
                .arg("--force")
                .arg("--")
                .arg(&path),
        )?;

        // codesign replaces the file rather than rewriting it.
        Ok(SignedArtifact::Replaced(fs::read(&path)?))
    }

    fn verify(&self, name: &str, _content: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        let SignedArtifact::Replaced(signed_bytes) = signed else {
            return Err(SigningError::UnexpectedArtifact {
                backend: LABEL,
                name: name.to_string(),
            });
        };
        let scratch = tool::scratch_dir()?;
        let path = tool::stage_file(scratch.path(), base_name(name), signed_bytes)?;

        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("-vvv")
                .arg(format!("-R={}", self.requirement()))
                .arg("--")
                .arg(&path),
        )
    }
}
