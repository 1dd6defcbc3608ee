//! GnuPG detached-signature backend

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::error::{SigningError, SigningResult};
use crate::tool::{self, base_name};
use crate::{SignedArtifact, SigningBackend};

const LABEL: &str = "GPG";

/// Produces ASCII-armored detached signatures (`<name>.asc`).
///
/// Verification imports the trusted public key into a throwaway GNUPGHOME,
/// so it never depends on the signer's own keyring.
#[derive(Debug, Clone)]
pub struct GpgDetached {
    /// Fingerprint, email, or name passed to `--local-user`
    identity: String,
    /// Armored or binary public key used for verification
    public_key: Vec<u8>,
    program: PathBuf,
}

impl GpgDetached {
    pub fn new(identity: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
            public_key,
            program: PathBuf::from("gpg"),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl SigningBackend for GpgDetached {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn sign(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let scratch = tool::scratch_dir()?;
        let path = tool::stage_file(scratch.path(), "data", content)?;

        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("--local-user")
                .arg(&self.identity)
                .arg("--armor")
                .arg("--detach-sign")
                .arg("--")
                .arg(&path),
        )?;

        let signature = fs::read(scratch.path().join("data.asc"))?;
        Ok(SignedArtifact::Detached {
            signature_name: format!("{}.asc", base_name(name)),
            signature,
        })
    }

    fn verify(&self, name: &str, content: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        let SignedArtifact::Detached { signature, .. } = signed else {
            return Err(SigningError::UnexpectedArtifact {
                backend: LABEL,
                name: name.to_string(),
            });
        };

        let scratch = tool::scratch_dir()?;
        let data_path = tool::stage_file(scratch.path(), "data", content)?;
        let signature_path = tool::stage_file(scratch.path(), "data.asc", signature)?;

        let gnupg_home = tool::short_scratch_dir()?;
        tool::run_with_stdin(
            LABEL,
            Command::new(&self.program)
                .arg("--import")
                .env("GNUPGHOME", gnupg_home.path()),
            Some(&self.public_key),
        )?;
        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("--verify")
                .arg("--")
                .arg(&signature_path)
                .arg(&data_path)
                .env("GNUPGHOME", gnupg_home.path()),
        )
    }
}
