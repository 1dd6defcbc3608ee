//! Authenticode signing through `osslsigncode`

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use base64::Engine;

use crate::error::{SigningError, SigningResult};
use crate::tool;
use crate::{SignedArtifact, SigningBackend};

const LABEL: &str = "osslsigncode";

/// Timestamp authority used when none is configured
pub const DEFAULT_TIMESTAMP_URL: &str = "http://timestamp.digicert.com";

/// Signs PE executables with a PKCS#12 key and a timestamp authority.
#[derive(Debug, Clone)]
pub struct Osslsigncode {
    pkcs12_path: PathBuf,
    timestamp_url: String,
    /// Trusted certificate (DER), used as the CA file when verifying
    certificate_der: Vec<u8>,
    program: PathBuf,
}

impl Osslsigncode {
    pub fn new(pkcs12_path: impl Into<PathBuf>, certificate_der: Vec<u8>) -> Self {
        Self {
            pkcs12_path: pkcs12_path.into(),
            timestamp_url: DEFAULT_TIMESTAMP_URL.to_string(),
            certificate_der,
            program: PathBuf::from("osslsigncode"),
        }
    }

    pub fn with_timestamp_url(mut self, url: impl Into<String>) -> Self {
        self.timestamp_url = url.into();
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl SigningBackend for Osslsigncode {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn sign(&self, _name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let scratch = tool::scratch_dir()?;
        let unsigned = tool::stage_file(scratch.path(), "unsigned.exe", content)?;
        let signed = scratch.path().join("signed.exe");

        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("sign")
                .arg("-pkcs12")
                .arg(&self.pkcs12_path)
                .arg("-t")
                .arg(&self.timestamp_url)
                .arg("-in")
                .arg(&unsigned)
                .arg("-out")
                .arg(&signed),
        )?;

        Ok(SignedArtifact::Replaced(fs::read(&signed)?))
    }

    fn verify(&self, name: &str, _content: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        let SignedArtifact::Replaced(signed_bytes) = signed else {
            return Err(SigningError::UnexpectedArtifact {
                backend: LABEL,
                name: name.to_string(),
            });
        };
        let scratch = tool::scratch_dir()?;
        let exe = tool::stage_file(scratch.path(), "signed.exe", signed_bytes)?;
        let ca_file = tool::stage_file(
            scratch.path(),
            "certificate.pem",
            der_to_pem(&self.certificate_der).as_bytes(),
        )?;

        tool::run(
            LABEL,
            Command::new(&self.program)
                .arg("verify")
                .arg("-in")
                .arg(&exe)
                .arg("-CAfile")
                .arg(&ca_file),
        )
    }
}

/// Encode a DER certificate as PEM (64-column base64 body).
pub fn der_to_pem(der: &[u8]) -> String {
    let body = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(64) {
        // base64 output is ASCII
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}
