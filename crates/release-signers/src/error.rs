//! Errors raised by signing backends

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors from signing/verification operations
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{backend}: failed to start {program}: {source}")]
    Spawn {
        backend: &'static str,
        program: String,
        #[source]
        source: io::Error,
    },

    /// The external tool ran but exited unsuccessfully.
    #[error("{backend}: {program} exited with {status}\n{output}")]
    ToolFailed {
        backend: &'static str,
        program: String,
        status: ExitStatus,
        /// Captured stdout followed by stderr
        output: String,
    },

    #[error("{backend}: signature did not verify: {reason}")]
    VerificationFailed {
        backend: &'static str,
        reason: String,
    },

    /// The backend was handed an artifact shape it never produces.
    #[error("{backend}: unexpected signed artifact for {name}")]
    UnexpectedArtifact { backend: &'static str, name: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;
