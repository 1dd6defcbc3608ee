//! Signing backends for sign-release
//!
//! Each backend signs one file's bytes and then verifies its own output
//! before handing it back. Backends either replace the file (code signing,
//! Authenticode) or produce a detached signature that lives next to it.
//!
//! The subprocess-backed signers give every call its own scratch directory,
//! so concurrent calls never share file names.

mod codesign;
mod ed25519;
mod error;
mod gpg;
mod osslsigncode;
mod tool;

pub use codesign::AppleCodesign;
pub use ed25519::{
    compute_key_fingerprint, decode_signing_key, decode_verifying_key, encode_signing_key,
    encode_verifying_key, Ed25519Detached,
};
pub use error::{SigningError, SigningResult};
pub use gpg::GpgDetached;
pub use osslsigncode::{der_to_pem, Osslsigncode, DEFAULT_TIMESTAMP_URL};

/// Output of a successful signing operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedArtifact {
    /// The signed bytes replace the original file.
    Replaced(Vec<u8>),

    /// The original file is untouched; a signature file sits next to it.
    Detached {
        /// File name (no directory) of the signature file
        signature_name: String,
        signature: Vec<u8>,
    },
}

/// A signing capability.
///
/// `name` is the file's name inside its container (or on disk). It need not
/// refer to a real file; backends use its last component where the tool
/// derives something from the file name.
pub trait SigningBackend {
    /// Short label used in logs and errors
    fn label(&self) -> &'static str;

    /// Sign `content`.
    fn sign(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact>;

    /// Verify that `signed` is a valid signature of `content`.
    fn verify(&self, name: &str, content: &[u8], signed: &SignedArtifact) -> SigningResult<()>;

    /// Sign and immediately verify. A verification failure is returned as an
    /// error and the signature is discarded.
    fn sign_verified(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        let signed = self.sign(name, content)?;
        self.verify(name, content, &signed)?;
        Ok(signed)
    }
}

impl<T: SigningBackend + ?Sized> SigningBackend for Box<T> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn sign(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        (**self).sign(name, content)
    }

    fn verify(&self, name: &str, content: &[u8], signed: &SignedArtifact) -> SigningResult<()> {
        (**self).verify(name, content, signed)
    }

    fn sign_verified(&self, name: &str, content: &[u8]) -> SigningResult<SignedArtifact> {
        (**self).sign_verified(name, content)
    }
}
