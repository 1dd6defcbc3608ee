//! Built-in defaults (layer 1)

use release_signers::DEFAULT_TIMESTAMP_URL;
use serde::{Deserialize, Serialize};

/// Values used when neither the config file nor the command line sets them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Apple code-signing tool (default: "codesign")
    pub codesign_program: String,

    /// GnuPG binary (default: "gpg")
    pub gpg_program: String,

    /// Authenticode signing tool (default: "osslsigncode")
    pub osslsigncode_program: String,

    /// RFC 3161 timestamp authority used for Authenticode
    pub timestamp_url: String,

    /// Digest manifest written at the destination root (default: "SHA256SUMS")
    pub manifest_name: String,

    /// Detached signature backend (default: "gpg")
    pub detached_backend: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            codesign_program: "codesign".to_string(),
            gpg_program: "gpg".to_string(),
            osslsigncode_program: "osslsigncode".to_string(),
            timestamp_url: DEFAULT_TIMESTAMP_URL.to_string(),
            manifest_name: "SHA256SUMS".to_string(),
            detached_backend: "gpg".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "tools": {
                "codesign": self.codesign_program,
                "gpg": self.gpg_program,
                "osslsigncode": self.osslsigncode_program
            },
            "timestamp_url": self.timestamp_url,
            "manifest_name": self.manifest_name,
            "detached_backend": self.detached_backend,
            "transform": []
        })
    }
}
