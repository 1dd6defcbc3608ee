//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`--config`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::{DetachedBackend, SigningConfig, ToolPaths};

use crate::registry::RegistryError;
use release_signers::SigningError;

/// Configuration errors, all raised before the destination is touched
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid transform registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Missing configuration: {}", .0.join(", "))]
    MissingCredentials(Vec<String>),

    #[error("Invalid key: {0}")]
    Key(#[from] SigningError),
}
