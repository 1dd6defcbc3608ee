//! Transform registry: which deep paths get signed, and how
//!
//! Entries are consumed as they are applied. Whatever remains after the
//! whole source tree has been walked names files the release was expected
//! to contain but did not.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::deep_path::DeepPath;

/// Signing operation applied to a registered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignOperation {
    /// Replace the file with a code-signed copy (Apple codesign)
    CodeSign,
    /// Keep the file; add a detached signature next to it
    DetachedSignature,
    /// Replace the file with an Authenticode-signed, timestamped copy
    ExecutableSign,
}

impl fmt::Display for SignOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignOperation::CodeSign => "code-sign",
            SignOperation::DetachedSignature => "detached-signature",
            SignOperation::ExecutableSign => "executable-sign",
        })
    }
}

/// A registration as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub path: DeepPath,
    pub operation: SignOperation,
}

/// Errors building a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{path} is registered twice ({first} and {second})")]
    Duplicate {
        path: DeepPath,
        first: SignOperation,
        second: SignOperation,
    },
}

/// Mapping from deep path to signing operation.
///
/// Paths not present map to "no transform".
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    entries: BTreeMap<DeepPath, SignOperation>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config entries, rejecting duplicate paths.
    pub fn from_entries(
        entries: impl IntoIterator<Item = RegistryEntry>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in entries {
            if let Some(&first) = registry.entries.get(&entry.path) {
                return Err(RegistryError::Duplicate {
                    path: entry.path,
                    first,
                    second: entry.operation,
                });
            }
            registry.insert(entry.path, entry.operation);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, path: DeepPath, operation: SignOperation) {
        self.entries.insert(path, operation);
    }

    /// Operation registered for `path`, if any
    pub fn lookup(&self, path: &DeepPath) -> Option<SignOperation> {
        self.entries.get(path).copied()
    }

    /// Mark `path` as applied. Consuming an absent path is a no-op.
    pub fn consume(&mut self, path: &DeepPath) {
        self.entries.remove(path);
    }

    /// Paths that were registered but never consumed, in sorted order
    pub fn remaining_entries(&self) -> Vec<DeepPath> {
        self.entries.keys().cloned().collect()
    }

    /// Whether any registration needs the given operation
    pub fn uses(&self, operation: SignOperation) -> bool {
        self.entries.values().any(|&op| op == operation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> DeepPath {
        DeepPath::from_segments(segments.iter().copied()).unwrap()
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let registry = TransformRegistry::new();
        assert_eq!(registry.lookup(&DeepPath::new("README")), None);
    }

    #[test]
    fn test_consume_removes_entry() {
        let mut registry = TransformRegistry::new();
        let p = path(&["manual/windows.zip", "bin/quick-lint-js.exe"]);
        registry.insert(p.clone(), SignOperation::ExecutableSign);

        assert_eq!(registry.lookup(&p), Some(SignOperation::ExecutableSign));
        registry.consume(&p);
        assert_eq!(registry.lookup(&p), None);
        assert!(registry.remaining_entries().is_empty());

        // consuming twice is harmless
        registry.consume(&p);
    }

    #[test]
    fn test_remaining_entries_lists_every_unconsumed_path() {
        let mut registry = TransformRegistry::new();
        let a = path(&["a.tar.gz", "bin/a"]);
        let b = path(&["b.zip", "bin/b.exe"]);
        registry.insert(b.clone(), SignOperation::ExecutableSign);
        registry.insert(a.clone(), SignOperation::DetachedSignature);

        assert_eq!(registry.remaining_entries(), vec![a, b]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let p = path(&["a.zip", "x"]);
        let err = TransformRegistry::from_entries([
            RegistryEntry {
                path: p.clone(),
                operation: SignOperation::CodeSign,
            },
            RegistryEntry {
                path: p,
                operation: SignOperation::DetachedSignature,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
    }

    #[test]
    fn test_operation_names() {
        let op: SignOperation = serde_json::from_str("\"executable-sign\"").unwrap();
        assert_eq!(op, SignOperation::ExecutableSign);
        assert_eq!(SignOperation::DetachedSignature.to_string(), "detached-signature");
    }

    #[test]
    fn test_uses() {
        let mut registry = TransformRegistry::new();
        registry.insert(DeepPath::new("f"), SignOperation::CodeSign);
        assert!(registry.uses(SignOperation::CodeSign));
        assert!(!registry.uses(SignOperation::ExecutableSign));
    }
}
