//! Content-addressed memo of signing results
//!
//! Several signing tools embed timestamps, so signing the same bytes twice
//! gives different output. Keying results by the SHA-256 of the input makes
//! every occurrence of identical content receive identical treatment,
//! wherever it sits in the tree.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

use sha2::{Digest, Sha256};

use crate::transform::TransformResult;

/// SHA-256 of a byte sequence
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Digest everything readable from `reader`.
    pub fn of_reader(reader: &mut impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Signing results keyed by input digest.
///
/// Populated lazily during the walk and never evicted. Only consulted for
/// registered files; unregistered content is never stored.
#[derive(Debug, Default)]
pub struct TransformCache {
    entries: HashMap<ContentDigest, TransformResult>,
    hits: usize,
    misses: usize,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `digest`, counting the lookup.
    pub fn get(&mut self, digest: &ContentDigest) -> Option<TransformResult> {
        match self.entries.get(digest) {
            Some(result) => {
                self.hits += 1;
                Some(result.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, digest: ContentDigest, result: TransformResult) {
        self.entries.insert(digest, result);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
