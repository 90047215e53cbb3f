//! Stable, process-restart-safe cache key digests.
//!
//! Cache keys are SHA-256 digests over a stable stringification rather than
//! an in-memory hash (`Hash`/`hash_map::DefaultHasher`) because in-memory
//! hashes are not guaranteed stable across process restarts or even across
//! runs of the same binary (`DefaultHasher`'s seed is randomized). Two
//! different logical requests must also never collide, which a 64-bit
//! in-memory hash cannot guarantee as cheaply as a cryptographic digest does.

use sha2::{Digest, Sha256};
use std::fmt;

/// A stable, hex-encoded SHA-256 digest identifying a request for cache
/// lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKeyDigest(String);

impl CacheKeyDigest {
    /// Hashes `input` into a digest.
    pub fn of(input: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        CacheKeyDigest(hex::encode(hasher.finalize()))
    }

    /// Returns the hex-encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKeyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKeyDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
