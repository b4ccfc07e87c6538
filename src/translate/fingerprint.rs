//! Cache key derivation.
//! Key: blake3 hash of (text | src_lang | tgt_lang | backend), first 8 bytes
//! rendered as a zero-padded base-36 string behind a namespace prefix.

use serde::{Deserialize, Serialize};

/// Namespace shared by every cache key in the persistent store.
pub const CACHE_PREFIX: &str = "translation_cache_";

/// Width of the base-36 digest (36^13 > 2^64).
const DIGEST_WIDTH: usize = 13;

/// Opaque, namespace-prefixed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        CacheKey(raw)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the cache key under the default namespace.
pub fn fingerprint(text: &str, src_lang: &str, tgt_lang: &str, backend: &str) -> CacheKey {
    fingerprint_with_prefix(CACHE_PREFIX, text, src_lang, tgt_lang, backend)
}

/// Compute the cache key under an explicit namespace.
pub fn fingerprint_with_prefix(
    prefix: &str,
    text: &str,
    src_lang: &str,
    tgt_lang: &str,
    backend: &str,
) -> CacheKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.update(b"|");
    hasher.update(src_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(tgt_lang.as_bytes());
    hasher.update(b"|");
    hasher.update(backend.as_bytes());

    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);

    CacheKey(format!("{prefix}{}", to_base36(u64::from_le_bytes(head))))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = [b'0'; DIGEST_WIDTH];
    let mut pos = DIGEST_WIDTH;
    while n > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    buf.iter().map(|&b| b as char).collect()
}
