//! Mapping from opaque cache keys to filesystem-safe file names
//!
//! Keys are percent-escaped so any string maps to a single path component.
//! When the escaped form would not fit in a file name, a fixed-length hash of
//! the original key is used instead. Hashed names carry a `#` prefix, which
//! the escaper never emits, so they cannot collide with escaped keys.

use std::{borrow::Cow, fmt, sync::Arc};
use tracing::warn;

/// Longest file name accepted by common filesystems, in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Prefix marking names produced by the long-key hasher
pub const HASHED_PREFIX: char = '#';

/// Produces a fixed-length, filesystem-safe name for keys too long to escape
pub trait KeyHasher: Send + Sync {
    /// Hash `key` into a short file name
    fn hash_key(&self, key: &str) -> String;
}

impl<F> KeyHasher for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn hash_key(&self, key: &str) -> String {
        self(key)
    }
}

/// Default long-key hasher using the hex MD5 digest of the key
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5KeyHasher;

impl KeyHasher for Md5KeyHasher {
    fn hash_key(&self, key: &str) -> String {
        hex::encode(md5::compute(key.as_bytes()).0)
    }
}

/// Deterministic key to file name mapping
#[derive(Clone)]
pub struct KeyMapper {
    hasher: Arc<dyn KeyHasher>,
}

impl fmt::Debug for KeyMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMapper").finish_non_exhaustive()
    }
}

impl Default for KeyMapper {
    fn default() -> Self {
        Self::new(Arc::new(Md5KeyHasher))
    }
}

impl KeyMapper {
    /// Create a mapper using `hasher` for oversized keys
    pub fn new(hasher: Arc<dyn KeyHasher>) -> Self {
        Self { hasher }
    }

    /// File name (relative to the cache directory) for `key`
    pub fn filename_for(&self, key: &str) -> String {
        let escaped = escape(key);
        if !escaped.is_empty() && escaped.len() < MAX_FILENAME_LEN {
            return escaped.into_owned();
        }

        // The hasher is a collaborator; escape its output too
        let name = hashed_name(&self.hasher.hash_key(key));
        if name.len() < MAX_FILENAME_LEN {
            return name;
        }

        warn!(
            "Key hasher produced a {} byte file name, falling back to MD5",
            name.len()
        );
        hashed_name(&Md5KeyHasher.hash_key(key))
    }

    /// Whether `filename` was produced by the hashed fallback
    pub fn is_hashed(filename: &str) -> bool {
        filename.starts_with(HASHED_PREFIX)
    }
}

fn hashed_name(hashed: &str) -> String {
    let escaped = escape(hashed);
    let mut name = String::with_capacity(escaped.len() + 1);
    name.push(HASHED_PREFIX);
    name.push_str(&escaped);
    name
}

/// Percent-escape `key` into a single safe path component
///
/// Everything except ASCII alphanumerics and `-_.~` is encoded. A leading `.`
/// is encoded as well so `.`, `..` and hidden names cannot be produced.
pub fn escape(key: &str) -> Cow<'_, str> {
    let encoded = urlencoding::encode(key);
    match encoded.strip_prefix('.') {
        Some(rest) => Cow::Owned(format!("%2E{rest}")),
        None => encoded,
    }
}
