//! Running total of bytes managed by one cache instance
//!
//! Only the owning cache's worker mutates the counter, so plain relaxed
//! atomics are enough. Other threads may read it at any time.

use crate::{error::CacheResult, store::BlobStore};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Aggregate size of the blobs in one cache directory
#[derive(Debug, Default)]
pub struct SizeAccount {
    bytes: AtomicU64,
}

impl SizeAccount {
    /// Create an empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total in bytes
    pub fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Apply a signed change, saturating at both ends
    pub fn adjust(&self, delta: i64) {
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add_signed(delta))
            });
    }

    /// Subtract the size of a removed blob
    pub fn release(&self, bytes: u64) {
        let _ = self
            .bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Walk the cache directory and reset the total to the exact sum
    ///
    /// If the directory cannot be listed the counter is left unchanged.
    pub fn recompute(&self, store: &BlobStore) -> CacheResult<u64> {
        let total = store.list_entries()?.iter().map(|entry| entry.size).sum();
        self.bytes.store(total, Ordering::Relaxed);
        debug!("Recomputed size of {}: {total} bytes", store.root().display());
        Ok(total)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::key::KeyMapper;
    use tempfile::TempDir;

    #[test]
    fn test_adjust_and_release() {
        let account = SizeAccount::new();
        account.adjust(100);
        account.adjust(-40);
        assert_eq!(account.get(), 60);

        account.release(10);
        assert_eq!(account.get(), 50);

        account.release(1_000);
        assert_eq!(account.get(), 0);

        account.adjust(-5);
        assert_eq!(account.get(), 0);
    }

    #[test]
    fn test_recompute_matches_disk() {
        let temp_dir = TempDir::new().expect("Operation should succeed");
        let store = BlobStore::new(temp_dir.path(), KeyMapper::default());
        store.write("a", &[0; 10]).expect("Operation should succeed");
        store.write("b", &[0; 25]).expect("Operation should succeed");

        let account = SizeAccount::new();
        account.adjust(999);
        assert_eq!(account.recompute(&store).expect("Operation should succeed"), 35);
        assert_eq!(account.get(), 35);
    }

    #[test]
    fn test_recompute_failure_keeps_counter() {
        let temp_dir = TempDir::new().expect("Operation should succeed");
        let store = BlobStore::new(temp_dir.path().join("missing"), KeyMapper::default());

        let account = SizeAccount::new();
        account.adjust(42);
        assert!(account.recompute(&store).is_err());
        assert_eq!(account.get(), 42);
    }
}
