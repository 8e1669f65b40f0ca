//! Capacity enforcement by least-recently-touched eviction
//!
//! Recency is the file modification time, refreshed on write, on fetch and on
//! explicit touch. When the running size exceeds capacity, blobs are deleted
//! oldest first until the size fits or nothing is left.

use crate::{size::SizeAccount, store::BlobStore};
use tracing::{debug, warn};

/// What one capacity check removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Number of blobs deleted
    pub evicted: u64,
    /// Bytes released by those deletions
    pub bytes: u64,
}

/// Bring `size` within `capacity` by evicting the oldest blobs
///
/// A listing failure is logged and treated as nothing to do.
pub fn control_capacity(store: &BlobStore, size: &SizeAccount, capacity: u64) -> EvictionReport {
    let mut report = EvictionReport::default();
    if size.get() <= capacity {
        return report;
    }

    let mut entries = match store.list_entries() {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {} for eviction: {e}", store.root().display());
            return report;
        }
    };

    // Stable, so equal timestamps keep enumeration order
    entries.sort_by_key(|entry| entry.modified);

    for entry in entries {
        if size.get() <= capacity {
            break;
        }

        match store.remove_path(&entry.path) {
            Ok(Some(bytes)) => {
                size.release(bytes);
                report.evicted += 1;
                report.bytes += bytes;
                debug!("Evicted {} ({bytes} bytes)", entry.path.display());
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to evict {}: {e}", entry.path.display()),
        }
    }

    report
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::key::KeyMapper;
    use std::{
        fs::File,
        time::{Duration, SystemTime},
    };
    use tempfile::TempDir;

    /// Write `key` with a modification time `age_secs` in the past
    fn write_aged(store: &BlobStore, size: &SizeAccount, key: &str, len: usize, age_secs: u64) {
        let outcome = store
            .write(key, &vec![7; len])
            .expect("Operation should succeed");
        size.adjust(outcome.delta());
        File::open(store.path_for(key))
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    fn setup() -> (TempDir, BlobStore, SizeAccount) {
        let temp_dir = TempDir::new().expect("Operation should succeed");
        let store = BlobStore::new(temp_dir.path(), KeyMapper::default());
        (temp_dir, store, SizeAccount::new())
    }

    #[test]
    fn test_within_capacity_is_noop() {
        let (_temp_dir, store, size) = setup();
        write_aged(&store, &size, "a", 50, 30);

        let report = control_capacity(&store, &size, 50);
        assert_eq!(report, EvictionReport::default());
        assert!(store.path_for("a").exists());
    }

    #[test]
    fn test_evicts_oldest_first_and_stops_early() {
        let (_temp_dir, store, size) = setup();
        write_aged(&store, &size, "a", 40, 300);
        write_aged(&store, &size, "b", 40, 200);
        write_aged(&store, &size, "c", 40, 100);
        assert_eq!(size.get(), 120);

        let report = control_capacity(&store, &size, 80);
        assert_eq!(report, EvictionReport { evicted: 1, bytes: 40 });
        assert_eq!(size.get(), 80);
        assert!(!store.path_for("a").exists());
        assert!(store.path_for("b").exists());
        assert!(store.path_for("c").exists());

        let report = control_capacity(&store, &size, 40);
        assert_eq!(report.evicted, 1);
        assert!(!store.path_for("b").exists());
        assert!(store.path_for("c").exists());
    }

    #[test]
    fn test_evicts_everything_when_needed() {
        let (_temp_dir, store, size) = setup();
        write_aged(&store, &size, "a", 10, 20);
        write_aged(&store, &size, "b", 10, 10);

        let report = control_capacity(&store, &size, 0);
        assert_eq!(report.evicted, 2);
        assert_eq!(size.get(), 0);
        assert!(store.list_entries().unwrap().is_empty());
    }

    #[test]
    fn test_entries_exhausted_before_fit() {
        let (_temp_dir, store, size) = setup();
        write_aged(&store, &size, "a", 10, 20);
        // Counter claims more than is on disk
        size.adjust(1_000);

        let report = control_capacity(&store, &size, 5);
        assert_eq!(report.evicted, 1);
        assert_eq!(size.get(), 1_000);
    }

    #[test]
    fn test_listing_failure_is_nothing_to_do() {
        let temp_dir = TempDir::new().expect("Operation should succeed");
        let store = BlobStore::new(temp_dir.path().join("missing"), KeyMapper::default());
        let size = SizeAccount::new();
        size.adjust(500);

        let report = control_capacity(&store, &size, 100);
        assert_eq!(report, EvictionReport::default());
        assert_eq!(size.get(), 500);
    }
}
