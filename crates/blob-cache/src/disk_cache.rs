//! Capacity-bounded persistent blob cache
//!
//! Each [`DiskCache`] owns `<root_dir>/<name>` and stores one file per key.
//! All operations are enqueued on the worker for the cache name and return
//! immediately. Writes are fire-and-forget, reads complete through a future
//! or through callbacks delivered on the process-wide callback queue.
//!
//! The running size is only mutated on the worker, so it stays exact without
//! locking. After every write, and whenever capacity changes, the least
//! recently touched blobs are evicted until the size fits.

use crate::{
    config::{DiskCacheConfig, validate_cache_name},
    error::{CacheError, CacheResult},
    eviction,
    key::{KeyHasher, KeyMapper, Md5KeyHasher},
    queue::{SerialQueue, callback_queue, queue_for},
    size::SizeAccount,
    stats::{CacheStats, CacheStatsSnapshot},
    store::BlobStore,
};
use bytes::Bytes;
use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Callback receiving the reason a fetch did not produce data
pub type FailureCallback = Box<dyn FnOnce(CacheError) + Send + 'static>;

/// State shared between the handle and the worker
struct Inner {
    name: String,
    store: BlobStore,
    size: SizeAccount,
    capacity: AtomicU64,
    stats: CacheStats,
}

impl Inner {
    fn control_capacity(&self) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let report = eviction::control_capacity(&self.store, &self.size, capacity);
        if report.evicted > 0 {
            debug!(
                "Cache {} evicted {} blobs ({} bytes) to fit {capacity} bytes",
                self.name, report.evicted, report.bytes
            );
        }
        self.stats.record_evictions(report.evicted, report.bytes);
    }

    fn recompute_size(&self) {
        if let Err(e) = self.size.recompute(&self.store) {
            warn!("Failed to list directory {}: {e}", self.store.root().display());
        }
    }

    fn read_blob(&self, key: &str) -> CacheResult<Bytes> {
        match self.store.read(key) {
            Ok(Some(data)) => {
                self.stats.record_hit();
                Ok(data)
            }
            Ok(None) => {
                self.stats.record_miss();
                Err(CacheError::KeyNotFound(key.to_string()))
            }
            Err(e) => {
                warn!("Failed to read key {key:?}: {e}");
                self.stats.record_miss();
                Err(e)
            }
        }
    }

    /// Refresh recency; `Ok(false)` when the blob does not exist
    fn touch_blob(&self, key: &str) -> CacheResult<bool> {
        self.store.touch(key).inspect_err(|e| {
            warn!("Failed to update access date of key {key:?}: {e}");
        })
    }

    fn store_blob<F, B>(&self, key: &str, producer: F)
    where
        F: FnOnce() -> Option<B>,
        B: Into<Bytes>,
    {
        if let Err(e) = self.write_blob(key, producer) {
            warn!("Failed to write key {key:?}: {e}");
            self.stats.record_failed_write();
        }
    }

    /// Produce and persist a blob, adjusting the size only on success
    fn write_blob<F, B>(&self, key: &str, producer: F) -> CacheResult<()>
    where
        F: FnOnce() -> Option<B>,
        B: Into<Bytes>,
    {
        let data: Bytes = producer()
            .ok_or_else(|| CacheError::ProducerFailed(key.to_string()))?
            .into();

        let outcome = self.store.write(key, &data)?;
        self.size.adjust(outcome.delta());
        self.stats.record_write();
        self.control_capacity();
        Ok(())
    }

    fn remove_blob(&self, key: &str) {
        match self.store.remove(key) {
            Ok(Some(bytes)) => {
                self.size.release(bytes);
                self.stats.record_removal();
            }
            Ok(None) => trace!("Nothing stored for key {key:?}"),
            Err(e) => warn!("Failed to remove key {key:?}: {e}"),
        }
    }
}

/// Persistent, capacity-bounded cache of byte blobs keyed by strings
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
    queue: SerialQueue,
    callbacks: SerialQueue,
}

impl fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskCache")
            .field("name", &self.inner.name)
            .field("path", &self.inner.store.root())
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl DiskCache {
    /// Open the cache called `name` under `config.root_dir`
    ///
    /// Long keys are hashed with MD5.
    pub fn new(name: impl Into<String>, config: &DiskCacheConfig) -> CacheResult<Self> {
        Self::with_key_hasher(name, config, Arc::new(Md5KeyHasher))
    }

    /// Open the cache called `name`, hashing oversized keys with `hasher`
    ///
    /// Failing to create the cache directory is logged, not returned. The
    /// initial size scan and capacity check run on the cache worker.
    pub fn with_key_hasher(
        name: impl Into<String>,
        config: &DiskCacheConfig,
        hasher: Arc<dyn KeyHasher>,
    ) -> CacheResult<Self> {
        let name = name.into();
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;
        validate_cache_name(&name).map_err(CacheError::InvalidConfiguration)?;

        let store = BlobStore::new(config.cache_dir(&name), KeyMapper::new(hasher));
        if let Err(e) = store.ensure_root() {
            warn!(
                "Failed to create directory {} with error {e}",
                store.root().display()
            );
        }

        let queue = queue_for(&name)?;
        let callbacks = callback_queue()?;

        debug!("Initialized disk cache {name:?} at {:?}", store.root());

        let inner = Arc::new(Inner {
            name,
            store,
            size: SizeAccount::new(),
            capacity: AtomicU64::new(config.capacity),
            stats: CacheStats::new(),
        });

        let init = Arc::clone(&inner);
        queue.dispatch(move || {
            match init.store.purge_temp_files() {
                Ok(0) | Err(_) => {}
                Ok(purged) => debug!("Purged {purged} stale temp files from {}", init.name),
            }
            init.recompute_size();
            init.control_capacity();
        });

        Ok(Self {
            inner,
            queue,
            callbacks,
        })
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Directory holding this cache's blobs
    pub fn path(&self) -> &Path {
        self.inner.store.root()
    }

    /// File that backs `key`
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.inner.store.path_for(key)
    }

    /// Aggregate stored bytes as of the last completed operation
    pub fn size(&self) -> u64 {
        self.inner.size.get()
    }

    /// Current capacity bound in bytes
    pub fn capacity(&self) -> u64 {
        self.inner.capacity.load(Ordering::Relaxed)
    }

    /// Change the capacity bound and enqueue a capacity check
    pub fn set_capacity(&self, capacity: u64) {
        self.inner.capacity.store(capacity, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        self.queue.dispatch(move || inner.control_capacity());
    }

    /// Snapshot of the operation counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Store the blob yielded by `producer` under `key`
    ///
    /// `producer` runs on the cache worker, after every previously submitted
    /// operation, never concurrently with another operation on this cache.
    /// Returning `None` aborts the write.
    pub fn store<F, B>(&self, key: &str, producer: F)
    where
        F: FnOnce() -> Option<B> + Send + 'static,
        B: Into<Bytes>,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.queue.dispatch(move || inner.store_blob(&key, producer));
    }

    /// Store an already materialized blob under `key`
    pub fn store_bytes(&self, key: &str, data: impl Into<Bytes>) {
        let data = data.into();
        self.store(key, move || Some(data));
    }

    /// Refresh the recency of `key`, or store the blob from `producer` if absent
    pub fn touch_or_store<F, B>(&self, key: &str, producer: F)
    where
        F: FnOnce() -> Option<B> + Send + 'static,
        B: Into<Bytes>,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.queue.dispatch(move || {
            // An existing blob that could not be touched is left alone
            if let Ok(false) = inner.touch_blob(&key) {
                inner.store_blob(&key, producer);
            }
        });
    }

    /// Fetch the blob stored under `key`
    ///
    /// The read is enqueued immediately. A hit refreshes the blob's recency.
    /// A miss resolves to [`CacheError::KeyNotFound`].
    pub fn fetch(&self, key: &str) -> impl Future<Output = CacheResult<Bytes>> + Send + use<> {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.queue.dispatch(move || {
            let result = inner.read_blob(&key);
            let hit = result.is_ok();
            let _ = tx.send(result);
            if hit {
                let _ = inner.touch_blob(&key);
            }
        });

        let label = self.queue.label().to_string();
        async move { rx.await.map_err(|_| CacheError::QueueClosed(label))? }
    }

    /// Fetch `key` and deliver the result to callbacks on the callback queue
    ///
    /// Without a `failure` callback, misses and errors are dropped silently.
    pub fn fetch_with<S>(&self, key: &str, success: S, failure: Option<FailureCallback>)
    where
        S: FnOnce(Bytes) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let callbacks = self.callbacks.clone();
        let key = key.to_string();
        self.queue.dispatch(move || match inner.read_blob(&key) {
            Ok(data) => {
                callbacks.dispatch(move || success(data));
                let _ = inner.touch_blob(&key);
            }
            Err(e) => {
                if let Some(failure) = failure {
                    callbacks.dispatch(move || failure(e));
                }
            }
        });
    }

    /// Remove the blob stored under `key`
    pub fn remove(&self, key: &str) {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();
        self.queue.dispatch(move || inner.remove_blob(&key));
    }

    /// Remove every blob and reset the size from disk
    pub fn remove_all(&self) {
        let inner = Arc::clone(&self.inner);
        self.queue.dispatch(move || match inner.store.remove_all() {
            Ok(removed) => {
                debug!("Removed {removed} entries from cache {}", inner.name);
                inner.recompute_size();
            }
            Err(e) => warn!("Failed to list directory {}: {e}", inner.store.root().display()),
        });
    }

    /// Resolve once every previously submitted operation has completed
    pub fn flush(&self) -> impl Future<Output = CacheResult<()>> + Send + use<> {
        self.queue.barrier()
    }
}
