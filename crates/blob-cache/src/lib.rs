//! Capacity-bounded persistent cache for byte blobs
//!
//! This crate stores opaque byte blobs on disk, addressed by arbitrary string
//! keys, and keeps the aggregate stored size under a configurable bound by
//! evicting the least recently touched blobs first.
//!
//! # Features
//!
//! - **One file per key**: `<root>/<cache name>/<escaped key>`, no sidecar
//!   metadata. Size and recency come from file length and modification time.
//! - **Safe file names**: keys are percent-escaped; keys too long for a file
//!   name are replaced by a hash (MD5 by default, injectable).
//! - **Atomic writes**: readers never see a partially written blob.
//! - **Exact accounting**: the running size is only mutated on the cache's own
//!   worker, so it stays equal to the bytes on disk.
//! - **Serialized execution**: every cache name has one FIFO worker thread.
//!   Callers never block; reads complete through futures or callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        DiskCache (façade)           │
//! └─────────────────────────────────────┘
//!                  │ enqueue
//! ┌─────────────────────────────────────┐
//! │  SerialQueue (one worker per name)  │
//! └─────────────────────────────────────┘
//!                  │
//! ┌──────────┐ ┌───────────┐ ┌──────────┐
//! │BlobStore │ │SizeAccount│ │ eviction │
//! │+KeyMapper│ │           │ │          │
//! └──────────┘ └───────────┘ └──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use blob_cache::{DiskCache, DiskCacheConfig};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), blob_cache::CacheError> {
//! let config = DiskCacheConfig::platform_default()?.with_capacity(64 * 1024 * 1024);
//! let cache = DiskCache::new("thumbnails", &config)?;
//!
//! // The producer only runs once the cache worker reaches this write
//! cache.store("https://example.com/a.png", || Some(Bytes::from_static(b"...")));
//!
//! match cache.fetch("https://example.com/a.png").await {
//!     Ok(data) => println!("{} bytes", data.len()),
//!     Err(e) if e.is_miss() => println!("not cached"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk_cache;
pub mod error;
pub mod eviction;
pub mod key;
pub mod queue;
pub mod size;
pub mod stats;
pub mod store;

pub use config::{DOMAIN, DiskCacheConfig, UNLIMITED_CAPACITY, default_root_dir};
pub use disk_cache::{DiskCache, FailureCallback};
pub use error::{CacheError, CacheResult};
pub use key::{KeyHasher, KeyMapper, Md5KeyHasher};
pub use stats::CacheStatsSnapshot;
