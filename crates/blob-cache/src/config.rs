//! Configuration for disk-backed blob caches
//!
//! A [`DiskCacheConfig`] carries the process-wide base directory and the
//! initial capacity bound. Each cache instance lives in
//! `<root_dir>/<cache name>`.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::OnceLock};

/// Directory component appended to the platform cache directory
pub const DOMAIN: &str = "blob-cache";

/// Capacity value that disables eviction
pub const UNLIMITED_CAPACITY: u64 = u64::MAX;

static DEFAULT_ROOT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Get the default base directory for all caches in this process
///
/// Resolved once and reused. Returns a path like:
/// - Linux: `~/.cache/blob-cache`
/// - macOS: `~/Library/Caches/blob-cache`
/// - Windows: `C:\Users\{user}\AppData\Local\blob-cache`
pub fn default_root_dir() -> CacheResult<PathBuf> {
    DEFAULT_ROOT
        .get_or_init(|| dirs::cache_dir().map(|dir| dir.join(DOMAIN)))
        .clone()
        .ok_or_else(|| {
            CacheError::InvalidConfiguration(
                "could not determine cache directory for the current platform".to_string(),
            )
        })
}

/// Disk cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Base directory under which each named cache gets its own directory
    pub root_dir: PathBuf,
    /// Upper bound on aggregate stored bytes
    pub capacity: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("cache"),
            capacity: UNLIMITED_CAPACITY,
        }
    }
}

impl DiskCacheConfig {
    /// Create a new disk cache configuration rooted at `root_dir`
    pub fn new<P: Into<PathBuf>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Create a configuration rooted at [`default_root_dir`]
    pub fn platform_default() -> CacheResult<Self> {
        Ok(Self::new(default_root_dir()?))
    }

    /// Set the capacity bound in bytes
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Directory used by the cache called `name`
    pub fn cache_dir(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.root_dir.as_os_str().is_empty() {
            return Err("root_dir must not be empty".to_string());
        }

        Ok(())
    }
}

/// Check that a cache name is usable as a single directory component
pub fn validate_cache_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cache name must not be empty".to_string());
    }

    if name == "." || name == ".." {
        return Err(format!("cache name {name:?} is reserved"));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(format!(
            "cache name {name:?} must not contain path separators or NUL"
        ));
    }

    Ok(())
}
