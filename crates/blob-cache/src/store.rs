//! Raw file storage for cached blobs
//!
//! One file per key directly under the cache directory, no sidecar metadata.
//! Size and recency are read back from file length and modification time.
//! Writes go to a `+`-prefixed temporary file in the same directory and are
//! renamed into place, so readers never observe a partial blob.

use crate::{error::CacheResult, key::KeyMapper};
use bytes::Bytes;
use std::{
    fs::{self, File},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{trace, warn};

/// Prefix of in-flight temporary files; never produced by [`KeyMapper`]
pub const TEMP_PREFIX: char = '+';

/// Metadata snapshot of one stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Full path of the blob file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, doubling as the last access time
    pub modified: SystemTime,
}

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Size of the blob that was replaced, if any
    pub previous_size: Option<u64>,
    /// Size of the blob now on disk
    pub new_size: u64,
}

impl WriteOutcome {
    /// Signed change in stored bytes caused by this write
    pub fn delta(&self) -> i64 {
        self.new_size as i64 - self.previous_size.unwrap_or(0) as i64
    }
}

/// Filesystem blob store rooted at one cache directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    mapper: KeyMapper,
}

impl BlobStore {
    /// Create a store over `root` using `mapper` for file names
    pub fn new(root: impl Into<PathBuf>, mapper: KeyMapper) -> Self {
        Self {
            root: root.into(),
            mapper,
        }
    }

    /// Directory holding the blob files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache directory (and parents) if missing
    pub fn ensure_root(&self) -> CacheResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(self.mapper.filename_for(key))
    }

    /// Atomically write `data` under `key`
    ///
    /// Captures the size of any blob being replaced so the caller can adjust
    /// its accounting. On error nothing on disk changes.
    pub fn write(&self, key: &str, data: &[u8]) -> CacheResult<WriteOutcome> {
        let filename = self.mapper.filename_for(key);
        let path = self.root.join(&filename);
        let temp_path = self.root.join(format!("{TEMP_PREFIX}{filename}"));

        let previous_size = file_size(&path)?;

        if let Err(e) = write_atomic(&temp_path, &path, data) {
            // Best effort, the temp file may not exist
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        trace!("Wrote {} bytes for key {key:?}", data.len());
        Ok(WriteOutcome {
            previous_size,
            new_size: data.len() as u64,
        })
    }

    /// Read the blob stored under `key`
    ///
    /// Returns `Ok(None)` if the file does not exist. All other errors are
    /// propagated.
    pub fn read(&self, key: &str) -> CacheResult<Option<Bytes>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the blob stored under `key`
    ///
    /// Returns the size of the removed file, or `None` if there was none.
    pub fn remove(&self, key: &str) -> CacheResult<Option<u64>> {
        self.remove_path(&self.path_for(key))
    }

    /// Delete the blob file at `path`, returning its size
    pub fn remove_path(&self, path: &Path) -> CacheResult<Option<u64>> {
        let Some(size) = file_size(path)? else {
            return Ok(None);
        };

        match fs::remove_file(path) {
            Ok(()) => {
                trace!("Removed {} ({size} bytes)", path.display());
                Ok(Some(size))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete everything under the cache directory
    ///
    /// Per-entry failures are logged and skipped. Only a failure to list the
    /// directory is returned. Returns the number of entries removed.
    pub fn remove_all(&self) -> CacheResult<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry in {}: {e}", self.root.display());
                    continue;
                }
            };
            let path = entry.path();

            let result = match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => fs::remove_dir_all(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }

        Ok(removed)
    }

    /// Set the modification time of `key`'s blob to now
    ///
    /// Returns whether the blob existed.
    pub fn touch(&self, key: &str) -> CacheResult<bool> {
        let path = self.path_for(key);
        match File::open(&path) {
            Ok(file) => {
                file.set_modified(SystemTime::now())?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata snapshot of every stored blob
    ///
    /// Temporary files and directories are skipped. Entries whose metadata
    /// cannot be read are logged and left out.
    pub fn list_entries(&self) -> CacheResult<Vec<BlobEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry in {}: {e}", self.root.display());
                    continue;
                }
            };

            if is_temp_name(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Failed to read file size of {}: {e}", path.display());
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Failed to read modification date of {}: {e}", path.display());
                    SystemTime::UNIX_EPOCH
                }
            };

            entries.push(BlobEntry {
                path,
                size: metadata.len(),
                modified,
            });
        }

        Ok(entries)
    }

    /// Delete temporary files left behind by interrupted writes
    pub fn purge_temp_files(&self) -> CacheResult<usize> {
        let mut purged = 0;

        for entry in fs::read_dir(&self.root)?.flatten() {
            if !is_temp_name(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => purged += 1,
                Err(e) => warn!("Failed to remove stale temp file {}: {e}", path.display()),
            }
        }

        Ok(purged)
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// Size of the regular file at `path`, `None` if absent
fn file_size(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_atomic(temp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    {
        let mut file = File::create(temp_path)?;
        file.write_all(data)?;
        file.flush()?;
        file.sync_all()?;
    }

    fs::rename(temp_path, path)
}
