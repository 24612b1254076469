#[cfg(test)]
mod tests;

use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{RagError, Result};

const POINTER_FILE: &str = "CURRENT";
const LOCK_FILE: &str = "LOCK";
const GENERATION_PREFIX: &str = "gen-";

/// Exclusive advisory lock on one collection, released on drop
///
/// Held across every pointer swap and every generation deletion, by any
/// process touching the collection.
#[derive(Debug)]
pub struct CollectionLock {
    file: File,
}

impl Drop for CollectionLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release collection lock: {}", e);
        }
    }
}

/// On-disk layout of one collection
///
/// ```text
/// <root>/CURRENT      generation id of the live index
/// <root>/LOCK         advisory lock taken by writers and garbage collection
/// <root>/gen-<id>/    one LanceDB database per generation
/// ```
///
/// A generation directory is never modified after the pointer moves away
/// from it, so swapping the pointer is the only step that changes which
/// data a reader sees. Generations are only written while `LOCK` is held,
/// so with the lock held any directory other than the live one is garbage.
#[derive(Debug, Clone)]
pub struct CollectionLayout {
    root: PathBuf,
}

impl CollectionLayout {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn pointer_path(&self) -> PathBuf {
        self.root.join(POINTER_FILE)
    }

    #[inline]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    #[inline]
    pub fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(format!("{}{}", GENERATION_PREFIX, generation))
    }

    #[inline]
    pub fn new_generation() -> String {
        Uuid::new_v4().to_string()
    }

    /// The live generation, or `None` when the collection was never committed
    #[inline]
    pub fn read_current(&self) -> Result<Option<String>> {
        let pointer = self.pointer_path();
        if !pointer.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&pointer).map_err(|e| {
            RagError::StorageIo(format!("Failed to read {}: {}", pointer.display(), e))
        })?;
        let generation = raw.trim();
        if generation.is_empty() {
            return Err(RagError::StorageIo(format!(
                "Generation pointer {} is empty",
                pointer.display()
            )));
        }

        Ok(Some(generation.to_string()))
    }

    /// Wait for the collection lock
    #[inline]
    pub async fn lock(&self) -> Result<CollectionLock> {
        let file = self.open_lock_file()?;
        let path = self.lock_path();
        tokio::task::spawn_blocking(move || {
            file.lock_exclusive().map_err(|e| {
                RagError::StorageIo(format!("Failed to lock {}: {}", path.display(), e))
            })?;
            Ok::<_, RagError>(CollectionLock { file })
        })
        .await
        .map_err(|e| RagError::StorageIo(format!("Lock task failed: {}", e)))?
    }

    /// Take the collection lock only if nobody holds it
    #[inline]
    pub fn try_lock(&self) -> Result<Option<CollectionLock>> {
        let file = self.open_lock_file()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(CollectionLock { file })),
            Err(e) if e.kind() == fs4::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(RagError::StorageIo(format!(
                "Failed to lock {}: {}",
                self.lock_path().display(),
                e
            ))),
        }
    }

    fn open_lock_file(&self) -> Result<File> {
        fs::create_dir_all(&self.root).map_err(|e| {
            RagError::StorageIo(format!(
                "Failed to create collection directory {}: {}",
                self.root.display(),
                e
            ))
        })?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| {
                RagError::StorageIo(format!(
                    "Failed to open lock file {}: {}",
                    self.lock_path().display(),
                    e
                ))
            })
    }

    /// Atomically point the collection at `generation`
    ///
    /// The id is written to a temporary file in the same directory, flushed,
    /// and renamed over `CURRENT`.
    #[inline]
    pub fn commit(&self, generation: &str) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            RagError::StorageIo(format!(
                "Failed to create collection directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        staged.write_all(generation.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(self.pointer_path())
            .map_err(|e| RagError::StorageIo(format!("Failed to swap generation pointer: {}", e)))?;

        debug!(
            "Collection {} now points at generation {}",
            self.root.display(),
            generation
        );
        Ok(())
    }

    /// Delete every generation directory except `live`
    ///
    /// Requires the collection lock so no generation is being written.
    /// Failures are logged and skipped; a leftover directory is only wasted
    /// space.
    #[inline]
    pub fn collect_garbage(&self, _held: &CollectionLock, live: &str) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to scan {} for stale generations: {}", self.root.display(), e);
                return 0;
            }
        };

        let live_dir = format!("{}{}", GENERATION_PREFIX, live);
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(GENERATION_PREFIX) || name == live_dir {
                continue;
            }

            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale generation {}", name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove stale generation {}: {}", name, e),
            }
        }

        removed
    }

    /// Best-effort removal of a generation that never became live
    #[inline]
    pub fn discard(&self, generation: &str) {
        let dir = self.generation_dir(generation);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!("Failed to discard generation {}: {}", dir.display(), e);
            }
        }
    }
}
