//! Per-path write serialization
//!
//! Two writes to the same file never interleave. Writes to different files
//! proceed concurrently.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct WriteQueue {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `path`
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Only the map holds idle locks
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Write `contents` to `path`, creating parent directories as needed
    pub async fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
        let _guard = self.lock(path).await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }

    /// Number of paths with a pending or running write
    pub fn pending(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.values().filter(|l| Arc::strong_count(l) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let queue = WriteQueue::new();
        let path = dir.path().join("a").join("b.json");

        queue.write(&path, "{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_same_path_writes_are_serialized() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(WriteQueue::new());
        let path = dir.path().join("data.json");

        let guard = queue.lock(&path).await;
        let q = queue.clone();
        let p = path.clone();
        let writer = tokio::spawn(async move { q.write(&p, "second").await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!path.exists());
        std::fs::write(&path, "first").unwrap();
        drop(guard);

        writer.await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
