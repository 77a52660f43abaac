//! Persisted last-opened project and directory

use std::io;
use std::path::{Path, PathBuf};

use assetsync_core::{CacheUpdate, ProjectCacheState};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default name of the cache file inside the projects root
pub const DEFAULT_CACHE_FILE: &str = "cache.json";

#[derive(Debug)]
pub struct ProjectCache {
    path: PathBuf,
    state: Mutex<Option<ProjectCacheState>>,
}

impl ProjectCache {
    /// Read the cache file; a missing or unreadable file leaves the state undefined
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<ProjectCacheState>(&content) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("Ignoring corrupt cache file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache file at {:?}", path);
                None
            }
            Err(e) => {
                warn!("Failed to read cache file {:?}: {}", path, e);
                None
            }
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last known state, if any was ever read or written
    pub async fn state(&self) -> Option<ProjectCacheState> {
        self.state.lock().await.clone()
    }

    /// Merge `update` into the last known state and rewrite the file
    pub async fn write_cache(&self, update: CacheUpdate) -> io::Result<ProjectCacheState> {
        let mut state = self.state.lock().await;
        let merged = state.clone().unwrap_or_default().merge(&update);

        let json = serde_json::to_string_pretty(&merged)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        *state = Some(merged.clone());
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_undefined() {
        let dir = TempDir::new().unwrap();
        let cache = ProjectCache::load(dir.path().join(DEFAULT_CACHE_FILE)).await;
        assert_eq!(cache.state().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_undefined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(ProjectCache::load(&path).await.state().await, None);
    }

    #[tokio::test]
    async fn test_partial_updates_merge_and_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        let cache = ProjectCache::load(&path).await;

        cache
            .write_cache(CacheUpdate {
                current_project: Some("Demo".to_string()),
                current_dir: Some(String::new()),
            })
            .await
            .unwrap();
        let state = cache
            .write_cache(CacheUpdate {
                current_project: None,
                current_dir: Some("art".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(state.current_project.as_deref(), Some("Demo"));
        assert_eq!(state.current_dir, "art");

        let reloaded = ProjectCache::load(&path).await;
        assert_eq!(reloaded.state().await, Some(state));
    }

    #[tokio::test]
    async fn test_concurrent_writes_do_not_lose_fields() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ProjectCache::load(dir.path().join(DEFAULT_CACHE_FILE)).await);

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .write_cache(CacheUpdate {
                        current_project: Some("Demo".to_string()),
                        current_dir: None,
                    })
                    .await
            })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .write_cache(CacheUpdate {
                        current_project: None,
                        current_dir: Some("art".to_string()),
                    })
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let state = cache.state().await.unwrap();
        assert_eq!(state.current_project.as_deref(), Some("Demo"));
        assert_eq!(state.current_dir, "art");
    }
}
