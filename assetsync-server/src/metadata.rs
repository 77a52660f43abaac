//! Per-path metadata side-table
//!
//! One JSON object per project maps asset paths to free-form metadata
//! objects. A missing file reads as an empty table.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetsync_core::is_same_or_descendant;
use serde_json::{Map, Value};

use crate::file_store::FileStore;
use crate::write_queue::WriteQueue;

pub type MetadataTable = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct MetadataStore {
    store: FileStore,
    writes: Arc<WriteQueue>,
}

impl MetadataStore {
    pub fn new(store: FileStore, writes: Arc<WriteQueue>) -> Self {
        Self { store, writes }
    }

    fn table_path(&self, project: &str) -> PathBuf {
        self.store.metadata_path(project)
    }

    pub async fn read_all(&self, project: &str) -> io::Result<MetadataTable> {
        read_table(&self.table_path(project)).await
    }

    /// Metadata of one path, if any was saved
    pub async fn read(&self, project: &str, path: &str) -> io::Result<Option<Value>> {
        Ok(self.read_all(project).await?.remove(path))
    }

    /// Shallow-merge `fields` into the metadata of `path`
    pub async fn write(
        &self,
        project: &str,
        path: &str,
        fields: Map<String, Value>,
    ) -> io::Result<Value> {
        let file = self.table_path(project);
        let _guard = self.writes.lock(&file).await;
        let mut table = read_table(&file).await?;

        let entry = table
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(existing) = entry {
            existing.extend(fields);
        }
        let merged = entry.clone();

        write_table(&file, &table).await?;
        Ok(merged)
    }

    /// Drop the metadata of exactly `path`
    pub async fn remove(&self, project: &str, path: &str) -> io::Result<bool> {
        let file = self.table_path(project);
        let _guard = self.writes.lock(&file).await;
        let mut table = read_table(&file).await?;

        let removed = table.remove(path).is_some();
        if removed {
            write_table(&file, &table).await?;
        }
        Ok(removed)
    }

    /// Drop the metadata of `path` and everything below it
    pub async fn clear(&self, project: &str, path: &str) -> io::Result<usize> {
        let file = self.table_path(project);
        let _guard = self.writes.lock(&file).await;
        let mut table = read_table(&file).await?;

        let before = table.len();
        table.retain(|key, _| !is_same_or_descendant(key, path));
        let removed = before - table.len();
        if removed > 0 {
            write_table(&file, &table).await?;
        }
        Ok(removed)
    }

    /// Move (or duplicate, with `keep_original`) the metadata of `from` and
    /// its descendants to `to`
    pub async fn rekey(
        &self,
        project: &str,
        from: &str,
        to: &str,
        keep_original: bool,
    ) -> io::Result<usize> {
        let file = self.table_path(project);
        let _guard = self.writes.lock(&file).await;
        let mut table = read_table(&file).await?;

        let affected: Vec<String> = table
            .keys()
            .filter(|key| is_same_or_descendant(key, from))
            .cloned()
            .collect();
        if affected.is_empty() {
            return Ok(0);
        }

        for key in &affected {
            let value = if keep_original {
                table.get(key).cloned()
            } else {
                table.remove(key)
            };
            if let (Some(value), Some(rest)) = (value, key.strip_prefix(from)) {
                table.insert(format!("{}{}", to, rest), value);
            }
        }

        write_table(&file, &table).await?;
        Ok(affected.len())
    }
}

async fn read_table(path: &Path) -> io::Result<MetadataTable> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Map::new()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e),
    }
}

async fn write_table(path: &Path, table: &MetadataTable) -> io::Result<()> {
    let json = serde_json::to_string_pretty(table)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn metadata_store() -> (TempDir, MetadataStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::create_dir_all(store.assets_root("Demo")).unwrap();
        (dir, MetadataStore::new(store, Arc::new(WriteQueue::new())))
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_missing_table_is_empty() {
        let (_dir, meta) = metadata_store();
        assert!(meta.read_all("Demo").await.unwrap().is_empty());
        assert_eq!(meta.read("Demo", "x.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_merges_shallowly() {
        let (_dir, meta) = metadata_store();
        meta.write("Demo", "x.png", object(json!({"a": 1, "nested": {"k": 1}})))
            .await
            .unwrap();
        let merged = meta
            .write("Demo", "x.png", object(json!({"b": 2, "nested": {"j": 2}})))
            .await
            .unwrap();

        assert_eq!(merged, json!({"a": 1, "b": 2, "nested": {"j": 2}}));
        assert_eq!(meta.read("Demo", "x.png").await.unwrap(), Some(merged));
    }

    #[tokio::test]
    async fn test_rekey_moves_descendants() {
        let (_dir, meta) = metadata_store();
        meta.write("Demo", "art", object(json!({"tag": "dir"}))).await.unwrap();
        meta.write("Demo", "art/x.png", object(json!({"a": 1}))).await.unwrap();
        meta.write("Demo", "artwork.png", object(json!({"a": 2}))).await.unwrap();

        let moved = meta.rekey("Demo", "art", "gfx", false).await.unwrap();
        assert_eq!(moved, 2);

        let table = meta.read_all("Demo").await.unwrap();
        assert!(table.contains_key("gfx"));
        assert!(table.contains_key("gfx/x.png"));
        assert!(table.contains_key("artwork.png"));
        assert!(!table.contains_key("art/x.png"));
    }

    #[tokio::test]
    async fn test_rekey_keep_original_duplicates() {
        let (_dir, meta) = metadata_store();
        meta.write("Demo", "x.png", object(json!({"a": 1}))).await.unwrap();

        meta.rekey("Demo", "x.png", "y.png", true).await.unwrap();
        let table = meta.read_all("Demo").await.unwrap();
        assert_eq!(table.get("x.png"), table.get("y.png"));
    }

    #[tokio::test]
    async fn test_remove_keeps_descendants() {
        let (_dir, meta) = metadata_store();
        meta.write("Demo", "art", object(json!({"a": 1}))).await.unwrap();
        meta.write("Demo", "art/x.png", object(json!({"a": 1}))).await.unwrap();

        assert!(meta.remove("Demo", "art").await.unwrap());
        assert!(!meta.remove("Demo", "art").await.unwrap());
        assert!(meta.read("Demo", "art/x.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_subtree() {
        let (_dir, meta) = metadata_store();
        meta.write("Demo", "art", object(json!({"a": 1}))).await.unwrap();
        meta.write("Demo", "art/x.png", object(json!({"a": 1}))).await.unwrap();
        meta.write("Demo", "other.png", object(json!({"a": 1}))).await.unwrap();

        assert_eq!(meta.clear("Demo", "art").await.unwrap(), 2);
        let table = meta.read_all("Demo").await.unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key("other.png"));
    }
}
