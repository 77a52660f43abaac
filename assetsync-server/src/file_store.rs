//! Filesystem access for projects and their assets
//!
//! Layout under the projects root:
//!
//! ```text
//! <root>/<project>/<assets dir>/...   user-facing assets
//! <root>/<project>/<metadata file>    per-path metadata side-table
//! ```

use std::io;
use std::path::{Path, PathBuf};

use assetsync_core::{join_asset_path, relative_path, FsObject};
use tokio::fs;

/// Default name of the asset root inside a project directory
pub const DEFAULT_ASSETS_DIR: &str = "public";

/// Default name of the metadata side-table inside a project directory
pub const DEFAULT_METADATA_FILE: &str = "metadata.json";

/// URL prefix assets are served under
pub const ASSETS_URL: &str = "/assets";

/// Stateless helper translating project paths to disk paths
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    assets_dir: String,
    metadata_file: String,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_layout(root, DEFAULT_ASSETS_DIR, DEFAULT_METADATA_FILE)
    }

    pub fn with_layout(
        root: impl Into<PathBuf>,
        assets_dir: impl Into<String>,
        metadata_file: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            assets_dir: assets_dir.into(),
            metadata_file: metadata_file.into(),
        }
    }

    /// Directory holding every project
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir_name(&self) -> &str {
        &self.assets_dir
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    pub fn assets_root(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(&self.assets_dir)
    }

    /// Disk path of an asset; `None` if the asset path escapes the asset root
    pub fn asset_path(&self, project: &str, asset_path: &str) -> Option<PathBuf> {
        join_asset_path(&self.assets_root(project), asset_path)
    }

    pub fn metadata_path(&self, project: &str) -> PathBuf {
        self.project_dir(project).join(&self.metadata_file)
    }

    /// Browser-fetchable URL of an asset
    pub fn asset_url(&self, asset_path: &str) -> String {
        format!("{}/{}", ASSETS_URL, asset_path.trim_start_matches('/'))
    }

    /// A project exists when its asset root is a directory
    pub async fn project_exists(&self, project: &str) -> bool {
        is_folder(&self.assets_root(project)).await
    }

    /// Names of all top-level directories that hold an asset root
    pub async fn list_projects(&self) -> io::Result<Vec<String>> {
        let mut projects = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_folder(&entry.path().join(&self.assets_dir)).await {
                projects.push(name);
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Create a project directory and its asset root
    pub async fn create_project(&self, project: &str) -> io::Result<()> {
        fs::create_dir_all(self.assets_root(project)).await
    }

    /// List the entries of `dir`.
    ///
    /// Paths are relative to `root` (or to `dir` when no root is given) and
    /// always '/'-separated. With `recursive` every descendant is returned in
    /// one flat list.
    pub async fn read_dir_assets(
        &self,
        dir: &Path,
        root: Option<&Path>,
        recursive: bool,
    ) -> io::Result<Vec<FsObject>> {
        let root = root.unwrap_or(dir);
        let mut list = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let item_path = entry.path();
                // Entries can vanish between read_dir and stat
                let metadata = match fs::metadata(&item_path).await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!("Skipping {:?}: {}", item_path, e);
                        continue;
                    }
                };

                let name = entry.file_name().to_string_lossy().to_string();
                let rel_path = relative_path(root, &item_path).unwrap_or_else(|| name.clone());

                if metadata.is_dir() {
                    let num_files = get_files_amount(&item_path).await.unwrap_or(0);
                    list.push(FsObject::folder(name, rel_path, metadata.len(), num_files));
                    if recursive {
                        pending.push(item_path);
                    }
                } else {
                    let src = self.asset_url(&rel_path);
                    list.push(FsObject::file(name, rel_path, metadata.len(), src));
                }
            }
        }

        list.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(list)
    }

    pub async fn mk_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path).await
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(from, to).await
    }

    /// Copy a file, or a folder with everything below it
    pub async fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if !is_folder(from).await {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(from, to).await?;
            return Ok(());
        }

        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src_dir, dst_dir)) = pending.pop() {
            fs::create_dir_all(&dst_dir).await?;
            let mut entries = fs::read_dir(&src_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let src = entry.path();
                let dst = dst_dir.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push((src, dst));
                } else {
                    fs::copy(&src, &dst).await?;
                }
            }
        }
        Ok(())
    }

    /// Recursively remove a path; a missing path is not an error
    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

pub async fn is_folder(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Number of direct children of a directory
pub async fn get_files_amount(dir: &Path) -> io::Result<usize> {
    let mut entries = fs::read_dir(dir).await?;
    let mut count = 0;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetsync_core::FsObjectType;
    use tempfile::TempDir;

    fn store_with_project(name: &str) -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        std::fs::create_dir_all(store.assets_root(name)).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_list_projects_requires_asset_root() {
        let (dir, store) = store_with_project("Demo");
        std::fs::create_dir_all(dir.path().join("NotAProject")).unwrap();
        std::fs::write(dir.path().join("cache.json"), "{}").unwrap();

        assert_eq!(store.list_projects().await.unwrap(), vec!["Demo".to_string()]);
    }

    #[tokio::test]
    async fn test_read_dir_assets_flat() {
        let (_dir, store) = store_with_project("Demo");
        let root = store.assets_root("Demo");
        std::fs::create_dir_all(root.join("art").join("sprites")).unwrap();
        std::fs::write(root.join("art").join("x.png"), b"png").unwrap();
        std::fs::write(root.join("readme.txt"), b"hello").unwrap();

        let list = store.read_dir_assets(&root, Some(&root), false).await.unwrap();
        assert_eq!(list.len(), 2);

        let art = &list[0];
        assert_eq!(art.name, "art");
        assert_eq!(art.kind, FsObjectType::Folder);
        assert_eq!(art.num_files, Some(2));
        assert_eq!(art.ext, None);

        let readme = &list[1];
        assert_eq!(readme.path, "readme.txt");
        assert_eq!(readme.size, 5);
        assert_eq!(readme.ext.as_deref(), Some("txt"));
        assert_eq!(readme.src.as_deref(), Some("/assets/readme.txt"));
    }

    #[tokio::test]
    async fn test_read_dir_assets_recursive_is_flat_and_root_relative() {
        let (_dir, store) = store_with_project("Demo");
        let root = store.assets_root("Demo");
        std::fs::create_dir_all(root.join("art").join("sprites")).unwrap();
        std::fs::write(root.join("art").join("sprites").join("hero.png"), b"png").unwrap();

        let list = store.read_dir_assets(&root, Some(&root), true).await.unwrap();
        let paths: Vec<_> = list.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(paths, vec!["art", "art/sprites", "art/sprites/hero.png"]);
        assert_eq!(list[2].src.as_deref(), Some("/assets/art/sprites/hero.png"));

        // Listing a subfolder keeps paths relative to the asset root
        let sub = store
            .read_dir_assets(&root.join("art"), Some(&root), false)
            .await
            .unwrap();
        assert_eq!(sub[0].path, "art/sprites");
    }

    #[tokio::test]
    async fn test_copy_folder_recursively() {
        let (_dir, store) = store_with_project("Demo");
        let root = store.assets_root("Demo");
        std::fs::create_dir_all(root.join("art").join("sprites")).unwrap();
        std::fs::write(root.join("art").join("sprites").join("hero.png"), b"png").unwrap();

        store.copy(&root.join("art"), &root.join("art-copy")).await.unwrap();
        assert_eq!(
            std::fs::read(root.join("art-copy").join("sprites").join("hero.png")).unwrap(),
            b"png"
        );
        assert!(root.join("art").join("sprites").join("hero.png").exists());
    }

    #[tokio::test]
    async fn test_remove_is_recursive_and_tolerant() {
        let (_dir, store) = store_with_project("Demo");
        let root = store.assets_root("Demo");
        std::fs::create_dir_all(root.join("art").join("sprites")).unwrap();
        std::fs::write(root.join("art").join("sprites").join("hero.png"), b"png").unwrap();

        store.remove(&root.join("art")).await.unwrap();
        assert!(!root.join("art").exists());
        store.remove(&root.join("missing")).await.unwrap();
    }

    #[test]
    fn test_asset_path_stays_inside_asset_root() {
        let store = FileStore::new("/projects");
        assert_eq!(
            store.asset_path("Demo", "art/x.png"),
            Some(PathBuf::from("/projects/Demo/public/art/x.png"))
        );
        assert_eq!(store.asset_path("Demo", "../metadata.json"), None);
        assert_eq!(store.metadata_path("Demo"), PathBuf::from("/projects/Demo/metadata.json"));
    }
}
