//! Navigation state: what a client has open and what was opened last

use serde::{Deserialize, Serialize};

/// Scene file currently open in an editor view
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SceneInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The project, directory and scene a command runs against
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectContext {
    pub project: Option<String>,

    /// Asset-root-relative directory, `""` is the asset root
    #[serde(default)]
    pub dir: String,

    #[serde(default)]
    pub scene: SceneInfo,
}

impl ProjectContext {
    /// Context seeded from the last persisted cache state
    pub fn from_cache(state: &ProjectCacheState) -> Self {
        Self {
            project: state.current_project.clone(),
            dir: state.current_dir.clone(),
            scene: SceneInfo::default(),
        }
    }

    pub fn is_loaded(&self, project: &str) -> bool {
        self.project.as_deref() == Some(project)
    }
}

/// Last-opened project and directory, persisted across restarts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectCacheState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_project: Option<String>,

    #[serde(default)]
    pub current_dir: String,
}

/// Partial cache update; `None` fields keep their previous value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheUpdate {
    pub current_project: Option<String>,
    pub current_dir: Option<String>,
}

impl ProjectCacheState {
    /// Apply a partial update on top of this state
    pub fn merge(&self, update: &CacheUpdate) -> Self {
        Self {
            current_project: update
                .current_project
                .clone()
                .or_else(|| self.current_project.clone()),
            current_dir: update
                .current_dir
                .clone()
                .unwrap_or_else(|| self.current_dir.clone()),
        }
    }
}
