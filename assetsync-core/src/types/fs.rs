//! Filesystem listing entries and change notifications
//!
//! Both types travel to editor clients as JSON and are computed fresh per
//! request or per OS notification.

use serde::{Deserialize, Serialize};

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FsObjectType {
    File,
    Folder,
}

/// One entry of a directory listing.
///
/// `ext` and `src` are only present on files, `num_files` only on folders.
/// Use [`FsObject::file`] and [`FsObject::folder`] to keep that invariant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsObject {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FsObjectType,

    pub size: u64,

    /// Path relative to the listing root, always '/'-separated
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    /// Number of direct children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_files: Option<usize>,

    /// URL the browser can fetch the file from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl FsObject {
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64, src: impl Into<String>) -> Self {
        let name = name.into();
        let ext = crate::path_utils::file_extension(&name);
        Self {
            name,
            kind: FsObjectType::File,
            size,
            path: path.into(),
            ext: Some(ext.unwrap_or_default()),
            num_files: None,
            src: Some(src.into()),
        }
    }

    pub fn folder(name: impl Into<String>, path: impl Into<String>, size: u64, num_files: usize) -> Self {
        Self {
            name: name.into(),
            kind: FsObjectType::Folder,
            size,
            path: path.into(),
            ext: None,
            num_files: Some(num_files),
            src: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FsObjectType::Folder
    }
}

/// What happened to a path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FsEventType {
    /// Content or attributes changed
    Change,
    /// Created, renamed or moved
    Rename,
    /// No longer on disk
    Remove,
}

/// One normalized mutation relative to a project's asset root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsEvent {
    pub path: String,
    pub folder_path: String,
    pub project: String,

    /// `null` when the path no longer exists
    pub obj_type: Option<FsObjectType>,

    pub event_type: FsEventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
}

impl FsEvent {
    /// True when both events describe the same change to the same path.
    ///
    /// The project is deliberately not compared.
    pub fn same_change(&self, other: &FsEvent) -> bool {
        self.event_type == other.event_type
            && self.ext == other.ext
            && self.folder_path == other.folder_path
            && self.path == other.path
            && self.obj_type == other.obj_type
    }
}

/// Payload of the `SERVER_FILE_SYSTEM_EVENTS` push message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsEventBatch {
    pub events: Vec<FsEvent>,
}
