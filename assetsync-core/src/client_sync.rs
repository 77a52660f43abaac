//! Client-side invalidation for pushed filesystem events
//!
//! An editor view shows one directory of one project. When a
//! `SERVER_FILE_SYSTEM_EVENTS` batch touches that directory the view throws
//! its listing away and fetches it again with `get_folder`.

use crate::types::{FsEvent, FsEventBatch};

/// Tracks the directory a client currently displays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSync {
    project: Option<String>,
    dir: String,
}

impl ClientSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly displayed directory
    pub fn open(&mut self, project: impl Into<String>, dir: impl Into<String>) {
        self.project = Some(project.into());
        self.dir = dir.into();
    }

    pub fn close(&mut self) {
        self.project = None;
        self.dir.clear();
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Does this event invalidate the displayed listing?
    pub fn affects(&self, event: &FsEvent) -> bool {
        match &self.project {
            Some(project) if *project == event.project => {
                event.folder_path == self.dir || event.path == self.dir
            }
            _ => false,
        }
    }

    /// Returns the directory to re-fetch, at most once per batch
    pub fn on_fs_events(&self, batch: &FsEventBatch) -> Option<(&str, &str)> {
        let project = self.project.as_deref()?;
        if batch.events.iter().any(|event| self.affects(event)) {
            Some((project, self.dir.as_str()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FsEventType, FsObjectType};

    fn event(project: &str, path: &str, folder_path: &str) -> FsEvent {
        FsEvent {
            path: path.to_string(),
            folder_path: folder_path.to_string(),
            project: project.to_string(),
            obj_type: Some(FsObjectType::File),
            event_type: FsEventType::Change,
            ext: None,
        }
    }

    #[test]
    fn test_nothing_open_never_refetches() {
        let sync = ClientSync::new();
        let batch = FsEventBatch {
            events: vec![event("Demo", "x.png", "")],
        };
        assert_eq!(sync.on_fs_events(&batch), None);
    }

    #[test]
    fn test_event_in_displayed_dir_refetches_once() {
        let mut sync = ClientSync::new();
        sync.open("Demo", "art");
        let batch = FsEventBatch {
            events: vec![
                event("Demo", "art/a.png", "art"),
                event("Demo", "art/b.png", "art"),
            ],
        };
        assert_eq!(sync.on_fs_events(&batch), Some(("Demo", "art")));
    }

    #[test]
    fn test_other_project_or_dir_is_ignored() {
        let mut sync = ClientSync::new();
        sync.open("Demo", "art");
        let batch = FsEventBatch {
            events: vec![
                event("Other", "art/a.png", "art"),
                event("Demo", "models/m.glb", "models"),
            ],
        };
        assert_eq!(sync.on_fs_events(&batch), None);
    }

    #[test]
    fn test_displayed_dir_itself_changing_refetches() {
        let mut sync = ClientSync::new();
        sync.open("Demo", "art");
        assert!(sync.affects(&event("Demo", "art", "")));
    }
}
