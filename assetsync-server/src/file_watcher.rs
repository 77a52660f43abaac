//! Filesystem watcher for pushed change notifications
//!
//! Watches the whole projects root, turns raw OS notifications into
//! [`FsEvent`]s relative to each project's asset root, and broadcasts them to
//! every connected client in timer-driven batches.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use assetsync_core::{
    file_extension, parent_asset_path, path_to_string, FsEvent, FsEventBatch, FsEventType,
    FsObjectType, WsEnvelope, FS_EVENTS_MESSAGE,
};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clients::ClientRegistry;

/// Map a raw notification kind to an event type; `None` means ignore
pub fn classify(kind: &EventKind) -> Option<FsEventType> {
    match kind {
        EventKind::Create(_) => Some(FsEventType::Rename),
        EventKind::Remove(_) => Some(FsEventType::Remove),
        EventKind::Modify(modify_kind) => match modify_kind {
            ModifyKind::Name(_) => Some(FsEventType::Rename),
            // Permission and timestamp changes are not interesting to editors
            ModifyKind::Metadata(_) => None,
            _ => Some(FsEventType::Change),
        },
        EventKind::Any => Some(FsEventType::Change),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

/// Build the event for a path below `root`.
///
/// Only paths strictly inside `<root>/<project>/<assets_dir>` produce an
/// event. `obj_type` is `None` when the path no longer exists, which also
/// forces the event type to `remove`.
pub fn normalize_event(
    root: &Path,
    assets_dir: &str,
    path: &Path,
    event_type: FsEventType,
    obj_type: Option<FsObjectType>,
) -> Option<FsEvent> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = rel.components();

    let project = match components.next()? {
        Component::Normal(name) => name.to_string_lossy().to_string(),
        _ => return None,
    };
    match components.next()? {
        Component::Normal(dir) if dir.to_str() == Some(assets_dir) => {}
        _ => return None,
    }

    let asset_path = path_to_string(components.as_path());
    if asset_path.is_empty() {
        return None;
    }

    let event_type = if obj_type.is_none() {
        FsEventType::Remove
    } else {
        event_type
    };
    let ext = match obj_type {
        Some(FsObjectType::Folder) => None,
        _ => asset_path
            .rsplit('/')
            .next()
            .and_then(file_extension),
    };

    Some(FsEvent {
        folder_path: parent_asset_path(&asset_path),
        path: asset_path,
        project,
        obj_type,
        event_type,
        ext,
    })
}

fn stat_object_type(path: &Path) -> Option<FsObjectType> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(if metadata.is_dir() {
        FsObjectType::Folder
    } else {
        FsObjectType::File
    })
}

/// Buffer of events waiting for the next flush.
///
/// A new event is dropped when it describes the same change as the most
/// recently buffered one. Only that single last event is compared.
#[derive(Debug, Default)]
pub struct EventBatcher {
    buffer: Vec<FsEvent>,
}

impl EventBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an event; false if it was dropped as a duplicate
    pub fn push(&mut self, event: FsEvent) -> bool {
        if let Some(last) = self.buffer.last() {
            if last.same_change(&event) {
                return false;
            }
        }
        self.buffer.push(event);
        true
    }

    /// Take everything buffered, or `None` if there is nothing to send
    pub fn flush(&mut self) -> Option<Vec<FsEvent>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Start watching `root` and broadcasting batches every `interval`
pub async fn start_fs_watcher(
    root: PathBuf,
    assets_dir: String,
    interval: Duration,
    clients: Arc<ClientRegistry>,
) -> anyhow::Result<JoinHandle<()>> {
    // Backends such as FSEvents report canonical absolute paths
    let root = tokio::fs::canonicalize(&root)
        .await
        .with_context(|| format!("Failed to resolve watch root {:?}", root))?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => tracing::warn!("Watch error: {}", e),
        },
        Config::default().with_poll_interval(Duration::from_millis(500)),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", root))?;

    tracing::info!("File watcher active for: {:?}", root);

    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::task::spawn_blocking(move || {
        // The watcher stops when this thread drops it
        let _watcher = watcher;

        loop {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(event) => {
                    let Some(event_type) = classify(&event.kind) else {
                        continue;
                    };
                    for path in &event.paths {
                        let obj_type = stat_object_type(path);
                        let Some(fs_event) =
                            normalize_event(&root, &assets_dir, path, event_type, obj_type)
                        else {
                            continue;
                        };
                        tracing::debug!("{:?} {}/{}", fs_event.event_type, fs_event.project, fs_event.path);
                        if event_tx.send(fs_event).is_err() {
                            tracing::info!("Event batcher stopped, closing file watcher");
                            return;
                        }
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if event_tx.is_closed() {
                        tracing::info!("Event batcher stopped, closing file watcher");
                        return;
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    tracing::info!("File watcher channel closed");
                    return;
                }
            }
        }
    });

    Ok(tokio::spawn(run_batcher(event_rx, interval, clients)))
}

/// Own the buffer and the ticker; flush the buffer on every tick
pub async fn run_batcher(
    mut rx: mpsc::UnboundedReceiver<FsEvent>,
    interval: Duration,
    clients: Arc<ClientRegistry>,
) {
    let mut batcher = EventBatcher::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    batcher.push(event);
                }
                None => {
                    flush(&mut batcher, &clients).await;
                    break;
                }
            },
            _ = ticker.tick() => flush(&mut batcher, &clients).await,
        }
    }
}

async fn flush(batcher: &mut EventBatcher, clients: &ClientRegistry) {
    let Some(events) = batcher.flush() else {
        return;
    };
    let count = events.len();
    let envelope = WsEnvelope::new(FS_EVENTS_MESSAGE, FsEventBatch { events });
    match clients.broadcast_message(&envelope).await {
        Ok(delivered) => {
            tracing::debug!("Broadcast {} fs events to {} clients", count, delivered)
        }
        Err(e) => tracing::warn!("Failed to serialize fs events: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::OutboundMessage;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    fn root() -> PathBuf {
        PathBuf::from("/projects")
    }

    fn event(path: &str, event_type: FsEventType) -> FsEvent {
        normalize_event(
            &root(),
            "public",
            &root().join(path),
            event_type,
            Some(FsObjectType::File),
        )
        .unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File)),
            Some(FsEventType::Rename)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(FsEventType::Rename)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(FsEventType::Change)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::Any)),
            Some(FsEventType::Remove)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            None
        );
    }

    #[test]
    fn test_normalize_file_event() {
        let ev = normalize_event(
            &root(),
            "public",
            &root().join("Demo/public/art/x.png"),
            FsEventType::Change,
            Some(FsObjectType::File),
        )
        .unwrap();
        assert_eq!(ev.project, "Demo");
        assert_eq!(ev.path, "art/x.png");
        assert_eq!(ev.folder_path, "art");
        assert_eq!(ev.ext.as_deref(), Some("png"));
        assert_eq!(ev.event_type, FsEventType::Change);
    }

    #[test]
    fn test_missing_path_becomes_remove() {
        let ev = normalize_event(
            &root(),
            "public",
            &root().join("Demo/public/old.png"),
            FsEventType::Rename,
            None,
        )
        .unwrap();
        assert_eq!(ev.event_type, FsEventType::Remove);
        assert_eq!(ev.obj_type, None);
        assert_eq!(ev.folder_path, "");

        let json = serde_json::to_value(&ev).unwrap();
        assert!(json["obj_type"].is_null());
        assert_eq!(json["event_type"], "remove");
    }

    #[test]
    fn test_folders_have_no_extension() {
        let ev = normalize_event(
            &root(),
            "public",
            &root().join("Demo/public/v1.0"),
            FsEventType::Rename,
            Some(FsObjectType::Folder),
        )
        .unwrap();
        assert_eq!(ev.ext, None);
    }

    #[test]
    fn test_paths_outside_asset_roots_are_ignored() {
        for path in [
            "cache.json",
            "Demo",
            "Demo/metadata.json",
            "Demo/public",
            "Demo/private/x.png",
        ] {
            assert_eq!(
                normalize_event(
                    &root(),
                    "public",
                    &root().join(path),
                    FsEventType::Change,
                    Some(FsObjectType::File),
                ),
                None,
                "{} should be ignored",
                path
            );
        }
        assert_eq!(
            normalize_event(
                &root(),
                "public",
                Path::new("/elsewhere/Demo/public/x.png"),
                FsEventType::Change,
                Some(FsObjectType::File),
            ),
            None
        );
    }

    #[test]
    fn test_batcher_drops_back_to_back_duplicates_only() {
        let mut batcher = EventBatcher::new();
        assert!(batcher.flush().is_none());

        assert!(batcher.push(event("Demo/public/a.png", FsEventType::Change)));
        assert!(!batcher.push(event("Demo/public/a.png", FsEventType::Change)));
        assert!(batcher.push(event("Demo/public/b.png", FsEventType::Change)));
        // Not adjacent to the first one any more
        assert!(batcher.push(event("Demo/public/a.png", FsEventType::Change)));
        assert_eq!(batcher.len(), 3);

        assert_eq!(batcher.flush().unwrap().len(), 3);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_run_batcher_broadcasts_one_message_per_tick() {
        let clients = Arc::new(ClientRegistry::new());
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        clients.add("client", client_tx).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_batcher(rx, Duration::from_millis(50), clients.clone()));

        tx.send(event("Demo/public/a.png", FsEventType::Change)).unwrap();
        tx.send(event("Demo/public/a.png", FsEventType::Change)).unwrap();
        tx.send(event("Demo/public/b.png", FsEventType::Rename)).unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(2), client_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let OutboundMessage::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let envelope: WsEnvelope<FsEventBatch> = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope.id, FS_EVENTS_MESSAGE);
        assert_eq!(envelope.message.events.len(), 2);
        assert_eq!(envelope.message.events[1].path, "b.png");

        drop(tx);
        task.await.unwrap();
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watcher_reports_writes_under_relative_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Demo/public")).unwrap();

        let clients = Arc::new(ClientRegistry::new());
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        clients.add("client", client_tx).await;

        // Not canonical: events must still resolve against it
        let root = dir.path().join("Demo").join("..");
        let task = start_fs_watcher(root, "public".to_string(), Duration::from_millis(50), clients)
            .await
            .unwrap();

        std::fs::write(dir.path().join("Demo/public/x.png"), b"png").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let Some(OutboundMessage::Text(text)) = client_rx.recv().await else {
                    panic!("client queue closed");
                };
                let envelope: WsEnvelope<FsEventBatch> = serde_json::from_str(&text).unwrap();
                assert_eq!(envelope.id, FS_EVENTS_MESSAGE);
                if envelope.message.events.iter().any(|e| e.path == "x.png") {
                    return envelope.message;
                }
            }
        })
        .await
        .unwrap();

        let event = batch.events.iter().find(|e| e.path == "x.png").unwrap();
        assert_eq!(event.project, "Demo");
        assert_eq!(event.folder_path, "");
        assert_eq!(event.ext.as_deref(), Some("png"));
        task.abort();
    }
}
