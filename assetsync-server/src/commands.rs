//! Command validation and dispatch
//!
//! `POST /api/<cmd>` bodies are parsed into [`CommandParams`], validated into
//! a typed [`Command`] and executed against the caller's [`ProjectContext`].
//! Preconditions are checked in a fixed order:
//!
//! 1. the command id is known
//! 2. the params name a project (except `get_projects`/`get_loaded_project`)
//! 3. `new_project` targets a project that does not exist yet
//! 4. every other command targets a project that exists
//! 5. the asset path a command operates on exists
//! 6. new names are present and a single path segment

use std::path::PathBuf;
use std::sync::Arc;

use assetsync_core::{
    is_same_or_descendant, is_single_segment, join_asset, normalize_path, parent_asset_path,
    BaseResp, CacheUpdate, CommandId, CommandParams, ErrorCode, ProjectContext, SceneInfo,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::{CommandError, ErrorKind};
use crate::file_store::{exists, is_folder, FileStore};
use crate::metadata::MetadataStore;
use crate::project_cache::ProjectCache;
use crate::write_queue::WriteQueue;

/// Destination of a rename: a full asset path or a new sibling name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameTarget {
    Path(String),
    Name(String),
}

/// A validated command with the params it needs
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetLoadedProject,
    GetProjects,
    NewProject { project: String },
    LoadProject { project: String },
    NewFolder { project: String, path: String, name: String },
    GetFolder { project: String, path: String },
    Rename { project: String, path: String, target: RenameTarget },
    Copy { project: String, path: String, new_path: String },
    Move { project: String, path: String, new_path: String },
    Delete { project: String, path: String },
    SaveData { project: String, path: String, data: Value },
    GetData { project: String, path: String },
    SaveInfo { project: String, path: String, data: Value },
    GetInfo { project: String, path: Option<String> },
    DelInfo { project: String, path: String },
    SetCurrentScene { project: String, path: String },
}

impl Command {
    /// Build a command from raw params, checking presence and shape only
    pub fn from_params(id: CommandId, params: CommandParams) -> Result<Self, CommandError> {
        let CommandParams {
            project,
            path,
            new_path,
            name,
            new_name,
            data,
        } = params;

        if !id.requires_project() {
            return Ok(match id {
                CommandId::GetProjects => Command::GetProjects,
                _ => Command::GetLoadedProject,
            });
        }

        let project = require_project(project)?;
        let command = match id {
            CommandId::GetLoadedProject => Command::GetLoadedProject,
            CommandId::GetProjects => Command::GetProjects,
            CommandId::NewProject => Command::NewProject { project },
            CommandId::LoadProject => Command::LoadProject { project },
            CommandId::NewFolder => Command::NewFolder {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
                name: name.unwrap_or_default(),
            },
            CommandId::GetFolder => Command::GetFolder {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
            },
            CommandId::Rename => {
                let path = require_path(path, ErrorCode::NoPath)?;
                let target = match (new_path, new_name) {
                    (Some(new_path), _) => RenameTarget::Path(clean_asset_path(&new_path)?),
                    (None, Some(new_name)) => RenameTarget::Name(new_name),
                    (None, None) => return Err(CommandError::validation(ErrorCode::NoNewPath)),
                };
                Command::Rename {
                    project,
                    path,
                    target,
                }
            }
            CommandId::Copy => Command::Copy {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
                new_path: require_path(new_path, ErrorCode::NoNewPath)?,
            },
            CommandId::Move => Command::Move {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
                new_path: require_path(new_path, ErrorCode::NoNewPath)?,
            },
            CommandId::Delete => Command::Delete {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
            },
            CommandId::SaveData => Command::SaveData {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
                data: require_data(data)?,
            },
            CommandId::GetData => Command::GetData {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
            },
            CommandId::SaveInfo => Command::SaveInfo {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
                data: require_data(data)?,
            },
            CommandId::GetInfo => Command::GetInfo {
                project,
                path: match path {
                    Some(path) if !path.is_empty() => Some(clean_asset_path(&path)?),
                    _ => None,
                },
            },
            CommandId::DelInfo => Command::DelInfo {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
            },
            CommandId::SetCurrentScene => Command::SetCurrentScene {
                project,
                path: require_path(path, ErrorCode::NoPath)?,
            },
        };
        Ok(command)
    }

    pub fn id(&self) -> CommandId {
        match self {
            Command::GetLoadedProject => CommandId::GetLoadedProject,
            Command::GetProjects => CommandId::GetProjects,
            Command::NewProject { .. } => CommandId::NewProject,
            Command::LoadProject { .. } => CommandId::LoadProject,
            Command::NewFolder { .. } => CommandId::NewFolder,
            Command::GetFolder { .. } => CommandId::GetFolder,
            Command::Rename { .. } => CommandId::Rename,
            Command::Copy { .. } => CommandId::Copy,
            Command::Move { .. } => CommandId::Move,
            Command::Delete { .. } => CommandId::Delete,
            Command::SaveData { .. } => CommandId::SaveData,
            Command::GetData { .. } => CommandId::GetData,
            Command::SaveInfo { .. } => CommandId::SaveInfo,
            Command::GetInfo { .. } => CommandId::GetInfo,
            Command::DelInfo { .. } => CommandId::DelInfo,
            Command::SetCurrentScene { .. } => CommandId::SetCurrentScene,
        }
    }

    /// Project the command targets, if it is project-scoped
    pub fn project(&self) -> Option<&str> {
        match self {
            Command::GetLoadedProject | Command::GetProjects => None,
            Command::NewProject { project }
            | Command::LoadProject { project }
            | Command::NewFolder { project, .. }
            | Command::GetFolder { project, .. }
            | Command::Rename { project, .. }
            | Command::Copy { project, .. }
            | Command::Move { project, .. }
            | Command::Delete { project, .. }
            | Command::SaveData { project, .. }
            | Command::GetData { project, .. }
            | Command::SaveInfo { project, .. }
            | Command::GetInfo { project, .. }
            | Command::DelInfo { project, .. }
            | Command::SetCurrentScene { project, .. } => Some(project),
        }
    }
}

fn require_project(project: Option<String>) -> Result<String, CommandError> {
    let project = project
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CommandError::validation(ErrorCode::NoProjectName))?;
    if !is_single_segment(&project) {
        return Err(CommandError::validation_at(ErrorCode::InvalidName, &project));
    }
    Ok(project)
}

fn require_path(path: Option<String>, missing: ErrorCode) -> Result<String, CommandError> {
    let path = path.ok_or_else(|| CommandError::validation(missing))?;
    clean_asset_path(&path)
}

fn require_data(data: Option<Value>) -> Result<Value, CommandError> {
    match data {
        None | Some(Value::Null) => Err(CommandError::validation(ErrorCode::NoData)),
        Some(data) => Ok(data),
    }
}

/// Canonical '/'-separated form of an asset path; `""` is the asset root.
///
/// Absolute paths and `..` segments are rejected.
pub fn clean_asset_path(raw: &str) -> Result<String, CommandError> {
    let normalized = normalize_path(raw);
    if normalized.starts_with('/') {
        return Err(CommandError::validation_at(ErrorCode::InvalidPath, raw));
    }
    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(CommandError::validation_at(ErrorCode::InvalidPath, raw)),
            part => parts.push(part),
        }
    }
    Ok(parts.join("/"))
}

fn parse_params(body: &[u8]) -> Result<CommandParams, CommandError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CommandParams::default());
    }
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relocation {
    Rename,
    Move,
    Copy,
}

/// Executes commands against the projects root
pub struct CommandRouter {
    store: FileStore,
    metadata: MetadataStore,
    cache: Arc<ProjectCache>,
    writes: Arc<WriteQueue>,
    span: Span,
}

impl CommandRouter {
    pub fn new(
        store: FileStore,
        metadata: MetadataStore,
        cache: Arc<ProjectCache>,
        writes: Arc<WriteQueue>,
        span: Span,
    ) -> Self {
        Self {
            store,
            metadata,
            cache,
            writes,
            span,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn cache(&self) -> &ProjectCache {
        &self.cache
    }

    /// Serialized writer shared with uploads
    pub fn writes(&self) -> &WriteQueue {
        &self.writes
    }

    /// Run one command; failures are folded into the response
    pub async fn dispatch(
        &self,
        ctx: &mut ProjectContext,
        cmd_id: &str,
        body: &[u8],
    ) -> BaseResp<Value> {
        let span = tracing::info_span!(parent: &self.span, "command", cmd = %cmd_id);
        async {
            match self.try_dispatch(ctx, cmd_id, body).await {
                Ok(data) => BaseResp::ok(data),
                Err(e) => {
                    match e.kind() {
                        ErrorKind::Io => warn!("Command failed: {:#}", e),
                        _ => debug!("Command rejected: {}", e),
                    }
                    e.into_resp()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_dispatch(
        &self,
        ctx: &mut ProjectContext,
        cmd_id: &str,
        body: &[u8],
    ) -> Result<Value, CommandError> {
        let id: CommandId = cmd_id
            .parse()
            .map_err(|_| CommandError::not_found_at(ErrorCode::CommandNotFound, cmd_id))?;
        let params = parse_params(body)?;
        let command = Command::from_params(id, params)?;
        self.execute(ctx, command).await
    }

    /// Check project preconditions and run a validated command
    pub async fn execute(
        &self,
        ctx: &mut ProjectContext,
        command: Command,
    ) -> Result<Value, CommandError> {
        if let Some(project) = command.project() {
            let project_exists = self.store.project_exists(project).await;
            if let Command::NewProject { .. } = command {
                if project_exists {
                    return Err(CommandError::conflict_at(
                        ErrorCode::ProjectAlreadyExists,
                        project,
                    ));
                }
            } else if !project_exists {
                return Err(CommandError::not_found_at(ErrorCode::ProjectNotFound, project));
            }
        }

        match command {
            Command::GetLoadedProject => Ok(serde_json::to_value(&*ctx)?),
            Command::GetProjects => self.get_projects().await,
            Command::NewProject { project } => self.new_project(&project).await,
            Command::LoadProject { project } => self.load_project(ctx, &project).await,
            Command::NewFolder {
                project,
                path,
                name,
            } => self.new_folder(&project, &path, &name).await,
            Command::GetFolder { project, path } => self.get_folder(ctx, &project, &path).await,
            Command::Rename {
                project,
                path,
                target,
            } => self.rename(&project, &path, target).await,
            Command::Copy {
                project,
                path,
                new_path,
            } => {
                let from = self.source(&project, &path).await?;
                self.relocate(&project, &path, from, &new_path, Relocation::Copy)
                    .await
            }
            Command::Move {
                project,
                path,
                new_path,
            } => {
                let from = self.source(&project, &path).await?;
                self.relocate(&project, &path, from, &new_path, Relocation::Move)
                    .await
            }
            Command::Delete { project, path } => self.delete(&project, &path).await,
            Command::SaveData {
                project,
                path,
                data,
            } => self.save_data(&project, &path, data).await,
            Command::GetData { project, path } => self.get_data(&project, &path).await,
            Command::SaveInfo {
                project,
                path,
                data,
            } => self.save_info(&project, &path, data).await,
            Command::GetInfo { project, path } => self.get_info(&project, path.as_deref()).await,
            Command::DelInfo { project, path } => {
                self.metadata
                    .remove(&project, &path)
                    .await
                    .map_err(|e| CommandError::io(ErrorCode::CantWriteFile, e))?;
                Ok(json!({}))
            }
            Command::SetCurrentScene { project, path } => {
                self.set_current_scene(ctx, &project, &path).await
            }
        }
    }

    fn resolve(&self, project: &str, path: &str) -> Result<PathBuf, CommandError> {
        self.store
            .asset_path(project, path)
            .ok_or_else(|| CommandError::validation_at(ErrorCode::InvalidPath, path))
    }

    /// Resolve the existing source of a rename, copy or move
    async fn source(&self, project: &str, path: &str) -> Result<PathBuf, CommandError> {
        if path.is_empty() {
            return Err(CommandError::illegal(ErrorCode::CopyChangeRoot));
        }
        let full = self.resolve(project, path)?;
        if !exists(&full).await {
            return Err(CommandError::not_found_at(ErrorCode::DirNotExist, path));
        }
        Ok(full)
    }

    async fn persist(&self, update: CacheUpdate) {
        if let Err(e) = self.cache.write_cache(update).await {
            warn!("Failed to persist project cache: {}", e);
        }
    }

    async fn get_projects(&self) -> Result<Value, CommandError> {
        let projects = self
            .store
            .list_projects()
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
        Ok(serde_json::to_value(projects)?)
    }

    async fn new_project(&self, project: &str) -> Result<Value, CommandError> {
        self.store
            .create_project(project)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
        info!("Created project {}", project);
        Ok(json!({}))
    }

    async fn load_project(
        &self,
        ctx: &mut ProjectContext,
        project: &str,
    ) -> Result<Value, CommandError> {
        let root = self.store.assets_root(project);
        let assets = self
            .store
            .read_dir_assets(&root, Some(&root), true)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;

        if !ctx.is_loaded(project) {
            ctx.project = Some(project.to_string());
            ctx.scene = SceneInfo::default();
        }
        ctx.dir.clear();
        info!("{} is the current project ({} assets)", project, assets.len());

        self.persist(CacheUpdate {
            current_project: Some(project.to_string()),
            current_dir: Some(String::new()),
        })
        .await;

        Ok(json!({ "assets": assets, "name": project }))
    }

    async fn new_folder(
        &self,
        project: &str,
        path: &str,
        name: &str,
    ) -> Result<Value, CommandError> {
        let parent = self.resolve(project, path)?;
        if !is_folder(&parent).await {
            return Err(CommandError::not_found_at(ErrorCode::DirNotExist, path));
        }
        if name.is_empty() {
            return Err(CommandError::validation(ErrorCode::NoName));
        }
        if !is_single_segment(name) {
            return Err(CommandError::validation_at(ErrorCode::InvalidName, name));
        }

        let folder = join_asset(path, name);
        let full = parent.join(name);
        if exists(&full).await {
            return Err(CommandError::conflict_at(ErrorCode::FolderAlreadyExists, &folder));
        }
        self.store
            .mk_dir(&full)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
        Ok(json!({ "path": folder }))
    }

    async fn get_folder(
        &self,
        ctx: &mut ProjectContext,
        project: &str,
        path: &str,
    ) -> Result<Value, CommandError> {
        let full = self.resolve(project, path)?;
        if !is_folder(&full).await {
            return Err(CommandError::not_found_at(ErrorCode::DirNotExist, path));
        }
        let root = self.store.assets_root(project);
        let list = self
            .store
            .read_dir_assets(&full, Some(&root), false)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;

        if ctx.is_loaded(project) && ctx.dir != path {
            ctx.dir = path.to_string();
            self.persist(CacheUpdate {
                current_project: None,
                current_dir: Some(path.to_string()),
            })
            .await;
        }
        Ok(serde_json::to_value(list)?)
    }

    async fn rename(
        &self,
        project: &str,
        path: &str,
        target: RenameTarget,
    ) -> Result<Value, CommandError> {
        let from = self.source(project, path).await?;
        let new_path = match target {
            RenameTarget::Path(new_path) => new_path,
            RenameTarget::Name(name) => {
                if name.is_empty() {
                    return Err(CommandError::validation(ErrorCode::NoNewName));
                }
                if !is_single_segment(&name) {
                    return Err(CommandError::validation_at(ErrorCode::InvalidName, &name));
                }
                join_asset(&parent_asset_path(path), &name)
            }
        };
        self.relocate(project, path, from, &new_path, Relocation::Rename)
            .await
    }

    async fn relocate(
        &self,
        project: &str,
        path: &str,
        from: PathBuf,
        new_path: &str,
        mode: Relocation,
    ) -> Result<Value, CommandError> {
        if new_path.is_empty() {
            return Err(CommandError::illegal(ErrorCode::CopyChangeRoot));
        }
        if new_path == path {
            return Err(CommandError::conflict_at(ErrorCode::SamePath, path));
        }
        if is_folder(&from).await && is_same_or_descendant(new_path, path) {
            return Err(CommandError::illegal_at(ErrorCode::RecursiveFolderCopying, path));
        }
        let to = self.resolve(project, new_path)?;

        let result = match mode {
            Relocation::Rename | Relocation::Move => self.store.rename(&from, &to).await,
            Relocation::Copy => self.store.copy(&from, &to).await,
        };
        result.map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
        debug!("{:?} {} -> {}", mode, path, new_path);

        let keep_original = mode == Relocation::Copy;
        if let Err(e) = self
            .metadata
            .rekey(project, path, new_path, keep_original)
            .await
        {
            warn!("Failed to update metadata for {}: {}", new_path, e);
        }
        Ok(json!({ "new_path": new_path }))
    }

    async fn delete(&self, project: &str, path: &str) -> Result<Value, CommandError> {
        if path.is_empty() {
            return Err(CommandError::illegal(ErrorCode::CopyChangeRoot));
        }
        let full = self.resolve(project, path)?;
        if !exists(&full).await {
            return Err(CommandError::not_found_at(ErrorCode::DirNotExist, path));
        }
        self.store
            .remove(&full)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;

        if let Err(e) = self.metadata.clear(project, path).await {
            warn!("Failed to clear metadata for {}: {}", path, e);
        }
        Ok(json!({ "path": path }))
    }

    async fn save_data(&self, project: &str, path: &str, data: Value) -> Result<Value, CommandError> {
        let full = self.resolve(project, path)?;
        let text = match data {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.writes
            .write(&full, text)
            .await
            .map_err(|e| CommandError::io(ErrorCode::CantWriteFile, e))?;
        Ok(json!({}))
    }

    async fn get_data(&self, project: &str, path: &str) -> Result<Value, CommandError> {
        let full = self.resolve(project, path)?;
        if !exists(&full).await || is_folder(&full).await {
            return Err(CommandError::not_found_at(ErrorCode::FileNotExists, path));
        }
        let text = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
        Ok(Value::String(text))
    }

    async fn save_info(&self, project: &str, path: &str, data: Value) -> Result<Value, CommandError> {
        let Value::Object(fields) = data else {
            return Err(CommandError::validation_at(ErrorCode::SomeFieldsWrong, "data"));
        };
        self.metadata
            .write(project, path, fields)
            .await
            .map_err(|e| CommandError::io(ErrorCode::CantWriteFile, e))?;
        Ok(json!({}))
    }

    async fn get_info(&self, project: &str, path: Option<&str>) -> Result<Value, CommandError> {
        let Some(path) = path else {
            let table = self
                .metadata
                .read_all(project)
                .await
                .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?;
            return Ok(Value::Object(table));
        };
        self.metadata
            .read(project, path)
            .await
            .map_err(|e| CommandError::io(ErrorCode::IoFailure, e))?
            .ok_or_else(|| CommandError::not_found_at(ErrorCode::MetainfoNotFound, path))
    }

    async fn set_current_scene(
        &self,
        ctx: &mut ProjectContext,
        project: &str,
        path: &str,
    ) -> Result<Value, CommandError> {
        let full = self.resolve(project, path)?;
        if !exists(&full).await || is_folder(&full).await {
            return Err(CommandError::not_found_at(ErrorCode::SceneNotExist, path));
        }
        let name = full
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        ctx.scene = SceneInfo {
            name: Some(name.clone()),
            path: Some(path.to_string()),
        };
        Ok(json!({ "name": name, "path": path }))
    }
}
