//! AssetSync Server
//!
//! HTTP command/asset server plus a WebSocket push channel that keeps every
//! connected editor in sync with the projects on disk.

pub mod clients;
pub mod commands;
pub mod config;
pub mod error;
pub mod file_store;
pub mod file_watcher;
pub mod metadata;
pub mod project_cache;
pub mod sessions;
pub mod write_queue;
pub mod ws;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use assetsync_core::{
    file_extension, is_single_segment, join_asset, BaseResp, CommandId, ErrorCode,
    ProjectContext, SESSION_HEADER,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;
use tower_http::{cors::CorsLayer, services::ServeFile, trace::TraceLayer};

pub use clients::ClientRegistry;
pub use commands::{Command, CommandRouter};
pub use config::ServerConfig;
pub use error::CommandError;
pub use file_store::FileStore;
pub use sessions::{Session, SessionRegistry};

use crate::commands::clean_asset_path;
use crate::file_store::is_folder;
use crate::metadata::MetadataStore;
use crate::project_cache::ProjectCache;
use crate::write_queue::WriteQueue;

/// Shared application state
pub struct AppState {
    pub commands: CommandRouter,

    /// Sessions of live WebSocket connections
    pub sessions: SessionRegistry,

    /// Outbound queues of live WebSocket connections
    pub clients: Arc<ClientRegistry>,

    /// Context of requests that carry no known session id
    default_context: Mutex<ProjectContext>,

    /// Project of the most recent successful `load_project`, from any caller.
    /// Plain `/assets` fetches without a session header serve from it.
    loaded_project: Mutex<Option<String>>,
}

impl AppState {
    pub async fn new(config: &ServerConfig) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.projects_root)
            .await
            .with_context(|| format!("Failed to create {:?}", config.projects_root))?;

        let store = FileStore::with_layout(
            &config.projects_root,
            &config.assets_dir,
            &config.metadata_file,
        );
        let writes = Arc::new(WriteQueue::new());
        let metadata = MetadataStore::new(store.clone(), writes.clone());
        let cache = Arc::new(ProjectCache::load(config.cache_path()).await);

        let default_context = match cache.state().await {
            Some(state) => {
                tracing::info!(
                    "Restored last project {:?} (dir {:?})",
                    state.current_project,
                    state.current_dir
                );
                ProjectContext::from_cache(&state)
            }
            None => ProjectContext::default(),
        };

        let loaded_project = default_context.project.clone();
        let span = tracing::info_span!("commands");
        let commands = CommandRouter::new(store, metadata, cache, writes, span);

        Ok(Arc::new(Self {
            commands,
            sessions: SessionRegistry::new(),
            clients: Arc::new(ClientRegistry::new()),
            default_context: Mutex::new(default_context),
            loaded_project: Mutex::new(loaded_project),
        }))
    }

    pub async fn default_context(&self) -> ProjectContext {
        self.default_context.lock().await.clone()
    }

    pub async fn loaded_project(&self) -> Option<String> {
        self.loaded_project.lock().await.clone()
    }

    async fn session(&self, session_id: Option<&str>) -> Option<Session> {
        let id = session_id?;
        let session = self.sessions.get_session(id).await;
        if session.is_none() {
            tracing::warn!("Unknown session {}, using the default context", id);
        }
        session
    }

    /// Context a request runs against: its session's, or the shared default
    pub async fn current_context(&self, session_id: Option<&str>) -> ProjectContext {
        match self.session(session_id).await {
            Some(session) => session.context,
            None => self.default_context().await,
        }
    }

    /// Project an `/assets` request serves from
    pub async fn asset_project(&self, session_id: Option<&str>) -> Option<String> {
        match self.session(session_id).await {
            Some(session) => session.context.project,
            None => self.loaded_project().await,
        }
    }

    /// Drop idle sessions and close their sockets
    pub async fn sweep_idle_sessions(&self, timeout: Duration) -> Vec<String> {
        let expired = self.sessions.cleanup_inactive_sessions(timeout).await;
        for id in &expired {
            tracing::info!("Session {} timed out, closing its socket", id);
            self.clients.close(id).await;
        }
        expired
    }

    /// Run a command and keep the caller's context if the command changed it
    pub async fn run_command(
        &self,
        session_id: Option<&str>,
        cmd_id: &str,
        body: &[u8],
    ) -> BaseResp<Value> {
        let (before, session_id) = match self.session(session_id).await {
            Some(session) => (session.context, Some(session.id)),
            None => (self.default_context().await, None),
        };

        let mut ctx = before.clone();
        let resp = self.commands.dispatch(&mut ctx, cmd_id, body).await;

        if resp.is_ok() && cmd_id.parse::<CommandId>() == Ok(CommandId::LoadProject) {
            *self.loaded_project.lock().await = ctx.project.clone();
        }
        if ctx != before {
            match session_id {
                Some(id) => {
                    self.sessions.update_session(&id, ctx).await;
                }
                None => *self.default_context.lock().await = ctx,
            }
        }
        resp
    }
}

/// Create the HTTP router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/test", get(handle_test))
        .route("/upload", post(handle_upload))
        .route("/assets/*path", get(handle_asset))
        .route("/api/:cmd", post(handle_command))
        .with_state(state)
        // Uploads carry whole asset files
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024))
        .layer(middleware::from_fn(answer_options))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// Plain `OPTIONS` requests get an empty 200
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Liveness probe
async fn handle_test() -> impl IntoResponse {
    Json(json!({"result": 1, "message": "OK!"}))
}

async fn handle_command(
    State(state): State<Arc<AppState>>,
    Path(cmd): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<BaseResp<Value>> {
    Json(state.run_command(session_id(&headers), &cmd, &body).await)
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}

/// Serve a file from the caller's current project
async fn handle_asset(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    let Some(project) = state.asset_project(session_id(request.headers())).await else {
        return not_found();
    };
    let Some(full) = state.commands.store().asset_path(&project, &path) else {
        return not_found();
    };
    if !file_store::exists(&full).await || is_folder(&full).await {
        return not_found();
    }

    match ServeFile::new(full).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Fields of a `/upload` form
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    contents: Bytes,
    path: Option<String>,
    project: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, CommandError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| CommandError::protocol(ErrorCode::CantUploadFile, e.body_text()))?
        {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.contents = field.bytes().await.map_err(|e| {
                        CommandError::protocol(ErrorCode::CantUploadFile, e.body_text())
                    })?;
                }
                "path" | "project" => {
                    let text = field.text().await.map_err(|e| {
                        CommandError::protocol(ErrorCode::CantUploadFile, e.body_text())
                    })?;
                    if field_name == "path" {
                        form.path = Some(text);
                    } else {
                        form.project = Some(text);
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<BaseResp<Value>> {
    let ctx = state.current_context(session_id(&headers)).await;
    let resp = match save_upload(&state, ctx, multipart).await {
        Ok(data) => BaseResp::ok(data),
        Err(e) => {
            tracing::debug!("Upload rejected: {}", e);
            e.into_resp()
        }
    };
    Json(resp)
}

async fn save_upload(
    state: &AppState,
    ctx: ProjectContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Value, CommandError> {
    let form = match multipart {
        Ok(multipart) => UploadForm::read(multipart).await?,
        Err(rejection) => {
            tracing::debug!("Not a multipart upload: {}", rejection);
            UploadForm::default()
        }
    };

    let project = form
        .project
        .filter(|p| !p.is_empty())
        .or(ctx.project)
        .ok_or_else(|| CommandError::not_found(ErrorCode::ProjectNotLoaded))?;
    if !is_single_segment(&project) {
        return Err(CommandError::validation_at(ErrorCode::InvalidName, &project));
    }
    let store = state.commands.store();
    if !store.project_exists(&project).await {
        return Err(CommandError::not_found_at(ErrorCode::ProjectNotFound, &project));
    }

    let name = form
        .file_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CommandError::validation(ErrorCode::NoFileName))?;
    if !is_single_segment(&name) {
        return Err(CommandError::validation_at(ErrorCode::InvalidName, &name));
    }
    let dir = form
        .path
        .ok_or_else(|| CommandError::validation(ErrorCode::NoPath))?;
    let path = join_asset(&clean_asset_path(&dir)?, &name);
    let full = store
        .asset_path(&project, &path)
        .ok_or_else(|| CommandError::validation_at(ErrorCode::InvalidPath, &path))?;

    let size = form.contents.len();
    state
        .commands
        .writes()
        .write(&full, &form.contents)
        .await
        .map_err(|e| CommandError::io(ErrorCode::CantUploadFile, e))?;
    tracing::info!("Uploaded {}/{} ({} bytes)", project, path, size);

    Ok(json!({
        "size": size,
        "ext": file_extension(&name).unwrap_or_default(),
        "path": path,
        "name": name,
        "project": project,
    }))
}

/// Start the HTTP and WebSocket servers and the file watcher
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(&config).await?;

    let watcher = file_watcher::start_fs_watcher(
        config.projects_root.clone(),
        config.assets_dir.clone(),
        config.fs_events_interval,
        state.clients.clone(),
    )
    .await?;

    let sweeper = config.session_idle_timeout.map(|timeout| {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeout.min(Duration::from_secs(60)));
            loop {
                ticker.tick().await;
                state.sweep_idle_sessions(timeout).await;
            }
        })
    });

    let http_listener = tokio::net::TcpListener::bind(config.http_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr()))?;
    let ws_listener = tokio::net::TcpListener::bind(config.ws_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.ws_addr()))?;

    tracing::info!("AssetSync server listening on {}", config.http_addr());
    tracing::info!("WebSocket server listening on {}", config.ws_addr());
    tracing::info!("Serving projects from {:?}", config.projects_root);

    let http = axum::serve(http_listener, create_router(state.clone()));
    let ws = axum::serve(ws_listener, ws::create_ws_router(state.clone()));
    let result = tokio::try_join!(http.into_future(), ws.into_future());

    watcher.abort();
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result?;
    Ok(())
}
