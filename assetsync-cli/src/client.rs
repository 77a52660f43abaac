//! HTTP client for a running AssetSync server

use anyhow::{bail, Context};
use assetsync_core::{BaseResp, CommandId, CommandParams, FsObject, ProjectContext, SESSION_HEADER};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct AssetSyncClient {
    client: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestResponse {
    pub result: u8,
    pub message: String,
}

impl AssetSyncClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}:{}", host, port),
            session_id: None,
        }
    }

    /// Run later commands against a WebSocket session's context
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub async fn check_health(&self) -> anyhow::Result<bool> {
        let resp = self
            .client
            .get(format!("{}/test", self.base_url))
            .send()
            .await?
            .json::<TestResponse>()
            .await?;

        Ok(resp.result == 1)
    }

    /// Send one command and return its raw envelope
    pub async fn command(
        &self,
        cmd: CommandId,
        params: &CommandParams,
    ) -> anyhow::Result<BaseResp<Value>> {
        let mut request = self
            .client
            .post(format!("{}/api/{}", self.base_url, cmd))
            .json(params);
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        request
            .send()
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid response to {}", cmd))
    }

    /// Send a command and decode its data, turning failures into errors
    pub async fn call<T: DeserializeOwned>(
        &self,
        cmd: CommandId,
        params: &CommandParams,
    ) -> anyhow::Result<T> {
        let resp = self.command(cmd, params).await?;
        if !resp.is_ok() {
            let code = resp
                .error_code
                .map(|c| format!("{:?}", c))
                .unwrap_or_default();
            bail!(
                "{} failed ({}): {}",
                cmd,
                code,
                resp.message.unwrap_or_default()
            );
        }
        Ok(serde_json::from_value(resp.data.unwrap_or(Value::Null))?)
    }

    pub async fn get_projects(&self) -> anyhow::Result<Vec<String>> {
        self.call(CommandId::GetProjects, &CommandParams::default())
            .await
    }

    pub async fn get_loaded_project(&self) -> anyhow::Result<ProjectContext> {
        self.call(CommandId::GetLoadedProject, &CommandParams::default())
            .await
    }

    pub async fn load_project(&self, project: &str) -> anyhow::Result<Value> {
        self.call(CommandId::LoadProject, &CommandParams::for_project(project))
            .await
    }

    pub async fn get_folder(&self, project: &str, dir: &str) -> anyhow::Result<Vec<FsObject>> {
        self.call(
            CommandId::GetFolder,
            &CommandParams::for_project(project).with_path(dir),
        )
        .await
    }
}
