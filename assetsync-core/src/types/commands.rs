//! Command catalog and raw command params
//!
//! Commands are invoked as `POST /api/<command id>` with a JSON body of
//! [`CommandParams`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every command the server understands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    GetLoadedProject,
    GetProjects,
    NewProject,
    LoadProject,
    NewFolder,
    GetFolder,
    Rename,
    Copy,
    Move,
    Delete,
    SaveData,
    GetData,
    SaveInfo,
    GetInfo,
    DelInfo,
    SetCurrentScene,
}

impl CommandId {
    pub const ALL: [CommandId; 16] = [
        CommandId::GetLoadedProject,
        CommandId::GetProjects,
        CommandId::NewProject,
        CommandId::LoadProject,
        CommandId::NewFolder,
        CommandId::GetFolder,
        CommandId::Rename,
        CommandId::Copy,
        CommandId::Move,
        CommandId::Delete,
        CommandId::SaveData,
        CommandId::GetData,
        CommandId::SaveInfo,
        CommandId::GetInfo,
        CommandId::DelInfo,
        CommandId::SetCurrentScene,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandId::GetLoadedProject => "get_loaded_project",
            CommandId::GetProjects => "get_projects",
            CommandId::NewProject => "new_project",
            CommandId::LoadProject => "load_project",
            CommandId::NewFolder => "new_folder",
            CommandId::GetFolder => "get_folder",
            CommandId::Rename => "rename",
            CommandId::Copy => "copy",
            CommandId::Move => "move",
            CommandId::Delete => "delete",
            CommandId::SaveData => "save_data",
            CommandId::GetData => "get_data",
            CommandId::SaveInfo => "save_info",
            CommandId::GetInfo => "get_info",
            CommandId::DelInfo => "del_info",
            CommandId::SetCurrentScene => "set_current_scene",
        }
    }

    /// Commands that name a project in their params
    pub fn requires_project(self) -> bool {
        !matches!(self, CommandId::GetProjects | CommandId::GetLoadedProject)
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a command id is not in the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandId {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim_matches('/');
        CommandId::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == id)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Raw params of any command; which fields are required depends on the command
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandParams {
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_new_path(mut self, new_path: impl Into<String>) -> Self {
        self.new_path = Some(new_path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_new_name(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
