//! Wire envelopes shared by the server and its clients
//!
//! HTTP commands answer with [`BaseResp`]; WebSocket traffic in both
//! directions is wrapped in [`WsEnvelope`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Message id the server sends once right after the WebSocket upgrade
pub const SESSION_ID_MESSAGE: &str = "SESSION_ID";

/// Message id of a batched filesystem change push
pub const FS_EVENTS_MESSAGE: &str = "SERVER_FILE_SYSTEM_EVENTS";

/// Header HTTP clients use to select their session context
pub const SESSION_HEADER: &str = "x-session-id";

/// Stable machine-readable failure codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CommandNotFound,
    NoProjectName,
    ProjectNotFound,
    ProjectNotLoaded,
    ProjectAlreadyExists,
    NoName,
    NoNewName,
    DirNotExist,
    FolderAlreadyExists,
    NoPath,
    NoFileName,
    WrongJson,
    NoData,
    FileNotExists,
    CantWriteFile,
    CantUploadFile,
    NoNewPath,
    CopyChangeRoot,
    SomeFieldsWrong,
    RecursiveFolderCopying,
    SceneNotExist,
    MetainfoNotFound,
    InvalidPath,
    InvalidName,
    SamePath,
    IoFailure,
}

impl ErrorCode {
    /// Human-readable diagnostic text
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::CommandNotFound => "Command not found!",
            ErrorCode::NoProjectName => "No project name received!",
            ErrorCode::ProjectNotFound => "Project not found!",
            ErrorCode::ProjectNotLoaded => "No project loaded!",
            ErrorCode::ProjectAlreadyExists => "A project with the same name already exists!",
            ErrorCode::NoName => "No name received!",
            ErrorCode::NoNewName => "No new name received!",
            ErrorCode::DirNotExist => "Path does not exist",
            ErrorCode::FolderAlreadyExists => "Folder already exists",
            ErrorCode::NoPath => "No path received!",
            ErrorCode::NoFileName => "No file name received!",
            ErrorCode::WrongJson => "Request with wrong JSON!",
            ErrorCode::NoData => "No data to save!",
            ErrorCode::FileNotExists => "File does not exist",
            ErrorCode::CantWriteFile => "Could not write file",
            ErrorCode::CantUploadFile => "Could not upload file",
            ErrorCode::NoNewPath => "New path not received!",
            ErrorCode::CopyChangeRoot => "Trying to copy or change the project's asset root folder!",
            ErrorCode::SomeFieldsWrong => "Some of the command's required params are missing or empty",
            ErrorCode::RecursiveFolderCopying => "Cannot copy or move a folder into itself",
            ErrorCode::SceneNotExist => "Scene does not exist",
            ErrorCode::MetainfoNotFound => "Metadata not found",
            ErrorCode::InvalidPath => "Path leaves the project's asset root",
            ErrorCode::InvalidName => "Name must be a single path segment",
            ErrorCode::SamePath => "Source and destination are the same path",
            ErrorCode::IoFailure => "File system operation failed",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Uniform command response: `result` is 1 on success, 0 on failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BaseResp<T> {
    pub result: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl<T> BaseResp<T> {
    pub fn ok(data: T) -> Self {
        Self {
            result: 1,
            data: Some(data),
            message: None,
            error_code: None,
        }
    }

    pub fn err(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result: 0,
            data: None,
            message: Some(message.into()),
            error_code: Some(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == 1
    }
}

/// Errors produced while reading an inbound WebSocket message
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no 'id' field")]
    MissingId,

    #[error("message has no 'message' field")]
    MissingMessage,
}

/// `{id, message}` frame used in both WebSocket directions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsEnvelope<T = serde_json::Value> {
    pub id: String,
    pub message: T,
}

impl<T> WsEnvelope<T> {
    pub fn new(id: impl Into<String>, message: T) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }
}

impl WsEnvelope {
    /// Parse an inbound frame, checking the `{id, message}` shape first
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let id = match value.get("id") {
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => return Err(EnvelopeError::MissingId),
        };
        let message = value.get("message").cloned().ok_or(EnvelopeError::MissingMessage)?;
        Ok(Self { id, message })
    }

    /// Decode the payload into a concrete message type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        Ok(serde_json::from_value(self.message.clone())?)
    }
}

/// Payload of the `SESSION_ID` message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdMessage {
    pub session_id: String,
}
