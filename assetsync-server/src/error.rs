//! Command failures
//!
//! Every failure a command can hit maps to one [`ErrorCode`] and ends up in a
//! `{result: 0, message, error_code}` response. Nothing crosses the HTTP
//! boundary as an error status.

use assetsync_core::{BaseResp, ErrorCode};

/// Broad category of a command failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    IllegalOperation,
    Io,
    Protocol,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A required param is missing or malformed
    #[error("{}", describe(.code, .detail))]
    Validation { code: ErrorCode, detail: Option<String> },

    #[error("{}", describe(.code, .detail))]
    NotFound { code: ErrorCode, detail: Option<String> },

    #[error("{}", describe(.code, .detail))]
    Conflict { code: ErrorCode, detail: Option<String> },

    /// Touching the asset root itself, or a folder into itself
    #[error("{}", describe(.code, .detail))]
    IllegalOperation { code: ErrorCode, detail: Option<String> },

    #[error("{}: {source}", .code.message())]
    Io {
        code: ErrorCode,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", describe(.code, .detail))]
    Protocol { code: ErrorCode, detail: Option<String> },
}

fn describe(code: &ErrorCode, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!("{}: {}", code.message(), detail),
        None => code.message().to_string(),
    }
}

impl CommandError {
    pub fn validation(code: ErrorCode) -> Self {
        Self::Validation { code, detail: None }
    }

    pub fn validation_at(code: ErrorCode, value: &str) -> Self {
        Self::Validation {
            code,
            detail: Some(value.to_string()),
        }
    }

    pub fn not_found(code: ErrorCode) -> Self {
        Self::NotFound { code, detail: None }
    }

    pub fn not_found_at(code: ErrorCode, path: &str) -> Self {
        Self::NotFound {
            code,
            detail: Some(path.to_string()),
        }
    }

    pub fn conflict(code: ErrorCode) -> Self {
        Self::Conflict { code, detail: None }
    }

    pub fn conflict_at(code: ErrorCode, path: &str) -> Self {
        Self::Conflict {
            code,
            detail: Some(path.to_string()),
        }
    }

    pub fn illegal(code: ErrorCode) -> Self {
        Self::IllegalOperation { code, detail: None }
    }

    pub fn illegal_at(code: ErrorCode, path: &str) -> Self {
        Self::IllegalOperation {
            code,
            detail: Some(path.to_string()),
        }
    }

    pub fn io(code: ErrorCode, source: std::io::Error) -> Self {
        Self::Io { code, source }
    }

    pub fn protocol(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::IllegalOperation { code, .. }
            | Self::Io { code, .. }
            | Self::Protocol { code, .. } => *code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::IllegalOperation { .. } => ErrorKind::IllegalOperation,
            Self::Io { .. } => ErrorKind::Io,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// Fold the failure into a response envelope
    pub fn into_resp<T>(self) -> BaseResp<T> {
        BaseResp::err(self.code(), self.to_string())
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(ErrorCode::WrongJson, err.to_string())
    }
}
