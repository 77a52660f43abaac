//! AssetSync Core Library
//!
//! Shared pieces of the AssetSync editor backend:
//! - Directory listing and filesystem change types
//! - Command catalog, response and WebSocket envelopes
//! - Project context and persisted cache state
//! - Client-side invalidation of pushed change batches
//! - Asset path helpers

pub mod client_sync;
pub mod path_utils;
pub mod types;

// Re-export commonly used types
pub use client_sync::ClientSync;
pub use path_utils::{
    file_extension, is_same_or_descendant, is_single_segment, join_asset, join_asset_path,
    normalize_path, parent_asset_path, path_to_string, relative_path,
};
pub use types::{
    BaseResp, CacheUpdate, CommandId, CommandParams, EnvelopeError, ErrorCode, FsEvent,
    FsEventBatch, FsEventType, FsObject, FsObjectType, ProjectCacheState, ProjectContext,
    SceneInfo, SessionIdMessage, UnknownCommand, WsEnvelope, FS_EVENTS_MESSAGE,
    SESSION_HEADER, SESSION_ID_MESSAGE,
};
