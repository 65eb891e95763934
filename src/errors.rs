use serde::Serialize;
use thiserror::Error;

use crate::mail::MailError;

/// Fatal errors for a whole `sync_folder` call. Per-message problems are
/// collected into the result instead (see `SyncItemError`).
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<MailError> for SyncError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Connection(msg) => SyncError::Connection(msg),
            MailError::FolderNotFound(name) => SyncError::FolderNotFound(name),
            MailError::Protocol(msg) => SyncError::Connection(msg),
        }
    }
}

/// Machine-readable action tag for a non-fatal per-message failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    FetchFailed,
    ParseFailed,
    SaveFailed,
}

#[derive(Clone, Debug, Serialize)]
pub struct SyncItemError {
    pub uid: u32,
    pub action: ErrorAction,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyContent,
}

#[derive(Clone, Debug, Serialize)]
pub struct SkippedMessage {
    pub uid: u32,
    pub reason: SkipReason,
}
