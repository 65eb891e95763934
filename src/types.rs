use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{SkippedMessage, SyncItemError};

#[derive(Clone, Debug)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Semantic role of a folder, derived from special-use flags and name
/// heuristics (see `catalog`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Spam,
    Archive,
    Starred,
    Important,
    All,
    Custom,
}

impl FolderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderType::Inbox => "inbox",
            FolderType::Sent => "sent",
            FolderType::Drafts => "drafts",
            FolderType::Trash => "trash",
            FolderType::Spam => "spam",
            FolderType::Archive => "archive",
            FolderType::Starred => "starred",
            FolderType::Important => "important",
            FolderType::All => "all",
            FolderType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> FolderType {
        match s {
            "inbox" => FolderType::Inbox,
            "sent" => FolderType::Sent,
            "drafts" => FolderType::Drafts,
            "trash" => FolderType::Trash,
            "spam" => FolderType::Spam,
            "archive" => FolderType::Archive,
            "starred" => FolderType::Starred,
            "important" => FolderType::Important,
            "all" => FolderType::All,
            _ => FolderType::Custom,
        }
    }
}

/// A discovered remote folder after flattening and classification.
#[derive(Clone, Debug)]
pub struct FolderDescriptor {
    pub name: String,
    pub path: String,
    pub delimiter: String,
    pub flags: Vec<String>,
    pub is_container_only: bool,
    pub folder_type: FolderType,
}

/// Local folder row with the cached remote state from the last SELECT.
#[derive(Clone, Debug)]
pub struct FolderState {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub path: Option<String>,
    pub folder_type: FolderType,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub messages_total: Option<u32>,
    pub messages_recent: Option<u32>,
    pub messages_unseen: Option<u32>,
    pub last_sync_at: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ContactRole {
    #[serde(rename = "FROM")]
    From,
    #[serde(rename = "TO")]
    To,
    #[serde(rename = "CC")]
    Cc,
    #[serde(rename = "BCC")]
    Bcc,
}

impl ContactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactRole::From => "FROM",
            ContactRole::To => "TO",
            ContactRole::Cc => "CC",
            ContactRole::Bcc => "BCC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParsedContact {
    pub role: ContactRole,
    pub email: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ParsedHeader {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub struct ParsedAttachment {
    pub filename: String,
    pub mime_type: String,
    pub size: u32,
    pub path: Option<String>,
}

/// Structured entity graph produced by the parser collaborator.
#[derive(Clone, Debug, Default)]
pub struct ParsedEmail {
    pub external_message_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub from_email: String,
    pub from_name: String,
    pub snippet: String,
    pub body_text: String,
    pub body_html: String,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub reference_ids: Option<String>,
    pub sent_at: i64,
    pub received_at: i64,
    pub has_attachments: bool,
    pub contacts: Vec<ParsedContact>,
    pub headers: Vec<ParsedHeader>,
    pub attachments: Vec<ParsedAttachment>,
    /// Set when the raw bytes could not be parsed and this is the degraded
    /// best-effort structure.
    pub parse_error: Option<String>,
}

/// Outcome of one `sync_folder` pass. A successful result may still carry
/// per-message errors.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncResult {
    pub folder_name: String,
    pub folder_id: i64,
    pub synced_count: usize,
    pub total_available: u32,
    pub processed_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<SyncItemError>,
    pub skipped: Vec<SkippedMessage>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FolderSyncOutcome {
    pub folder_name: String,
    pub folder_path: String,
    pub folder_type: FolderType,
    #[serde(flatten)]
    pub result: SyncResult,
}

#[derive(Clone, Debug, Serialize)]
pub struct FolderSyncFailure {
    pub folder_path: String,
    pub error: String,
}

/// Aggregate of `sync_all_folders` across every matching folder.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SyncAllResult {
    pub folder_count: usize,
    pub total_messages: usize,
    pub folder_results: Vec<FolderSyncOutcome>,
    pub errors: Vec<FolderSyncFailure>,
}

#[derive(Clone, Debug)]
pub struct SyncAllOptions {
    pub folder_types: Vec<FolderType>,
    pub message_limit: usize,
    pub skip_empty: bool,
}

impl Default for SyncAllOptions {
    fn default() -> Self {
        Self {
            folder_types: vec![FolderType::Inbox, FolderType::Sent, FolderType::Drafts],
            message_limit: 10,
            skip_empty: true,
        }
    }
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}
