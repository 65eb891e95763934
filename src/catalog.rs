//! Folder discovery: walks the remote LIST output, flattens it with the
//! server delimiter, classifies each folder by purpose, and upserts the
//! result into the folder table without disturbing cached sync state.

use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::mail::MailSession;
use crate::storage::Database;
use crate::types::{FolderDescriptor, FolderType};

/// Well-known modified-UTF-7 folder names Gmail reports for Korean-locale
/// accounts. These never carry special-use flags over plain LIST.
const GMAIL_ENCODED_ALIASES: &[(&str, FolderType)] = &[
    ("&1zTJwNG1-", FolderType::Starred),
    ("&vMTUXNO4ycDVaA-", FolderType::All),
    ("&vPSwuNO4ycDVaA-", FolderType::Trash),
    ("&wqTTONVo-", FolderType::Drafts),
    ("&x4TC3Lz0rQDVaA-", FolderType::Sent),
    ("&yATMtLz0rQDVaA-", FolderType::Important),
    ("&yRHGlA-", FolderType::Spam),
];

pub struct FolderCatalog {
    db: Database,
}

impl FolderCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Discovers and classifies the account's folders, persisting every
    /// selectable one. Container-only folders are returned but not stored.
    pub async fn list_folders(
        &self,
        session: &mut dyn MailSession,
        account_id: i64,
    ) -> Result<Vec<FolderDescriptor>, SyncError> {
        let remote = session.list_folders("*").await?;

        let delimiter = match session.delimiter().await {
            Ok(Some(d)) if !d.is_empty() => d,
            Ok(_) => "/".to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to get folder delimiter, using '/'");
                "/".to_string()
            }
        };

        let mut descriptors = Vec::with_capacity(remote.len());
        for folder in &remote {
            let descriptor = FolderDescriptor {
                folder_type: classify_folder(&folder.name, &folder.path, &folder.flags),
                name: folder.name.clone(),
                path: folder.path.clone(),
                delimiter: folder
                    .delimiter
                    .clone()
                    .unwrap_or_else(|| delimiter.clone()),
                flags: folder.flags.clone(),
                is_container_only: folder.no_select,
            };

            if !descriptor.is_container_only {
                if let Err(e) = self.db.upsert_folder_descriptor(account_id, &descriptor).await {
                    warn!(folder = %descriptor.name, error = %e, "Folder upsert failed");
                }
            }
            descriptors.push(descriptor);
        }

        debug!(
            account = account_id,
            count = descriptors.len(),
            "Folder catalog refreshed"
        );
        Ok(descriptors)
    }
}

/// Classification priority: special-use flags, then well-known encoded
/// aliases, then localized name keywords, else custom.
pub fn classify_folder(name: &str, path: &str, flags: &[String]) -> FolderType {
    if let Some(t) = classify_by_flags(flags) {
        return t;
    }

    if name.eq_ignore_ascii_case("inbox") || path.eq_ignore_ascii_case("inbox") {
        return FolderType::Inbox;
    }

    for (alias, t) in GMAIL_ENCODED_ALIASES {
        if name == *alias {
            return *t;
        }
    }

    classify_by_keywords(&path.to_lowercase())
}

fn classify_by_flags(flags: &[String]) -> Option<FolderType> {
    for flag in flags {
        let t = match flag.trim_start_matches('\\').to_ascii_lowercase().as_str() {
            "inbox" => FolderType::Inbox,
            "sent" => FolderType::Sent,
            "drafts" => FolderType::Drafts,
            "trash" => FolderType::Trash,
            "junk" | "spam" => FolderType::Spam,
            "archive" => FolderType::Archive,
            "flagged" => FolderType::Starred,
            "important" => FolderType::Important,
            "all" => FolderType::All,
            _ => continue,
        };
        return Some(t);
    }
    None
}

fn classify_by_keywords(lower_path: &str) -> FolderType {
    if lower_path.contains("sent") || lower_path.contains("보낸") {
        FolderType::Sent
    } else if lower_path.contains("draft") || lower_path.contains("임시") {
        FolderType::Drafts
    } else if lower_path.contains("trash")
        || lower_path.contains("deleted")
        || lower_path.contains("휴지통")
    {
        FolderType::Trash
    } else if lower_path.contains("spam")
        || lower_path.contains("junk")
        || lower_path.contains("스팸")
    {
        FolderType::Spam
    } else if lower_path.contains("archive") || lower_path.contains("보관") {
        FolderType::Archive
    } else if lower_path.contains("starred") || lower_path.contains("별표") {
        FolderType::Starred
    } else if lower_path.contains("important") || lower_path.contains("중요") {
        FolderType::Important
    } else {
        FolderType::Custom
    }
}
