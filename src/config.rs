use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::types::FolderType;

const DB_FILE_NAME: &str = "mailsink.db";

/// Application-wide defaults. Env vars override the code defaults; no
/// user-authored config files are required.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub message_limit: usize,
    pub sync_folder_types: Vec<FolderType>,
    pub indexer_url: Option<String>,
}

impl AppDefaults {
    pub fn load() -> Result<Self> {
        let data_dir = env::var("MAILSINK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mailsink")
            });

        let db_file =
            env::var("MAILSINK_DB_FILE").unwrap_or_else(|_| DB_FILE_NAME.to_string());

        let message_limit = env::var("MAILSINK_MESSAGE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(50);

        let sync_folder_types = env::var("MAILSINK_SYNC_FOLDER_TYPES")
            .map(|s| {
                s.split(',')
                    .map(|t| FolderType::parse(t.trim()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|_| {
                vec![FolderType::Inbox, FolderType::Sent, FolderType::Drafts]
            });

        let indexer_url = env::var("MAILSINK_INDEXER_URL")
            .ok()
            .filter(|s| !s.is_empty());

        Ok(Self {
            data_dir,
            db_file,
            message_limit,
            sync_folder_types,
            indexer_url,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join("attachments")
    }
}
