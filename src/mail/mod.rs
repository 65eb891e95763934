//! Mail protocol collaborator boundary. The sync engine only sees these
//! traits; the production implementation lives in [`imap`].

pub mod imap;

use async_trait::async_trait;
use thiserror::Error;

pub use imap::ImapTransport;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("folder not found: {0}")]
    FolderNotFound(String),
}

/// Cached remote state reported by a successful SELECT.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectInfo {
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
    pub messages_total: u32,
    pub messages_recent: u32,
    pub messages_unseen: u32,
}

/// One node of the remote folder listing, already carrying its full path.
#[derive(Clone, Debug)]
pub struct RemoteFolder {
    pub name: String,
    pub path: String,
    pub delimiter: Option<String>,
    pub flags: Vec<String>,
    /// \Noselect: the folder is a pure container and cannot hold messages.
    pub no_select: bool,
}

#[async_trait]
pub trait MailSession: Send {
    async fn authenticate(&mut self, user: &str, password: &str) -> Result<(), MailError>;

    async fn select(&mut self, folder: &str) -> Result<SelectInfo, MailError>;

    /// All UIDs currently present in the selected folder.
    async fn search_all(&mut self, folder: &str) -> Result<Vec<u32>, MailError>;

    /// Raw RFC822 bytes for one message. An empty body is not an error here;
    /// the engine records it as a skip.
    async fn fetch_by_uid(&mut self, folder: &str, uid: u32) -> Result<Vec<u8>, MailError>;

    async fn list_folders(&mut self, pattern: &str) -> Result<Vec<RemoteFolder>, MailError>;

    /// Hierarchy delimiter reported by the server, when it reports one.
    async fn delimiter(&mut self) -> Result<Option<String>, MailError>;
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn MailSession>, MailError>;
}
