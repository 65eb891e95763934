#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mailsink::mail::{MailError, MailSession, MailTransport, RemoteFolder, SelectInfo};
use mailsink::notify::{BackgroundNotifier, Indexer};
use mailsink::storage::Database;
use mailsink::sync::SyncEngine;
use mailsink::types::Account;

/// In-memory stand-in for the remote IMAP server.
#[derive(Default)]
pub struct MockServer {
    pub folders: Mutex<HashMap<String, MockMailbox>>,
    pub listing: Mutex<Vec<RemoteFolder>>,
    pub delimiter: Option<String>,
    pub fail_auth: bool,
    // Overlap tracking across fetch calls, for mutual-exclusion assertions.
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
pub struct MockMailbox {
    pub uid_validity: u32,
    pub messages: BTreeMap<u32, Vec<u8>>,
    pub fail_fetch: HashSet<u32>,
}

impl MockServer {
    pub fn with_folder(self, name: &str, mailbox: MockMailbox) -> Self {
        self.folders.lock().unwrap().insert(name.to_string(), mailbox);
        self
    }

    pub fn with_auth_failure(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    pub fn max_fetch_overlap(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    pub server: Arc<MockServer>,
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn connect(&self, _host: &str, _port: u16) -> Result<Box<dyn MailSession>, MailError> {
        Ok(Box::new(MockSession {
            server: self.server.clone(),
        }))
    }
}

pub struct MockSession {
    server: Arc<MockServer>,
}

#[async_trait]
impl MailSession for MockSession {
    async fn authenticate(&mut self, _user: &str, _password: &str) -> Result<(), MailError> {
        if self.server.fail_auth {
            return Err(MailError::Connection("authentication failed".into()));
        }
        Ok(())
    }

    async fn select(&mut self, folder: &str) -> Result<SelectInfo, MailError> {
        let folders = self.server.folders.lock().unwrap();
        let mailbox = folders
            .get(folder)
            .ok_or_else(|| MailError::FolderNotFound(folder.to_string()))?;
        Ok(SelectInfo {
            uid_next: mailbox.messages.keys().next_back().map(|uid| uid + 1),
            uid_validity: Some(mailbox.uid_validity),
            messages_total: mailbox.messages.len() as u32,
            messages_recent: 0,
            messages_unseen: mailbox.messages.len() as u32,
        })
    }

    async fn search_all(&mut self, folder: &str) -> Result<Vec<u32>, MailError> {
        let folders = self.server.folders.lock().unwrap();
        let mailbox = folders
            .get(folder)
            .ok_or_else(|| MailError::FolderNotFound(folder.to_string()))?;
        Ok(mailbox.messages.keys().copied().collect())
    }

    async fn fetch_by_uid(&mut self, folder: &str, uid: u32) -> Result<Vec<u8>, MailError> {
        let current = self.server.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.server
            .max_in_flight
            .fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;

        let result = {
            let folders = self.server.folders.lock().unwrap();
            let mailbox = folders
                .get(folder)
                .ok_or_else(|| MailError::FolderNotFound(folder.to_string()))?;
            if mailbox.fail_fetch.contains(&uid) {
                Err(MailError::Protocol(format!("fetch failed for uid {uid}")))
            } else {
                Ok(mailbox.messages.get(&uid).cloned().unwrap_or_default())
            }
        };

        self.server.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_folders(&mut self, _pattern: &str) -> Result<Vec<RemoteFolder>, MailError> {
        Ok(self.server.listing.lock().unwrap().clone())
    }

    async fn delimiter(&mut self) -> Result<Option<String>, MailError> {
        Ok(self.server.delimiter.clone())
    }
}

pub struct RecordingIndexer {
    pub process_calls: AtomicUsize,
    pub rebuild_calls: AtomicUsize,
    pub fail_process: bool,
    /// Simulated per-call latency, as a stand-in for a real HTTP round trip.
    pub process_delay: Duration,
}

impl RecordingIndexer {
    pub fn new() -> Self {
        Self {
            process_calls: AtomicUsize::new(0),
            rebuild_calls: AtomicUsize::new(0),
            fail_process: false,
            process_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Indexer for RecordingIndexer {
    async fn process_and_embed(&self) -> anyhow::Result<()> {
        if !self.process_delay.is_zero() {
            tokio::time::sleep(self.process_delay).await;
        }
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_process {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(())
    }

    async fn rebuild_index(&self) -> anyhow::Result<()> {
        self.rebuild_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub db: Database,
    pub server: Arc<MockServer>,
    pub engine: Arc<SyncEngine>,
    pub account: Account,
    pub indexer: Arc<RecordingIndexer>,
    _dir: TempDir,
}

pub async fn harness(server: MockServer) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let db = Database::connect(&dir.path().join("test.db"))
        .await
        .expect("database");
    let account = db
        .upsert_account("user@example.com", "hunter2", "mock.example.com", 993)
        .await
        .expect("account");

    let server = Arc::new(server);
    let indexer = Arc::new(RecordingIndexer::new());
    let (notifier, _worker) = BackgroundNotifier::spawn(indexer.clone());
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        Arc::new(MockTransport {
            server: server.clone(),
        }),
        notifier,
    ));

    Harness {
        db,
        server,
        engine,
        account,
        indexer,
        _dir: dir,
    }
}

/// Minimal RFC822 bytes with a stable Message-ID derived from the subject.
pub fn raw_email(subject: &str, from: &str, to: &str) -> Vec<u8> {
    format!(
        "Message-ID: <{subject}@example.com>\r\n\
         Date: Mon, 12 Jan 2026 10:30:00 +0900\r\n\
         From: Alice Kim <{from}>\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         Body of {subject}\r\n"
    )
    .into_bytes()
}

pub fn mailbox_with_uids(uids: &[u32]) -> MockMailbox {
    let mut mailbox = MockMailbox {
        uid_validity: 7,
        ..MockMailbox::default()
    };
    for uid in uids {
        mailbox.messages.insert(
            *uid,
            raw_email(&format!("msg-{uid}"), "alice@example.com", "bob@example.com"),
        );
    }
    mailbox
}
