//! Folder synchronization passes: lock, diff against the local store, fetch
//! only the undiscovered recent subset, and ingest in stable oldest-first
//! order so locally assigned ids track chronology.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::FolderCatalog;
use crate::errors::{ErrorAction, SkipReason, SkippedMessage, SyncError, SyncItemError};
use crate::ingest::MessageIngester;
use crate::lock::SyncLockRegistry;
use crate::mail::{MailSession, MailTransport};
use crate::notify::BackgroundNotifier;
use crate::parse::{parse_raw_email, AttachmentStore, ParseContext};
use crate::storage::Database;
use crate::types::{
    Account, FolderDescriptor, FolderSyncFailure, FolderSyncOutcome, FolderType, SyncAllOptions,
    SyncAllResult, SyncResult,
};

pub struct SyncEngine {
    db: Database,
    transport: Arc<dyn MailTransport>,
    locks: SyncLockRegistry,
    notifier: BackgroundNotifier,
    ingester: MessageIngester,
    catalog: FolderCatalog,
    attachment_store: Option<Arc<AttachmentStore>>,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        transport: Arc<dyn MailTransport>,
        notifier: BackgroundNotifier,
    ) -> Self {
        Self {
            ingester: MessageIngester::new(db.clone()),
            catalog: FolderCatalog::new(db.clone()),
            db,
            transport,
            locks: SyncLockRegistry::new(),
            notifier,
            attachment_store: None,
        }
    }

    pub fn with_attachment_store(mut self, store: AttachmentStore) -> Self {
        self.attachment_store = Some(Arc::new(store));
        self
    }

    /// Synchronizes one folder. Exactly one pass per (account, folder) runs
    /// at a time; concurrent callers for the same key queue in FIFO order.
    /// Auth/select failures are fatal for the call; per-message failures are
    /// collected into the result.
    pub async fn sync_folder(
        &self,
        account: &Account,
        folder_name: &str,
        limit: usize,
    ) -> Result<SyncResult, SyncError> {
        // Guard drops on every exit path, including early returns and panics.
        let _guard = self.locks.acquire(account.id, folder_name).await;
        info!(account = account.id, folder = %folder_name, "Folder sync started");

        let folder = self.db.get_or_create_folder(account.id, folder_name).await?;

        // One query per pass; the diff below runs entirely in memory.
        let existing_uids = self.db.existing_uids(account.id, folder.id).await?;
        debug!(
            account = account.id,
            folder = %folder_name,
            known = existing_uids.len(),
            "Loaded idempotency index"
        );

        let mut session = self
            .transport
            .connect(&account.imap_host, account.imap_port)
            .await?;
        session.authenticate(&account.email, &account.password).await?;

        let select = session.select(folder_name).await?;
        // Cached state is refreshed from the SELECT result before any fetch.
        self.db.update_folder_remote_state(folder.id, &select).await?;

        let mut result = SyncResult {
            folder_name: folder_name.to_string(),
            folder_id: folder.id,
            total_available: select.messages_total,
            ..SyncResult::default()
        };

        if select.messages_total == 0 {
            info!(account = account.id, folder = %folder_name, "Folder is empty");
            return Ok(result);
        }

        let remote_uids = session.search_all(folder_name).await?;
        if remote_uids.is_empty() {
            return Ok(result);
        }

        // Most recent first, bounded by the caller's limit.
        let mut latest: Vec<u32> = remote_uids;
        latest.sort_unstable_by(|a, b| b.cmp(a));
        latest.truncate(limit);

        let mut new_uids: Vec<u32> = latest
            .iter()
            .copied()
            .filter(|uid| !existing_uids.contains(uid))
            .collect();
        result.processed_count = new_uids.len();
        result.skipped_count = latest.len() - new_uids.len();

        // Fetch oldest-first so insertion order matches chronological order
        // even when limit-bounded or spread across passes.
        new_uids.sort_unstable();
        debug!(
            account = account.id,
            folder = %folder_name,
            new = new_uids.len(),
            latest = latest.len(),
            "UID diff computed"
        );

        for uid in new_uids {
            let raw = match session.fetch_by_uid(folder_name, uid).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(uid, error = %e, "Fetch failed");
                    result.errors.push(SyncItemError {
                        uid,
                        action: ErrorAction::FetchFailed,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if raw.is_empty() {
                debug!(uid, "Empty message content, skipping");
                result.skipped.push(SkippedMessage {
                    uid,
                    reason: SkipReason::EmptyContent,
                });
                continue;
            }

            let ctx = ParseContext {
                account_id: account.id,
                attachment_store: self.attachment_store.as_deref(),
            };
            let parsed = parse_raw_email(&raw, &ctx);
            if let Some(parse_error) = &parsed.parse_error {
                // The degraded structure is still worth keeping; the error is
                // reported alongside it.
                result.errors.push(SyncItemError {
                    uid,
                    action: ErrorAction::ParseFailed,
                    message: parse_error.clone(),
                });
            }

            // A concurrent or partially completed earlier pass may have
            // inserted this UID after our index snapshot.
            if self
                .db
                .find_message_id_by_uid(account.id, folder.id, uid)
                .await?
                .is_some()
            {
                debug!(uid, "Already stored, skipping");
                continue;
            }

            match self
                .ingester
                .ingest(&parsed, account.id, folder.id, uid, select.uid_validity)
                .await
            {
                Ok(message_id) => {
                    debug!(uid, message_id, "Message stored");
                    result.synced_count += 1;
                }
                Err(e) => {
                    warn!(uid, error = %e, "Save failed");
                    result.errors.push(SyncItemError {
                        uid,
                        action: ErrorAction::SaveFailed,
                        message: e.to_string(),
                    });
                }
            }
        }

        // One downstream notification per batch, not per message.
        self.notifier.notify_batch(result.synced_count);

        info!(
            account = account.id,
            folder = %folder_name,
            synced = result.synced_count,
            skipped = result.skipped_count,
            errors = result.errors.len(),
            "Folder sync completed"
        );
        Ok(result)
    }

    /// Runs the folder catalog and synchronizes every matching folder,
    /// collecting per-folder failures without aborting the rest.
    pub async fn sync_all_folders(
        &self,
        account: &Account,
        options: &SyncAllOptions,
    ) -> Result<SyncAllResult, SyncError> {
        let folders = match self.discover_folders(account).await {
            Ok(folders) => folders,
            Err(e) => {
                // Fall back to the inbox when discovery fails outright.
                warn!(account = account.id, error = %e, "Folder listing failed, trying INBOX only");
                vec![FolderDescriptor {
                    name: "INBOX".to_string(),
                    path: "INBOX".to_string(),
                    delimiter: "/".to_string(),
                    flags: Vec::new(),
                    is_container_only: false,
                    folder_type: FolderType::Inbox,
                }]
            }
        };

        let sync_everything = options.folder_types.contains(&FolderType::All);
        let targets: Vec<&FolderDescriptor> = folders
            .iter()
            .filter(|f| !f.is_container_only)
            .filter(|f| sync_everything || options.folder_types.contains(&f.folder_type))
            .filter(|f| sync_everything || should_sync(f))
            .collect();

        debug!(
            account = account.id,
            targets = targets.len(),
            "Folders selected for sync"
        );

        let mut results = SyncAllResult::default();
        for folder in targets {
            match self
                .sync_folder(account, &folder.path, options.message_limit)
                .await
            {
                Ok(result) => {
                    if !options.skip_empty || result.synced_count > 0 {
                        results.folder_count += 1;
                        results.total_messages += result.synced_count;
                        results.folder_results.push(FolderSyncOutcome {
                            folder_name: folder.name.clone(),
                            folder_path: folder.path.clone(),
                            folder_type: folder.folder_type,
                            result,
                        });
                    }
                }
                Err(e) => {
                    warn!(folder = %folder.path, error = %e, "Folder sync failed");
                    results.errors.push(FolderSyncFailure {
                        folder_path: folder.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            account = account.id,
            folders = results.folder_count,
            messages = results.total_messages,
            failures = results.errors.len(),
            "All-folder sync completed"
        );
        Ok(results)
    }

    /// Recent mail from the inbox and sent folders, a small batch each.
    pub async fn sync_latest(&self, account: &Account) -> Result<SyncAllResult, SyncError> {
        self.sync_all_folders(
            account,
            &SyncAllOptions {
                folder_types: vec![FolderType::Inbox, FolderType::Sent],
                message_limit: 10,
                skip_empty: true,
            },
        )
        .await
    }

    async fn discover_folders(
        &self,
        account: &Account,
    ) -> Result<Vec<FolderDescriptor>, SyncError> {
        let mut session: Box<dyn MailSession> = self
            .transport
            .connect(&account.imap_host, account.imap_port)
            .await?;
        session.authenticate(&account.email, &account.password).await?;
        self.catalog.list_folders(session.as_mut(), account.id).await
    }
}

/// Gmail's virtual folders mirror messages that live elsewhere; syncing them
/// would double-ingest everything.
fn should_sync(folder: &FolderDescriptor) -> bool {
    !matches!(folder.folder_type, FolderType::All | FolderType::Important)
}
