use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::cli::Cli;
use crate::config::AppDefaults;
use crate::mail::ImapTransport;
use crate::notify::{BackgroundNotifier, HttpIndexer, Indexer, NoopIndexer};
use crate::parse::AttachmentStore;
use crate::storage::Database;
use crate::sync::SyncEngine;
use crate::types::{FolderType, SyncAllOptions};

pub async fn run(cli: Cli) -> Result<()> {
    let defaults = AppDefaults::load()?;
    let db = Database::connect(&defaults.db_path())
        .await
        .context("opening SQLite store")?;
    info!(path = %db.path().display(), "Using SQLite store");

    if cli.add_account {
        let account = add_account_from_env(&db).await?;
        info!(account = account.id, email = %account.email, "Account registered");
    }

    let accounts = db.list_accounts().await?;
    if accounts.is_empty() {
        bail!("no accounts configured; run with --add-account and MAILSINK_EMAIL/MAILSINK_PASSWORD set");
    }

    let indexer: Arc<dyn Indexer> = match &defaults.indexer_url {
        Some(url) => Arc::new(HttpIndexer::new(url.clone())),
        None => Arc::new(NoopIndexer),
    };
    let (notifier, indexer_worker) = BackgroundNotifier::spawn(indexer);

    let engine = SyncEngine::new(db, Arc::new(ImapTransport), notifier)
        .with_attachment_store(AttachmentStore::new(defaults.attachments_dir()));

    let limit = cli.limit.unwrap_or(defaults.message_limit);
    for account in &accounts {
        if let Some(folder) = &cli.folder {
            let result = engine.sync_folder(account, folder, limit).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                continue;
            }
            println!(
                "{}: {} synced, {} already known, {} errors",
                result.folder_name,
                result.synced_count,
                result.skipped_count,
                result.errors.len()
            );
        } else {
            let options = SyncAllOptions {
                folder_types: if cli.all_folders {
                    vec![FolderType::All]
                } else {
                    defaults.sync_folder_types.clone()
                },
                message_limit: limit,
                skip_empty: true,
            };
            let results = engine.sync_all_folders(account, &options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                continue;
            }
            println!(
                "{}: {} messages across {} folders ({} folder failures)",
                account.email,
                results.total_messages,
                results.folder_count,
                results.errors.len()
            );
            for outcome in &results.folder_results {
                println!(
                    "  {:<30} {:>4} synced  ({})",
                    outcome.folder_path,
                    outcome.result.synced_count,
                    outcome.folder_type.as_str()
                );
            }
            for failure in &results.errors {
                println!("  {:<30} FAILED: {}", failure.folder_path, failure.error);
            }
        }
    }

    // Dropping the engine closes the notification queue; wait for the worker
    // to drain it so the last batch isn't lost on exit.
    drop(engine);
    indexer_worker.await.context("joining indexer worker")?;

    Ok(())
}

async fn add_account_from_env(db: &Database) -> Result<crate::types::Account> {
    let email = env::var("MAILSINK_EMAIL").context("MAILSINK_EMAIL not set")?;
    let password = env::var("MAILSINK_PASSWORD").context("MAILSINK_PASSWORD not set")?;
    let host = env::var("MAILSINK_IMAP_HOST").context("MAILSINK_IMAP_HOST not set")?;
    let port = env::var("MAILSINK_IMAP_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(993);

    db.upsert_account(&email, &password, &host, port)
        .await
        .context("saving account")
}
