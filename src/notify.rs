//! Fire-and-forget downstream indexing after a successful batch.
//!
//! `notify_batch` hands the work to a bounded queue consumed by a detached
//! worker; the sync path never awaits it. Indexer failures are logged and
//! swallowed, and a full queue drops the notification rather than block.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const QUEUE_CAPACITY: usize = 16;

/// Downstream semantic-indexing collaborator. Both calls may fail
/// independently; neither failure reaches the sync caller.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn process_and_embed(&self) -> anyhow::Result<()>;
    async fn rebuild_index(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct BackgroundNotifier {
    tx: mpsc::Sender<usize>,
}

impl BackgroundNotifier {
    pub fn spawn(indexer: Arc<dyn Indexer>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<usize>(QUEUE_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(count) = rx.recv().await {
                debug!(count, "Indexing batch");
                if let Err(e) = indexer.process_and_embed().await {
                    warn!(error = %e, "Content processing failed");
                    continue;
                }
                if let Err(e) = indexer.rebuild_index().await {
                    warn!(error = %e, "Index rebuild failed");
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Non-blocking; a full queue drops the notification with a warning.
    pub fn notify_batch(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Err(e) = self.tx.try_send(count) {
            warn!(count, error = %e, "Indexing queue full, dropping notification");
        }
    }
}

/// HTTP-backed indexer for a locally running embedding/graph service.
pub struct HttpIndexer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIndexer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Indexer for HttpIndexer {
    async fn process_and_embed(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/process-and-embed", self.base_url))
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }

    async fn rebuild_index(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/rebuild-index", self.base_url))
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }
}

/// Used when no indexer endpoint is configured.
pub struct NoopIndexer;

#[async_trait]
impl Indexer for NoopIndexer {
    async fn process_and_embed(&self) -> anyhow::Result<()> {
        info!("No indexer configured, skipping content processing");
        Ok(())
    }

    async fn rebuild_index(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
