use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::error::CapabilityError;
use crate::family::CapabilityFamily;

/// What the user is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub family: CapabilityFamily,
    pub provider: String,
}

/// Hooks run during a download negotiation, in this order:
/// `request_download_permission`, then `on_download_start`, then exactly one
/// of `on_download_complete` / `on_download_error`.
#[async_trait]
pub trait ConsentHooks: Send + Sync {
    /// May suspend indefinitely while a person decides. An `Err` counts as a
    /// decline.
    async fn request_download_permission(&self, request: &DownloadRequest) -> Result<bool>;

    fn on_download_start(&self, _request: &DownloadRequest) {}

    fn on_download_complete(&self, _request: &DownloadRequest) {}

    fn on_download_error(&self, _request: &DownloadRequest, _error: &CapabilityError) {}
}

/// Default hooks for non-interactive environments: every download is declined.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineDownloads;

#[async_trait]
impl ConsentHooks for DeclineDownloads {
    async fn request_download_permission(&self, _request: &DownloadRequest) -> Result<bool> {
        Ok(false)
    }
}

/// Grants every download without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowDownloads;

#[async_trait]
impl ConsentHooks for AllowDownloads {
    async fn request_download_permission(&self, _request: &DownloadRequest) -> Result<bool> {
        Ok(true)
    }
}

/// Tracks consent prompts awaiting an answer from the UI layer.
#[derive(Debug)]
pub struct ConsentBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

impl ConsentBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(&self) -> (String, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4().to_string();
        self.pending().insert(id.clone(), tx);
        (id, rx)
    }

    pub fn resolve(&self, request_id: &str, approved: bool) -> Result<()> {
        let sender = self
            .pending()
            .remove(request_id)
            .ok_or_else(|| anyhow!("unknown consent request: {}", request_id))?;
        let _ = sender.send(approved);
        Ok(())
    }

    /// Drops a prompt nobody is waiting on any more. Returns whether it was
    /// still pending.
    pub fn withdraw(&self, request_id: &str) -> bool {
        self.pending().remove(request_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<bool>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Withdraws the prompt when the wait ends without an answer, including when
/// the waiting future is dropped by cancellation.
struct PendingPrompt<'a> {
    broker: &'a ConsentBroker,
    id: String,
}

impl Drop for PendingPrompt<'_> {
    fn drop(&mut self) {
        if self.broker.withdraw(&self.id) {
            debug!(
                target: "ai_capabilities::consent",
                request_id = %self.id,
                "consent prompt withdrawn without an answer"
            );
        }
    }
}

/// Prompt published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsentPrompt {
    pub id: String,
    pub request: DownloadRequest,
}

/// Consent hooks that publish each request to the UI and wait for the answer
/// delivered through [`ConsentBroker::resolve`].
pub struct BrokeredConsent {
    broker: Arc<ConsentBroker>,
    prompts: mpsc::UnboundedSender<ConsentPrompt>,
    timeout: Duration,
}

impl BrokeredConsent {
    pub fn new(
        broker: Arc<ConsentBroker>,
        prompts: mpsc::UnboundedSender<ConsentPrompt>,
    ) -> Arc<Self> {
        Arc::new(Self {
            broker,
            prompts,
            timeout: Duration::from_secs(60),
        })
    }

    pub fn with_timeout(
        broker: Arc<ConsentBroker>,
        prompts: mpsc::UnboundedSender<ConsentPrompt>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            broker,
            prompts,
            timeout,
        })
    }
}

#[async_trait]
impl ConsentHooks for BrokeredConsent {
    async fn request_download_permission(&self, request: &DownloadRequest) -> Result<bool> {
        let (request_id, receiver) = self.broker.register();
        let _pending = PendingPrompt {
            broker: &self.broker,
            id: request_id.clone(),
        };
        self.prompts
            .send(ConsentPrompt {
                id: request_id,
                request: request.clone(),
            })
            .map_err(|_| anyhow!("consent prompt channel closed"))?;

        // Unanswered prompts decline once the timeout elapses.
        match timeout(self.timeout, receiver).await {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }
}
