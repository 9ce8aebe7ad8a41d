use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityState, CapabilityCache};
use crate::consent::{ConsentHooks, DownloadRequest};
use crate::error::{CapabilityError, Result};
use crate::family::CapabilityFamily;
use crate::resolver::Binding;

/// Runs the availability / consent / download state machine for a family.
pub struct DownloadController {
    hooks: Arc<dyn ConsentHooks>,
    timeout: Option<Duration>,
    locks: HashMap<CapabilityFamily, Mutex<()>>,
}

impl DownloadController {
    pub fn new(hooks: Arc<dyn ConsentHooks>, timeout: Option<Duration>) -> Self {
        let locks = CapabilityFamily::ALL
            .into_iter()
            .map(|family| (family, Mutex::new(())))
            .collect();
        Self {
            hooks,
            timeout,
            locks,
        }
    }

    /// Drives one negotiation attempt and returns a usable state, or the
    /// failure that ended the attempt. Concurrent attempts for one family are
    /// serialised so a second caller observes the first one's download.
    ///
    /// Cancelling `cancel` ends the attempt with [`CapabilityError::Aborted`]
    /// at any stage. Once `on_download_start` has run, `on_download_error`
    /// runs before the abort is returned.
    pub async fn negotiate(
        &self,
        binding: &Binding,
        cache: &CapabilityCache,
        cancel: &CancellationToken,
    ) -> Result<AvailabilityState> {
        let family = binding.family();
        let _guard = match self.locks.get(&family) {
            Some(lock) => Some(abortable(cancel, lock.lock()).await?),
            None => None,
        };

        let state = abortable(cancel, cache.availability(binding)).await??;
        match state {
            AvailabilityState::No => Err(CapabilityError::Unavailable { family }),
            AvailabilityState::AfterDownload => {
                self.download_with_consent(binding, cache, cancel).await
            }
            AvailabilityState::Readily
            | AvailabilityState::FactoryOnly
            | AvailabilityState::Unknown => Ok(state),
        }
    }

    async fn download_with_consent(
        &self,
        binding: &Binding,
        cache: &CapabilityCache,
        cancel: &CancellationToken,
    ) -> Result<AvailabilityState> {
        let family = binding.family();
        let request = DownloadRequest {
            family,
            provider: binding.provider().to_string(),
        };

        let permission = self.hooks.request_download_permission(&request);
        let approved = match abortable(cancel, permission).await? {
            Ok(approved) => approved,
            Err(err) => {
                warn!(
                    target: "ai_capabilities::negotiation",
                    family = family.as_str(),
                    error = %err,
                    "consent hook failed, treating as declined"
                );
                false
            }
        };
        if !approved {
            info!(
                target: "ai_capabilities::negotiation",
                family = family.as_str(),
                "model download declined"
            );
            return Err(CapabilityError::DownloadDeclined { family });
        }

        self.hooks.on_download_start(&request);
        info!(
            target: "ai_capabilities::negotiation",
            family = family.as_str(),
            provider = %request.provider,
            "downloading on-device model"
        );
        let outcome = abortable(cancel, self.run_download(binding, cache))
            .await
            .and_then(|outcome| outcome);
        match outcome {
            Ok(()) => {
                self.hooks.on_download_complete(&request);
                cache.mark_readily(family).await;
                info!(
                    target: "ai_capabilities::negotiation",
                    family = family.as_str(),
                    "model download complete"
                );
                Ok(AvailabilityState::Readily)
            }
            Err(err) => {
                warn!(
                    target: "ai_capabilities::negotiation",
                    family = family.as_str(),
                    error = %err,
                    "model download failed"
                );
                self.hooks.on_download_error(&request, &err);
                Err(err)
            }
        }
    }

    async fn run_download(&self, binding: &Binding, cache: &CapabilityCache) -> Result<()> {
        let family = binding.family();
        let scoped = cache
            .capabilities(family)
            .await
            .and_then(|capabilities| capabilities.downloader);
        let downloader = match scoped {
            Some(downloader) => {
                debug!(
                    target: "ai_capabilities::negotiation",
                    family = family.as_str(),
                    "using capabilities-scoped download"
                );
                downloader
            }
            None => binding.handle().downloader().ok_or_else(|| {
                CapabilityError::DownloadFailed {
                    family,
                    cause: "host exposes no download operation".into(),
                }
            })?,
        };

        let download = downloader.download_model();
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, download).await.map_err(|_| {
                CapabilityError::DownloadFailed {
                    family,
                    cause: format!("download did not finish within {}s", limit.as_secs()),
                }
            })?,
            None => download.await,
        };

        outcome.map_err(|err| CapabilityError::DownloadFailed {
            family,
            cause: err.to_string(),
        })
    }
}

/// Races `work` against cancellation. Dropping `work` drops any pending host
/// call with it.
pub(crate) async fn abortable<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CapabilityError::Aborted),
        outcome = work => Ok(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::{AllowDownloads, DeclineDownloads};
    use crate::error::HostError;
    use crate::host::{
        CreateOptions, HostAvailability, HostBinding, HostCapabilities, HostEnvironment,
        HostSession, ModelDownloader,
    };
    use crate::resolver::{BindingResolver, StrategyTable};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingDownloader {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl ModelDownloader for CountingDownloader {
        async fn download_model(&self) -> std::result::Result<(), HostError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.fail_with {
                Some(message) => Err(HostError::new(message)),
                None => Ok(()),
            }
        }
    }

    struct DownloadableBinding {
        available: HostAvailability,
        scoped: Option<Arc<CountingDownloader>>,
        bound: Option<Arc<CountingDownloader>>,
    }

    #[async_trait]
    impl HostBinding for DownloadableBinding {
        fn provider(&self) -> &str {
            "test-host"
        }

        fn has_capabilities_probe(&self) -> bool {
            true
        }

        async fn capabilities(&self) -> std::result::Result<HostCapabilities, HostError> {
            let mut capabilities = HostCapabilities::new(self.available);
            if let Some(scoped) = &self.scoped {
                capabilities = capabilities.with_downloader(scoped.clone());
            }
            Ok(capabilities)
        }

        async fn create(
            &self,
            _options: &CreateOptions,
        ) -> std::result::Result<HostSession, HostError> {
            Err(HostError::new("unused"))
        }

        fn downloader(&self) -> Option<Arc<dyn ModelDownloader>> {
            self.bound
                .clone()
                .map(|downloader| downloader as Arc<dyn ModelDownloader>)
        }
    }

    struct OneSurface(Arc<DownloadableBinding>);

    impl HostEnvironment for OneSurface {
        fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
            (path == "ai.summarizer").then(|| self.0.clone() as Arc<dyn HostBinding>)
        }
    }

    fn binding(surface: DownloadableBinding) -> Binding {
        BindingResolver::new(Arc::new(OneSurface(Arc::new(surface))), StrategyTable::default())
            .resolve(CapabilityFamily::Summarizer)
            .unwrap()
    }

    #[derive(Default)]
    struct RecordingHooks {
        approve: bool,
        calls: StdMutex<Vec<&'static str>>,
    }

    impl RecordingHooks {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConsentHooks for RecordingHooks {
        async fn request_download_permission(
            &self,
            _request: &DownloadRequest,
        ) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push("permission");
            Ok(self.approve)
        }

        fn on_download_start(&self, _request: &DownloadRequest) {
            self.calls.lock().unwrap().push("start");
        }

        fn on_download_complete(&self, _request: &DownloadRequest) {
            self.calls.lock().unwrap().push("complete");
        }

        fn on_download_error(&self, _request: &DownloadRequest, _error: &CapabilityError) {
            self.calls.lock().unwrap().push("error");
        }
    }

    #[tokio::test]
    async fn declined_download_never_touches_downloader() {
        let scoped = Arc::new(CountingDownloader::default());
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped.clone()),
            bound: None,
        });
        let cache = CapabilityCache::new();
        let controller = DownloadController::new(Arc::new(DeclineDownloads), None);

        let err = controller
            .negotiate(&binding, &cache, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::DownloadDeclined { .. }));
        assert_eq!(scoped.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            cache.cached(CapabilityFamily::Summarizer).await,
            AvailabilityState::AfterDownload
        );
    }

    #[tokio::test]
    async fn hooks_run_in_documented_order() {
        let scoped = Arc::new(CountingDownloader::default());
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped.clone()),
            bound: None,
        });
        let cache = CapabilityCache::new();
        let hooks = Arc::new(RecordingHooks {
            approve: true,
            ..RecordingHooks::default()
        });
        let controller = DownloadController::new(hooks.clone(), None);

        let state = controller
            .negotiate(&binding, &cache, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(state, AvailabilityState::Readily);
        assert_eq!(hooks.calls(), vec!["permission", "start", "complete"]);

        // Already readily: no second prompt, no second download.
        controller
            .negotiate(&binding, &cache, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scoped.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.calls().len(), 3);
    }

    #[tokio::test]
    async fn capabilities_scoped_download_preferred_over_binding() {
        let scoped = Arc::new(CountingDownloader::default());
        let bound = Arc::new(CountingDownloader::default());
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped.clone()),
            bound: Some(bound.clone()),
        });
        let controller = DownloadController::new(Arc::new(AllowDownloads), None);
        controller
            .negotiate(&binding, &CapabilityCache::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scoped.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bound.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn binding_download_used_when_probe_has_none() {
        let bound = Arc::new(CountingDownloader::default());
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: None,
            bound: Some(bound.clone()),
        });
        let controller = DownloadController::new(Arc::new(AllowDownloads), None);
        controller
            .negotiate(&binding, &CapabilityCache::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bound.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_download_reports_error_hook_and_keeps_state() {
        let scoped = Arc::new(CountingDownloader {
            fail_with: Some("disk full"),
            ..CountingDownloader::default()
        });
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped),
            bound: None,
        });
        let cache = CapabilityCache::new();
        let hooks = Arc::new(RecordingHooks {
            approve: true,
            ..RecordingHooks::default()
        });
        let controller = DownloadController::new(hooks.clone(), None);

        let err = controller
            .negotiate(&binding, &cache, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            CapabilityError::DownloadFailed { cause, .. } => assert_eq!(cause, "disk full"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hooks.calls(), vec!["permission", "start", "error"]);
        assert_eq!(
            cache.cached(CapabilityFamily::Summarizer).await,
            AvailabilityState::AfterDownload
        );
    }

    #[tokio::test]
    async fn missing_download_operation_fails() {
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: None,
            bound: None,
        });
        let controller = DownloadController::new(Arc::new(AllowDownloads), None);
        let err = controller
            .negotiate(&binding, &CapabilityCache::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn probe_reporting_no_is_unavailable() {
        let binding = binding(DownloadableBinding {
            available: HostAvailability::No,
            scoped: None,
            bound: None,
        });
        let controller = DownloadController::new(Arc::new(AllowDownloads), None);
        let err = controller
            .negotiate(&binding, &CapabilityCache::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn download_is_bounded_by_timeout() {
        let scoped = Arc::new(CountingDownloader {
            delay: Some(Duration::from_secs(120)),
            ..CountingDownloader::default()
        });
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped),
            bound: None,
        });
        let controller =
            DownloadController::new(Arc::new(AllowDownloads), Some(Duration::from_secs(30)));
        let err = controller
            .negotiate(&binding, &CapabilityCache::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            CapabilityError::DownloadFailed { cause, .. } => assert!(cause.contains("30s")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_negotiations_download_once() {
        let scoped = Arc::new(CountingDownloader {
            delay: Some(Duration::from_millis(20)),
            ..CountingDownloader::default()
        });
        let binding = binding(DownloadableBinding {
            available: HostAvailability::AfterDownload,
            scoped: Some(scoped.clone()),
            bound: None,
        });
        let cache = CapabilityCache::new();
        let controller = DownloadController::new(Arc::new(AllowDownloads), None);

        let cancel = CancellationToken::new();
        let (first, second) = tokio::join!(
            controller.negotiate(&binding, &cache, &cancel),
            controller.negotiate(&binding, &cache, &cancel)
        );
        assert_eq!(first.unwrap(), AvailabilityState::Readily);
        assert_eq!(second.unwrap(), AvailabilityState::Readily);
        assert_eq!(scoped.calls.load(Ordering::SeqCst), 1);
    }
}
