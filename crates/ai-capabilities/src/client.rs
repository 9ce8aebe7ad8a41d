use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::availability::{AvailabilityState, CapabilityCache};
use crate::classify::classify;
use crate::config::{ClientConfig, SettingsProvider};
use crate::consent::{ConsentHooks, DeclineDownloads};
use crate::envelope::InvocationResult;
use crate::error::{CapabilityError, Result};
use crate::family::CapabilityFamily;
use crate::host::{CreateOptions, HostEnvironment, HostSession, TranslateOptions};
use crate::negotiation::{abortable, DownloadController};
use crate::normalize::{
    normalize_detection, normalize_summary, normalize_translation, DetectedLanguage, Translation,
};
use crate::resolver::{Binding, BindingResolver};
use crate::sessions::SessionCache;

/// Per-call knobs shared by all four operations.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Skip the cached session and create a fresh one.
    pub force_new: bool,
    pub cancel: Option<CancellationToken>,
    /// Merged over the configured defaults for the family.
    pub create: CreateOptions,
}

impl InvokeOptions {
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_create_options(mut self, create: CreateOptions) -> Self {
        self.create = create;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    pub source_language: Option<String>,
    /// Falls back to the settings provider when unset.
    pub target_language: Option<String>,
}

impl TranslateRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn with_source(mut self, language: impl Into<String>) -> Self {
        self.source_language = Some(language.into());
        self
    }
}

/// Entry point for the four on-device AI operations. Owns the binding,
/// availability and session caches for one host.
pub struct CapabilityClient {
    resolver: BindingResolver,
    bindings: Mutex<HashMap<CapabilityFamily, Binding>>,
    capabilities: CapabilityCache,
    downloads: DownloadController,
    sessions: SessionCache,
    settings: Arc<dyn SettingsProvider>,
    config: ClientConfig,
}

impl CapabilityClient {
    pub fn builder(host: Arc<dyn HostEnvironment>) -> CapabilityClientBuilder {
        CapabilityClientBuilder::new(host)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn prompt(&self, text: &str, options: InvokeOptions) -> InvocationResult<String> {
        let family = CapabilityFamily::Assistant;
        if let Err(err) = require_text(text) {
            return self.fail(family, err).await;
        }
        self.invoke(family, &options, |session| async move {
            match session {
                HostSession::Assistant(assistant) => Ok(assistant.prompt(text).await?),
                other => Err(mismatch(family, &other)),
            }
        })
        .await
    }

    pub async fn summarize(&self, text: &str, options: InvokeOptions) -> InvocationResult<String> {
        let family = CapabilityFamily::Summarizer;
        if let Err(err) = require_text(text) {
            return self.fail(family, err).await;
        }
        self.invoke(family, &options, |session| async move {
            match session {
                HostSession::Summarizer(summarizer) => {
                    normalize_summary(summarizer.summarize(text).await?)
                }
                other => Err(mismatch(family, &other)),
            }
        })
        .await
    }

    pub async fn detect_language(
        &self,
        text: &str,
        options: InvokeOptions,
    ) -> InvocationResult<DetectedLanguage> {
        let family = CapabilityFamily::LanguageDetector;
        if let Err(err) = require_text(text) {
            return self.fail(family, err).await;
        }
        self.invoke(family, &options, |session| async move {
            match session {
                HostSession::LanguageDetector(detector) => {
                    normalize_detection(detector.detect(text).await?)
                }
                other => Err(mismatch(family, &other)),
            }
        })
        .await
    }

    pub async fn translate(
        &self,
        request: TranslateRequest,
        options: InvokeOptions,
    ) -> InvocationResult<Translation> {
        let family = CapabilityFamily::Translator;
        let translate = match self.validate_translation(&request) {
            Ok(translate) => translate,
            Err(err) => return self.fail(family, err).await,
        };

        let mut options = options;
        options.create.source_language = translate.source_language.clone();
        options.create.target_language = Some(translate.target_language.clone());

        let text = request.text.as_str();
        let translate = &translate;
        self.invoke(family, &options, |session| async move {
            match session {
                HostSession::Translator(translator) => {
                    let raw = translator.translate(text, translate).await?;
                    normalize_translation(
                        raw,
                        translate.source_language.clone(),
                        translate.target_language.clone(),
                    )
                }
                other => Err(mismatch(family, &other)),
            }
        })
        .await
    }

    /// Drops the cached binding, availability and session for `family`; the
    /// next call resolves and negotiates from scratch.
    pub async fn reset(&self, family: CapabilityFamily) {
        self.bindings.lock().await.remove(&family);
        self.capabilities.clear(family).await;
        self.sessions.invalidate(family).await;
    }

    pub async fn availability(&self, family: CapabilityFamily) -> AvailabilityState {
        self.capabilities.cached(family).await
    }

    pub async fn has_cached_binding(&self, family: CapabilityFamily) -> bool {
        self.bindings.lock().await.contains_key(&family)
    }

    pub async fn has_cached_session(&self, family: CapabilityFamily) -> bool {
        self.sessions.contains(family).await
    }

    fn validate_translation(&self, request: &TranslateRequest) -> Result<TranslateOptions> {
        require_text(&request.text)?;
        let limit = self.config.max_translation_chars;
        let actual = request.text.chars().count();
        if actual > limit {
            return Err(CapabilityError::InputTooLarge { actual, limit });
        }

        let target_language = request
            .target_language
            .clone()
            .or_else(|| self.settings.target_language())
            .map(|language| language.trim().to_string())
            .filter(|language| !language.is_empty())
            .ok_or_else(|| CapabilityError::validation("a target language is required"))?;
        let source_language = request
            .source_language
            .as_deref()
            .map(str::trim)
            .filter(|language| !language.is_empty())
            .map(str::to_string);

        Ok(TranslateOptions {
            source_language,
            target_language,
        })
    }

    async fn invoke<T, F, Fut>(
        &self,
        family: CapabilityFamily,
        options: &InvokeOptions,
        call: F,
    ) -> InvocationResult<T>
    where
        F: FnOnce(HostSession) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cancel = options.cancel.clone().unwrap_or_default();
        let outcome: Result<(T, String)> = async {
            if cancel.is_cancelled() {
                return Err(CapabilityError::Aborted);
            }
            let binding = self
                .binding(family)
                .await
                .ok_or(CapabilityError::Unavailable { family })?;
            // Negotiation races `cancel` itself and pairs the download hooks.
            self.downloads
                .negotiate(&binding, &self.capabilities, &cancel)
                .await?;
            let create = self
                .config
                .create_options_for(family)
                .merged_with(&options.create);
            let value = abortable(&cancel, async {
                let session = self
                    .sessions
                    .get_or_create(&binding, &create, options.force_new)
                    .await?;
                call(session).await
            })
            .await??;
            Ok((value, binding.provider().to_string()))
        }
        .await;

        match outcome {
            Ok((value, source)) => {
                debug!(
                    target: "ai_capabilities::client",
                    family = family.as_str(),
                    %source,
                    "invocation succeeded"
                );
                InvocationResult::success(value, source)
            }
            Err(err) => self.fail(family, err).await,
        }
    }

    async fn binding(&self, family: CapabilityFamily) -> Option<Binding> {
        let mut bindings = self.bindings.lock().await;
        if let Some(binding) = bindings.get(&family) {
            return Some(binding.clone());
        }
        let binding = self.resolver.resolve(family)?;
        bindings.insert(family, binding.clone());
        Some(binding)
    }

    async fn fail<T>(&self, family: CapabilityFamily, err: CapabilityError) -> InvocationResult<T> {
        let classification = classify(&err);
        if err.resets_binding() {
            self.reset(family).await;
        }
        warn!(
            target: "ai_capabilities::client",
            family = family.as_str(),
            category = classification.category.as_str(),
            retryable = classification.retryable,
            error = %err,
            "invocation failed"
        );
        let cause = match &err {
            CapabilityError::Validation(_) => None,
            other => Some(other.to_string()),
        };
        InvocationResult::failure(classification, cause)
    }
}

/// Assembles a [`CapabilityClient`]. Downloads are declined unless consent
/// hooks are supplied.
pub struct CapabilityClientBuilder {
    host: Arc<dyn HostEnvironment>,
    config: ClientConfig,
    hooks: Arc<dyn ConsentHooks>,
    settings: Option<Arc<dyn SettingsProvider>>,
}

impl CapabilityClientBuilder {
    fn new(host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            host,
            config: ClientConfig::default(),
            hooks: Arc::new(DeclineDownloads),
            settings: None,
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_consent_hooks(mut self, hooks: Arc<dyn ConsentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Defaults to the client config itself.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> CapabilityClient {
        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(self.config.clone()));
        CapabilityClient {
            resolver: BindingResolver::new(self.host, self.config.strategy_table()),
            bindings: Mutex::new(HashMap::new()),
            capabilities: CapabilityCache::new(),
            downloads: DownloadController::new(
                self.hooks,
                self.config.download_timeout(),
            ),
            sessions: SessionCache::new(),
            settings,
            config: self.config,
        }
    }
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(CapabilityError::validation("text must not be empty"));
    }
    Ok(())
}

fn mismatch(expected: CapabilityFamily, session: &HostSession) -> CapabilityError {
    CapabilityError::SessionMismatch {
        expected,
        actual: session.family(),
    }
}
