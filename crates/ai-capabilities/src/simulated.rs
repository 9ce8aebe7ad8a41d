//! Configurable in-process host. Used by the demo binary and by tests that
//! need to observe how often the host is probed, asked to download, or asked
//! to create sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::HostError;
use crate::family::CapabilityFamily;
use crate::host::{
    AssistantSession, CreateOptions, DetectorSession, HostAvailability, HostBinding,
    HostCapabilities, HostEnvironment, HostSession, ModelDownloader, SummarizerSession,
    TranslateOptions, TranslatorSession,
};

/// Where a surface exposes its download operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadScope {
    Capabilities,
    Binding,
    None,
}

#[derive(Debug, Default)]
struct Counters {
    probes: AtomicUsize,
    downloads: AtomicUsize,
    creates: AtomicUsize,
    calls: AtomicUsize,
}

#[derive(Debug)]
struct SurfaceBehaviour {
    availability: Option<HostAvailability>,
    download_scope: DownloadScope,
    download_error: Option<String>,
    download_delay: Option<Duration>,
    create_failures: VecDeque<String>,
    call_failures: VecDeque<String>,
    response: Option<Value>,
}

/// One simulated capability surface.
#[derive(Debug)]
pub struct SimulatedSurface {
    family: CapabilityFamily,
    provider: String,
    behaviour: Mutex<SurfaceBehaviour>,
    counters: Counters,
}

impl SimulatedSurface {
    /// A ready surface with a capabilities probe and a capabilities-scoped
    /// download.
    pub fn new(family: CapabilityFamily, provider: impl Into<String>) -> Self {
        Self {
            family,
            provider: provider.into(),
            behaviour: Mutex::new(SurfaceBehaviour {
                availability: Some(HostAvailability::Readily),
                download_scope: DownloadScope::Capabilities,
                download_error: None,
                download_delay: None,
                create_failures: VecDeque::new(),
                call_failures: VecDeque::new(),
                response: None,
            }),
            counters: Counters::default(),
        }
    }

    pub fn with_availability(self, availability: HostAvailability) -> Self {
        self.update(|behaviour| behaviour.availability = Some(availability));
        self
    }

    /// Removes the capabilities probe.
    pub fn without_probe(self) -> Self {
        self.update(|behaviour| behaviour.availability = None);
        self
    }

    pub fn with_download_scope(self, scope: DownloadScope) -> Self {
        self.update(|behaviour| behaviour.download_scope = scope);
        self
    }

    pub fn with_download_delay(self, delay: Duration) -> Self {
        self.update(|behaviour| behaviour.download_delay = Some(delay));
        self
    }

    pub fn failing_download(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.update(|behaviour| behaviour.download_error = Some(message));
        self
    }

    /// Raw value returned by summarize / detect / translate instead of the
    /// built-in canned output.
    pub fn responding_with(self, response: Value) -> Self {
        self.update(|behaviour| behaviour.response = Some(response));
        self
    }

    /// Makes the next `create` call fail with `message`.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|behaviour| behaviour.create_failures.push_back(message));
    }

    /// Makes the next session call fail with `message`.
    pub fn fail_next_call(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|behaviour| behaviour.call_failures.push_back(message));
    }

    pub fn set_response(&self, response: Value) {
        self.update(|behaviour| behaviour.response = Some(response));
    }

    pub fn probe_calls(&self) -> usize {
        self.counters.probes.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.counters.downloads.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn invocation_calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    fn update(&self, apply: impl FnOnce(&mut SurfaceBehaviour)) {
        let mut behaviour = self
            .behaviour
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut behaviour);
    }

    fn read<R>(&self, inspect: impl FnOnce(&SurfaceBehaviour) -> R) -> R {
        let behaviour = self
            .behaviour
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inspect(&behaviour)
    }

    fn take_call_failure(&self) -> Result<(), HostError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let failure = {
            let mut behaviour = self
                .behaviour
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            behaviour.call_failures.pop_front()
        };
        match failure {
            Some(message) => Err(HostError::new(message)),
            None => Ok(()),
        }
    }
}

/// A host whose namespaces are populated explicitly.
#[derive(Debug, Default)]
pub struct SimulatedHost {
    surfaces: RwLock<HashMap<String, Arc<SimulatedSurface>>>,
    lookups: AtomicUsize,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `surface` at `path` and returns a handle for assertions.
    pub fn install(
        &self,
        path: impl Into<String>,
        surface: SimulatedSurface,
    ) -> Arc<SimulatedSurface> {
        let surface = Arc::new(surface);
        self.surfaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), surface.clone());
        surface
    }

    pub fn remove(&self, path: &str) -> Option<Arc<SimulatedSurface>> {
        self.surfaces
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path)
    }

    /// Number of `lookup` calls that found a surface.
    pub fn successful_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl HostEnvironment for SimulatedHost {
    fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
        let surface = self
            .surfaces
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(SimulatedBinding { surface }))
    }
}

struct SimulatedBinding {
    surface: Arc<SimulatedSurface>,
}

#[async_trait]
impl HostBinding for SimulatedBinding {
    fn provider(&self) -> &str {
        &self.surface.provider
    }

    fn has_capabilities_probe(&self) -> bool {
        self.surface.read(|behaviour| behaviour.availability.is_some())
    }

    async fn capabilities(&self) -> Result<HostCapabilities, HostError> {
        self.surface.counters.probes.fetch_add(1, Ordering::SeqCst);
        let (availability, scope) = self
            .surface
            .read(|behaviour| (behaviour.availability, behaviour.download_scope));
        let availability =
            availability.ok_or_else(|| HostError::new("capabilities is not a function"))?;
        let mut capabilities = HostCapabilities::new(availability);
        if scope == DownloadScope::Capabilities {
            capabilities = capabilities.with_downloader(Arc::new(SimulatedDownload {
                surface: self.surface.clone(),
            }));
        }
        Ok(capabilities)
    }

    async fn create(&self, options: &CreateOptions) -> Result<HostSession, HostError> {
        self.surface.counters.creates.fetch_add(1, Ordering::SeqCst);
        let failure = {
            let mut behaviour = self
                .surface
                .behaviour
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            behaviour.create_failures.pop_front()
        };
        if let Some(message) = failure {
            return Err(HostError::new(message));
        }

        let session = SimulatedSession {
            surface: self.surface.clone(),
            options: options.clone(),
        };
        Ok(match self.surface.family {
            CapabilityFamily::Assistant => HostSession::Assistant(Arc::new(session)),
            CapabilityFamily::Summarizer => HostSession::Summarizer(Arc::new(session)),
            CapabilityFamily::LanguageDetector => HostSession::LanguageDetector(Arc::new(session)),
            CapabilityFamily::Translator => HostSession::Translator(Arc::new(session)),
        })
    }

    fn downloader(&self) -> Option<Arc<dyn ModelDownloader>> {
        let scope = self.surface.read(|behaviour| behaviour.download_scope);
        (scope == DownloadScope::Binding).then(|| {
            Arc::new(SimulatedDownload {
                surface: self.surface.clone(),
            }) as Arc<dyn ModelDownloader>
        })
    }
}

struct SimulatedDownload {
    surface: Arc<SimulatedSurface>,
}

#[async_trait]
impl ModelDownloader for SimulatedDownload {
    async fn download_model(&self) -> Result<(), HostError> {
        self.surface.counters.downloads.fetch_add(1, Ordering::SeqCst);
        let (delay, error) = self
            .surface
            .read(|behaviour| (behaviour.download_delay, behaviour.download_error.clone()));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(HostError::new(message));
        }
        self.surface.update(|behaviour| {
            if behaviour.availability.is_some() {
                behaviour.availability = Some(HostAvailability::Readily);
            }
        });
        Ok(())
    }
}

struct SimulatedSession {
    surface: Arc<SimulatedSurface>,
    options: CreateOptions,
}

impl SimulatedSession {
    fn canned(&self) -> Option<Value> {
        self.surface.read(|behaviour| behaviour.response.clone())
    }
}

#[async_trait]
impl AssistantSession for SimulatedSession {
    async fn prompt(&self, text: &str) -> Result<String, HostError> {
        self.surface.take_call_failure()?;
        Ok(match self.canned() {
            Some(Value::String(reply)) => reply,
            Some(other) => other.to_string(),
            None => format!("[{}] {}", self.surface.provider, text),
        })
    }
}

#[async_trait]
impl SummarizerSession for SimulatedSession {
    async fn summarize(&self, text: &str) -> Result<Value, HostError> {
        self.surface.take_call_failure()?;
        Ok(self.canned().unwrap_or_else(|| {
            let first_sentence = text
                .split_inclusive(['.', '!', '?'])
                .next()
                .unwrap_or(text)
                .trim();
            json!({ "text": first_sentence })
        }))
    }
}

#[async_trait]
impl DetectorSession for SimulatedSession {
    async fn detect(&self, _text: &str) -> Result<Value, HostError> {
        self.surface.take_call_failure()?;
        Ok(self
            .canned()
            .unwrap_or_else(|| json!({ "languages": [{ "language": "en", "confidence": 1.0 }] })))
    }
}

#[async_trait]
impl TranslatorSession for SimulatedSession {
    async fn translate(&self, text: &str, options: &TranslateOptions) -> Result<Value, HostError> {
        self.surface.take_call_failure()?;
        if let Some(created_for) = &self.options.target_language {
            if *created_for != options.target_language {
                return Err(HostError::new(format!(
                    "translator created for {created_for} cannot translate to {}",
                    options.target_language
                )));
            }
        }
        Ok(self.canned().unwrap_or_else(|| {
            let detected = options.source_language.as_deref().unwrap_or("en");
            json!({
                "translatedText": format!("[{}] {}", options.target_language, text),
                "detectedSourceLanguage": detected,
            })
        }))
    }
}
