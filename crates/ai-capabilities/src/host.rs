//! Boundary contract consumed from the host environment.
//!
//! A host publishes capability surfaces under dotted paths (for example
//! `ai.summarizer`). Each surface is a [`HostBinding`]: a factory that can
//! create sessions and, on some hosts, report availability and download the
//! backing model. Sessions return raw JSON values for the shape-unstable
//! operations; normalisation happens in [`crate::normalize`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostError;
use crate::family::CapabilityFamily;

/// Availability as reported by a host capabilities probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostAvailability {
    #[serde(alias = "unavailable")]
    No,
    #[serde(alias = "downloadable", alias = "downloading")]
    AfterDownload,
    #[serde(alias = "available")]
    Readily,
}

/// Triggers the one-time model fetch for a surface.
#[async_trait]
pub trait ModelDownloader: Send + Sync {
    async fn download_model(&self) -> Result<(), HostError>;
}

/// Result of a capabilities probe. The probe result may carry its own
/// download operation, which takes precedence over the binding's.
#[derive(Clone)]
pub struct HostCapabilities {
    pub available: HostAvailability,
    pub downloader: Option<Arc<dyn ModelDownloader>>,
}

impl HostCapabilities {
    pub fn new(available: HostAvailability) -> Self {
        Self {
            available,
            downloader: None,
        }
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn ModelDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("available", &self.available)
            .field("downloader", &self.downloader.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryType {
    #[serde(rename = "tl;dr", alias = "tldr")]
    Tldr,
    #[serde(rename = "key-points")]
    KeyPoints,
    #[serde(rename = "teaser")]
    Teaser,
    #[serde(rename = "headline")]
    Headline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryFormat {
    PlainText,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

/// Options passed to a binding's `create` call. Unset fields are left to the
/// host's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_type: Option<SummaryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_format: Option<SummaryFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_length: Option<SummaryLength>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

impl CreateOptions {
    /// Field-wise merge where values set in `overrides` win.
    pub fn merged_with(&self, overrides: &CreateOptions) -> CreateOptions {
        CreateOptions {
            system_prompt: overrides
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone()),
            temperature: overrides.temperature.or(self.temperature),
            top_k: overrides.top_k.or(self.top_k),
            summary_type: overrides.summary_type.or(self.summary_type),
            summary_format: overrides.summary_format.or(self.summary_format),
            summary_length: overrides.summary_length.or(self.summary_length),
            shared_context: overrides
                .shared_context
                .clone()
                .or_else(|| self.shared_context.clone()),
            source_language: overrides
                .source_language
                .clone()
                .or_else(|| self.source_language.clone()),
            target_language: overrides
                .target_language
                .clone()
                .or_else(|| self.target_language.clone()),
        }
    }
}

/// Per-call translation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateOptions {
    pub source_language: Option<String>,
    pub target_language: String,
}

#[async_trait]
pub trait AssistantSession: Send + Sync {
    async fn prompt(&self, text: &str) -> Result<String, HostError>;
}

#[async_trait]
pub trait SummarizerSession: Send + Sync {
    /// Returns a string or `{ "text": ... }`.
    async fn summarize(&self, text: &str) -> Result<Value, HostError>;
}

#[async_trait]
pub trait DetectorSession: Send + Sync {
    /// Returns `{ "languages": [...] }`, `{ "detectedLanguage", "confidence" }`
    /// or a bare candidate list.
    async fn detect(&self, text: &str) -> Result<Value, HostError>;
}

#[async_trait]
pub trait TranslatorSession: Send + Sync {
    /// Returns a string or an object carrying `text` / `translatedText`.
    async fn translate(&self, text: &str, options: &TranslateOptions) -> Result<Value, HostError>;
}

/// A live instance returned by a binding's `create` call.
#[derive(Clone)]
pub enum HostSession {
    Assistant(Arc<dyn AssistantSession>),
    Summarizer(Arc<dyn SummarizerSession>),
    LanguageDetector(Arc<dyn DetectorSession>),
    Translator(Arc<dyn TranslatorSession>),
}

impl HostSession {
    pub fn family(&self) -> CapabilityFamily {
        match self {
            HostSession::Assistant(_) => CapabilityFamily::Assistant,
            HostSession::Summarizer(_) => CapabilityFamily::Summarizer,
            HostSession::LanguageDetector(_) => CapabilityFamily::LanguageDetector,
            HostSession::Translator(_) => CapabilityFamily::Translator,
        }
    }

    /// Whether both handles point at the same host instance.
    pub fn same_instance(&self, other: &HostSession) -> bool {
        match (self, other) {
            (HostSession::Assistant(a), HostSession::Assistant(b)) => same_arc(a, b),
            (HostSession::Summarizer(a), HostSession::Summarizer(b)) => same_arc(a, b),
            (HostSession::LanguageDetector(a), HostSession::LanguageDetector(b)) => {
                same_arc(a, b)
            }
            (HostSession::Translator(a), HostSession::Translator(b)) => same_arc(a, b),
            _ => false,
        }
    }
}

fn same_arc<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl fmt::Debug for HostSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostSession::{}", self.family())
    }
}

/// A host object implementing one capability family.
#[async_trait]
pub trait HostBinding: Send + Sync {
    /// Name reported as the `source` of successful invocations.
    fn provider(&self) -> &str;

    /// Presence check for the `capabilities()` probe. Never invokes it.
    fn has_capabilities_probe(&self) -> bool {
        false
    }

    async fn capabilities(&self) -> Result<HostCapabilities, HostError> {
        Err(HostError::new("capabilities is not a function"))
    }

    async fn create(&self, options: &CreateOptions) -> Result<HostSession, HostError>;

    /// Binding-scoped download operation, if the surface has one.
    fn downloader(&self) -> Option<Arc<dyn ModelDownloader>> {
        None
    }
}

/// Read-only view of the namespaces a host exposes.
pub trait HostEnvironment: Send + Sync {
    /// Returns the surface published at `path`, if present. Must not invoke
    /// anything on the host.
    fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>>;
}
