//! Capability negotiation and resilient invocation for on-device AI.
//!
//! Hosts expose prompting, summarization, language detection and translation
//! through surfaces that may be missing, shaped differently across versions,
//! or gated behind a one-time model download. [`CapabilityClient`] discovers
//! the surface for each family, negotiates the download with user consent,
//! reuses sessions, and reduces every outcome to an [`InvocationResult`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use ai_capabilities::{AllowDownloads, CapabilityClient, InvokeOptions};
//!
//! # async fn demo(host: Arc<dyn ai_capabilities::HostEnvironment>) {
//! let client = CapabilityClient::builder(host)
//!     .with_consent_hooks(Arc::new(AllowDownloads))
//!     .build();
//! let summary = client.summarize("A long article ...", InvokeOptions::default()).await;
//! if let Some(failure) = summary.failure_details() {
//!     println!("{} (retryable: {})", failure.message, failure.retryable);
//! }
//! # }
//! ```

pub mod availability;
pub mod classify;
pub mod client;
pub mod config;
pub mod consent;
pub mod envelope;
mod error;
pub mod family;
pub mod host;
pub mod language_model;
pub mod negotiation;
pub mod normalize;
pub mod resolver;
pub mod sessions;
pub mod simulated;

pub use availability::{AvailabilityState, CapabilityCache};
pub use classify::{classify, classify_message, Classification, ErrorCategory};
pub use client::{CapabilityClient, CapabilityClientBuilder, InvokeOptions, TranslateRequest};
pub use config::{ClientConfig, ConfigError, SettingsProvider};
pub use consent::{
    AllowDownloads, BrokeredConsent, ConsentBroker, ConsentHooks, ConsentPrompt,
    DeclineDownloads, DownloadRequest,
};
pub use envelope::{InvocationFailure, InvocationResult, InvocationSuccess};
pub use error::{CapabilityError, HostError, Result};
pub use family::CapabilityFamily;
pub use host::{
    AssistantSession, CreateOptions, DetectorSession, HostAvailability, HostBinding,
    HostCapabilities, HostEnvironment, HostSession, ModelDownloader, SummarizerSession,
    SummaryFormat, SummaryLength, SummaryType, TranslateOptions, TranslatorSession,
};
pub use language_model::{
    LanguageModelClient, LanguageModelHost, LanguageModelResponse, LanguageModelUsage,
    ModelOptions,
};
pub use negotiation::DownloadController;
pub use normalize::{DetectedLanguage, Translation};
pub use resolver::{Binding, BindingResolver, ProbeStrategy, StrategyTable, SurfaceShape};
pub use sessions::SessionCache;
pub use simulated::{DownloadScope, SimulatedHost, SimulatedSurface};
