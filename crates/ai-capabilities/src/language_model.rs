//! Host adapter exposing a plain text-completion model as the assistant and
//! summarizer surfaces, for environments without built-in AI namespaces.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostError;
use crate::family::CapabilityFamily;
use crate::host::{
    AssistantSession, CreateOptions, HostAvailability, HostBinding, HostCapabilities,
    HostEnvironment, HostSession, SummarizerSession, SummaryFormat, SummaryLength, SummaryType,
};

pub const ASSISTANT_PATH: &str = "ai.languageModel";
pub const SUMMARIZER_PATH: &str = "ai.summarizer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: Some(512),
            system_prompt: None,
        }
    }
}

impl ModelOptions {
    fn with_create_options(&self, options: &CreateOptions) -> Self {
        Self {
            temperature: options.temperature.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
            system_prompt: options
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageModelUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModelResponse {
    pub text: String,
    pub usage: LanguageModelUsage,
}

impl LanguageModelResponse {
    pub fn new(text: String) -> Self {
        Self {
            text,
            usage: LanguageModelUsage::default(),
        }
    }
}

#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: &ModelOptions) -> Result<LanguageModelResponse>;
}

/// Publishes a [`LanguageModelClient`] under [`ASSISTANT_PATH`] and
/// [`SUMMARIZER_PATH`]. Detection and translation are not offered.
pub struct LanguageModelHost {
    model: Arc<dyn LanguageModelClient>,
    provider: String,
    defaults: ModelOptions,
}

impl LanguageModelHost {
    pub fn new(model: Arc<dyn LanguageModelClient>, provider: impl Into<String>) -> Self {
        Self {
            model,
            provider: provider.into(),
            defaults: ModelOptions::default(),
        }
    }

    pub fn with_options(mut self, defaults: ModelOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

impl HostEnvironment for LanguageModelHost {
    fn lookup(&self, path: &str) -> Option<Arc<dyn HostBinding>> {
        let family = match path {
            ASSISTANT_PATH => CapabilityFamily::Assistant,
            SUMMARIZER_PATH => CapabilityFamily::Summarizer,
            _ => return None,
        };
        Some(Arc::new(PromptBinding {
            family,
            model: self.model.clone(),
            provider: self.provider.clone(),
            defaults: self.defaults.clone(),
        }))
    }
}

struct PromptBinding {
    family: CapabilityFamily,
    model: Arc<dyn LanguageModelClient>,
    provider: String,
    defaults: ModelOptions,
}

#[async_trait]
impl HostBinding for PromptBinding {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn has_capabilities_probe(&self) -> bool {
        true
    }

    async fn capabilities(&self) -> std::result::Result<HostCapabilities, HostError> {
        // The model is resident; there is nothing to download.
        Ok(HostCapabilities::new(HostAvailability::Readily))
    }

    async fn create(&self, options: &CreateOptions) -> std::result::Result<HostSession, HostError> {
        let model_options = self.defaults.with_create_options(options);
        tracing::debug!(
            target: "ai_capabilities::language_model",
            family = self.family.as_str(),
            temperature = model_options.temperature,
            max_tokens = ?model_options.max_tokens
        );
        match self.family {
            CapabilityFamily::Assistant => Ok(HostSession::Assistant(Arc::new(PromptSession {
                model: self.model.clone(),
                options: model_options,
            }))),
            CapabilityFamily::Summarizer => {
                Ok(HostSession::Summarizer(Arc::new(PromptSummarizer {
                    model: self.model.clone(),
                    options: model_options,
                    instructions: summary_instructions(options),
                })))
            }
            other => Err(HostError::new(format!(
                "{} is not supported by the language model host",
                other.label()
            ))),
        }
    }
}

struct PromptSession {
    model: Arc<dyn LanguageModelClient>,
    options: ModelOptions,
}

#[async_trait]
impl AssistantSession for PromptSession {
    async fn prompt(&self, text: &str) -> std::result::Result<String, HostError> {
        let response = self.model.complete(text, &self.options).await?;
        Ok(response.text)
    }
}

struct PromptSummarizer {
    model: Arc<dyn LanguageModelClient>,
    options: ModelOptions,
    instructions: String,
}

#[async_trait]
impl SummarizerSession for PromptSummarizer {
    async fn summarize(&self, text: &str) -> std::result::Result<Value, HostError> {
        let mut prompt = self.instructions.clone();
        prompt.push_str("\n\n<<TEXT>>\n");
        prompt.push_str(text);
        let response = self.model.complete(&prompt, &self.options).await?;
        Ok(Value::String(response.text.trim().to_string()))
    }
}

fn summary_instructions(options: &CreateOptions) -> String {
    let kind = match options.summary_type.unwrap_or(SummaryType::Tldr) {
        SummaryType::Tldr => "a short TL;DR",
        SummaryType::KeyPoints => "the key points as a list",
        SummaryType::Teaser => "an engaging teaser",
        SummaryType::Headline => "a single headline",
    };
    let length = match options.summary_length.unwrap_or(SummaryLength::Medium) {
        SummaryLength::Short => "Keep it very brief.",
        SummaryLength::Medium => "Keep it concise.",
        SummaryLength::Long => "Be thorough but avoid repetition.",
    };
    let format = match options.summary_format.unwrap_or(SummaryFormat::PlainText) {
        SummaryFormat::PlainText => "Respond in plain text without markup.",
        SummaryFormat::Markdown => "Respond in Markdown.",
    };

    let mut instructions = format!("Summarize the text below as {kind}. {length} {format}");
    if let Some(context) = &options.shared_context {
        instructions.push_str("\nContext: ");
        instructions.push_str(context);
    }
    instructions
}
