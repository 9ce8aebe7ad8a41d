use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The on-device AI functions a host may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapabilityFamily {
    #[serde(rename = "assistant", alias = "prompt", alias = "language_model")]
    Assistant,
    #[serde(rename = "summarizer")]
    Summarizer,
    #[serde(rename = "language_detector", alias = "detector")]
    LanguageDetector,
    #[serde(rename = "translator")]
    Translator,
}

impl CapabilityFamily {
    pub const ALL: [CapabilityFamily; 4] = [
        Self::Assistant,
        Self::Summarizer,
        Self::LanguageDetector,
        Self::Translator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Summarizer => "summarizer",
            Self::LanguageDetector => "language_detector",
            Self::Translator => "translator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assistant" | "prompt" | "language_model" | "language-model" => Some(Self::Assistant),
            "summarizer" | "summarize" => Some(Self::Summarizer),
            "language_detector" | "language-detector" | "detector" | "detect" => {
                Some(Self::LanguageDetector)
            }
            "translator" | "translate" => Some(Self::Translator),
            _ => None,
        }
    }

    /// Human readable label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Assistant => "prompt assistant",
            Self::Summarizer => "summarizer",
            Self::LanguageDetector => "language detector",
            Self::Translator => "translator",
        }
    }
}

impl FromStr for CapabilityFamily {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

impl fmt::Display for CapabilityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
