use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Closed set of failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ValidationError,
    InputTooLarge,
    #[serde(alias = "ai_not_available")]
    CapabilityUnavailable,
    #[serde(alias = "model_download_declined")]
    DownloadDeclined,
    #[serde(alias = "model_download_failed")]
    DownloadFailed,
    ModelLoading,
    RateLimited,
    NetworkError,
    Aborted,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::InputTooLarge => "input_too_large",
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::DownloadDeclined => "download_declined",
            Self::DownloadFailed => "download_failed",
            Self::ModelLoading => "model_loading",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
            Self::Aborted => "aborted",
            Self::Unknown => "unknown",
        }
    }

    pub fn retryable(&self) -> bool {
        !matches!(
            self,
            Self::ValidationError
                | Self::InputTooLarge
                | Self::CapabilityUnavailable
                | Self::DownloadDeclined
        )
    }

    /// Short description shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "The request was not valid.",
            Self::InputTooLarge => "The text is too long to process on-device.",
            Self::CapabilityUnavailable => "On-device AI is not available in this environment.",
            Self::DownloadDeclined => "The on-device model download was declined.",
            Self::DownloadFailed => "The on-device model could not be downloaded.",
            Self::ModelLoading => "The on-device model is still loading.",
            Self::RateLimited => "The on-device model is temporarily over its usage limit.",
            Self::NetworkError => "A network problem interrupted the request.",
            Self::Aborted => "The request was cancelled.",
            Self::Unknown => "The on-device model failed unexpectedly.",
        }
    }

    /// Guidance for what the user can do next.
    pub fn fallback(&self) -> &'static str {
        match self {
            Self::ValidationError => "Provide non-empty text and the required options.",
            Self::InputTooLarge => "Shorten the text or split it into smaller parts.",
            Self::CapabilityUnavailable => {
                "Enable the built-in AI features of your browser or use a supported version."
            }
            Self::DownloadDeclined => "Start the action again and allow the model download.",
            Self::DownloadFailed => "Check your connection and free disk space, then retry.",
            Self::ModelLoading => "Wait a few seconds and try again.",
            Self::RateLimited => "Wait a minute before trying again.",
            Self::NetworkError => "Check your connection and retry.",
            Self::Aborted => "Retry when you are ready.",
            Self::Unknown => "Try again. If the problem persists, restart the browser.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub message: String,
    pub fallback: String,
    pub retryable: bool,
}

impl Classification {
    fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            fallback: category.fallback().to_string(),
            retryable: category.retryable(),
        }
    }
}

// Checked in order, first hit wins.
const MESSAGE_RULES: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Aborted, &["aborted", "aborterror", "cancelled", "canceled"]),
    (
        ErrorCategory::DownloadDeclined,
        &["declined", "permission denied", "consent"],
    ),
    (
        ErrorCategory::DownloadFailed,
        &["download failed", "download error", "download interrupted", "failed to download"],
    ),
    (
        ErrorCategory::CapabilityUnavailable,
        &[
            "not available",
            "unavailable",
            "undefined",
            "not supported",
            "unsupported",
            "not a function",
        ],
    ),
    (
        ErrorCategory::RateLimited,
        &["quota", "rate limit", "rate-limit", "too many requests", "limit exceeded"],
    ),
    (
        ErrorCategory::ModelLoading,
        &["loading", "not ready", "warming up", "initializing"],
    ),
    (
        ErrorCategory::NetworkError,
        &["network", "connection", "offline", "fetch", "timed out", "timeout"],
    ),
];

/// Maps a raw failure message to a category. Total: unmatched messages fall
/// into [`ErrorCategory::Unknown`].
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_ascii_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Classify an internal error. Typed errors map by kind, host errors by their
/// message text.
pub fn classify(err: &CapabilityError) -> Classification {
    match err {
        CapabilityError::Validation(msg) => {
            Classification::new(ErrorCategory::ValidationError, msg.clone())
        }
        CapabilityError::InputTooLarge { .. } => {
            Classification::new(ErrorCategory::InputTooLarge, err.to_string())
        }
        CapabilityError::Unavailable { .. } => {
            with_user_message(ErrorCategory::CapabilityUnavailable)
        }
        CapabilityError::DownloadDeclined { .. } => {
            with_user_message(ErrorCategory::DownloadDeclined)
        }
        CapabilityError::DownloadFailed { .. } => with_user_message(ErrorCategory::DownloadFailed),
        CapabilityError::Aborted => with_user_message(ErrorCategory::Aborted),
        CapabilityError::UnrecognizedShape { .. } | CapabilityError::SessionMismatch { .. } => {
            with_user_message(ErrorCategory::Unknown)
        }
        CapabilityError::Host(host) => with_user_message(classify_message(host.message())),
    }
}

fn with_user_message(category: ErrorCategory) -> Classification {
    Classification::new(category, category.user_message())
}
