use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, ErrorCategory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSuccess<T> {
    pub success: bool,
    pub result: T,
    pub source: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub success: bool,
    pub error: ErrorCategory,
    pub message: String,
    pub fallback: String,
    pub retryable: bool,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Uniform envelope returned by every public operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationResult<T> {
    Success(InvocationSuccess<T>),
    Failure(InvocationFailure),
}

impl<T> InvocationResult<T> {
    pub fn success(result: T, source: impl Into<String>) -> Self {
        InvocationResult::Success(InvocationSuccess {
            success: true,
            result,
            source: source.into(),
            timestamp: now_millis(),
        })
    }

    pub fn failure(classification: Classification, cause: Option<String>) -> Self {
        InvocationResult::Failure(InvocationFailure {
            success: false,
            error: classification.category,
            message: classification.message,
            fallback: classification.fallback,
            retryable: classification.retryable,
            timestamp: now_millis(),
            cause,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success(_))
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            InvocationResult::Success(success) => Some(&success.result),
            InvocationResult::Failure(_) => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            InvocationResult::Success(success) => Some(&success.source),
            InvocationResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<ErrorCategory> {
        self.failure_details().map(|failure| failure.error)
    }

    pub fn failure_details(&self) -> Option<&InvocationFailure> {
        match self {
            InvocationResult::Success(_) => None,
            InvocationResult::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<T, InvocationFailure> {
        match self {
            InvocationResult::Success(success) => Ok(success.result),
            InvocationResult::Failure(failure) => Err(failure),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
