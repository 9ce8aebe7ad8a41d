use crate::family::CapabilityFamily;

/// Convenient result alias for capability operations.
pub type Result<T> = std::result::Result<T, CapabilityError>;

/// Failure reported by a host surface. Hosts only describe failures through
/// their message text, which the classifier inspects.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for HostError {
    fn from(err: anyhow::Error) -> Self {
        HostError::new(err.to_string())
    }
}

/// Errors raised inside the negotiation and invocation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CapabilityError {
    /// Input was rejected before reaching the host.
    #[error("{0}")]
    Validation(String),
    /// Input exceeds the fixed character bound.
    #[error("input is {actual} characters long, the limit is {limit}")]
    InputTooLarge {
        /// Length of the rejected input in characters.
        actual: usize,
        /// Configured upper bound.
        limit: usize,
    },
    /// The host exposes no usable surface for the family.
    #[error("{family} capability is not available")]
    Unavailable { family: CapabilityFamily },
    /// The consent hook declined the one-time model download.
    #[error("model download declined for {family}")]
    DownloadDeclined { family: CapabilityFamily },
    /// The model download was attempted and did not complete.
    #[error("model download failed for {family}: {cause}")]
    DownloadFailed {
        family: CapabilityFamily,
        cause: String,
    },
    /// The caller cancelled the operation.
    #[error("operation aborted")]
    Aborted,
    /// A host returned a value matching none of the known result shapes.
    #[error("unrecognized {kind} result shape: {raw}")]
    UnrecognizedShape { kind: &'static str, raw: String },
    /// `create` produced a session of the wrong family.
    #[error("host returned a {actual} session where a {expected} session was expected")]
    SessionMismatch {
        expected: CapabilityFamily,
        actual: CapabilityFamily,
    },
    /// Raw failure from a host call.
    #[error(transparent)]
    Host(#[from] HostError),
}

impl CapabilityError {
    /// Helper for wrapping validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        CapabilityError::Validation(msg.into())
    }

    /// Whether this failure reflects host state and should invalidate the
    /// cached binding, availability and session of the family.
    pub fn resets_binding(&self) -> bool {
        !matches!(
            self,
            CapabilityError::Validation(_)
                | CapabilityError::InputTooLarge { .. }
                | CapabilityError::Aborted
        )
    }
}
