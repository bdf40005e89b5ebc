//! Error types for the parse workflow.
//!
//! `WorkflowError` messages are what the user sees in the error view.

use thiserror::Error;

/// Shown when the service reports failure without a message.
pub const FALLBACK_SERVICE_MESSAGE: &str = "processing error";

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no file selected")]
    NoArtifactSelected,

    #[error("{reason}")]
    ArtifactRejected { reason: String },

    #[error("could not reach the parsing service")]
    Transport(#[source] TransportError),

    #[error("parsing service unavailable")]
    Unavailable,

    /// Failure reported by the service itself; the text is shown verbatim.
    #[error("{0}")]
    Service(String),

    #[error("a file is already being processed")]
    SubmitInProgress,

    #[error("nothing to save")]
    NothingToSave,

    #[error("session is closed")]
    Closed,
}

impl WorkflowError {
    pub fn from_envelope(error: Option<String>) -> Self {
        match error {
            Some(msg) if !msg.trim().is_empty() => WorkflowError::Service(msg),
            _ => WorkflowError::Service(FALLBACK_SERVICE_MESSAGE.to_string()),
        }
    }

    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => WorkflowError::Unavailable,
            other => WorkflowError::Transport(other),
        }
    }
}

/// Failure of the network call itself, before any envelope could be read.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_decode() || e.is_body() {
            TransportError::Malformed(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_message_verbatim() {
        let e = WorkflowError::from_envelope(Some("unreadable scan".into()));
        assert_eq!(e.to_string(), "unreadable scan");
    }

    #[test]
    fn test_service_message_fallback() {
        assert_eq!(
            WorkflowError::from_envelope(None).to_string(),
            FALLBACK_SERVICE_MESSAGE
        );
        assert_eq!(
            WorkflowError::from_envelope(Some("  ".into())).to_string(),
            FALLBACK_SERVICE_MESSAGE
        );
    }

    #[test]
    fn test_timeout_maps_to_unavailable() {
        let e = WorkflowError::from_transport(TransportError::Timeout);
        assert!(matches!(e, WorkflowError::Unavailable));
        let e = WorkflowError::from_transport(TransportError::Status(502));
        assert_eq!(e.to_string(), "could not reach the parsing service");
    }
}
