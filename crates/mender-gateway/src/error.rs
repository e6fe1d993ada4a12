//! Error types for the gateway.
//!
//! None of these escape a message handler: the dispatcher turns each one into
//! an [`Outcome`](crate::dispatcher::Outcome) and still acknowledges the message.

use std::time::Duration;

use thiserror::Error;

/// Malformed inbound payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Invalid(&'static str),
}

/// Failure reaching an HTTP endpoint. Never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),
}

impl TransportError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Connect(_) => "connect",
            Self::Body(_) => "body",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Bad credentials or failure of the login endpoint.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("login transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Remote blob open or read failure.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("failed to open blob {container}/{name}: {reason}")]
    Open {
        container: String,
        name: String,
        reason: String,
    },

    #[error("blob stream failed: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    BlobOpen(BlobError),

    #[error("artifact stream aborted: {0}")]
    BlobRead(BlobError),

    #[error("artifact upload transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("artifact upload returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Everything that can end a handler without a published response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("failed to publish response to {subject}: {reason}")]
    Publish { subject: String, reason: String },
}

impl GatewayError {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Auth(_) => "auth",
            Self::Transport(_) => "transport",
            Self::Upload(UploadError::BlobOpen(_) | UploadError::BlobRead(_)) => "blob",
            Self::Upload(UploadError::UnexpectedStatus { .. }) => "unexpected_status",
            Self::Upload(UploadError::Transport(_)) => "transport",
            Self::Publish { .. } => "publish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_unexpected_status_display_includes_status_and_body() {
        let err = UploadError::UnexpectedStatus {
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "artifact upload returned status 403: forbidden"
        );
    }

    #[test]
    fn gateway_error_kinds() {
        let parse: GatewayError = ParseError::Invalid("domain must not be empty").into();
        assert_eq!(parse.kind(), "parse");

        let auth: GatewayError = AuthError::Rejected {
            status: 401,
            body: String::new(),
        }
        .into();
        assert_eq!(auth.kind(), "auth");

        let timeout: GatewayError = TransportError::Timeout(Duration::from_secs(60)).into();
        assert_eq!(timeout.kind(), "transport");

        let blob: GatewayError = UploadError::BlobRead(BlobError::Read("reset".into())).into();
        assert_eq!(blob.kind(), "blob");

        let status: GatewayError = UploadError::UnexpectedStatus {
            status: 500,
            body: String::new(),
        }
        .into();
        assert_eq!(status.kind(), "unexpected_status");
    }

    #[test]
    fn auth_rejected_display() {
        let err = AuthError::Rejected {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("unauthorized"));
    }
}
