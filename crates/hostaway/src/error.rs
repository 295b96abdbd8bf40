use common::{Classified, ErrorKind};
use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum HostawayError {
    #[error("hostaway credentials are not configured")]
    Configuration,
    #[error("invalid hostaway base url {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("token exchange rejected with {status}: {body}")]
    Authentication { status: StatusCode, body: String },
    #[error("hostaway request to {endpoint} failed with {status}: {body}")]
    Upstream {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl HostawayError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HostawayError::Authentication { status, .. }
            | HostawayError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Classified for HostawayError {
    fn kind(&self) -> ErrorKind {
        match self {
            HostawayError::Configuration | HostawayError::InvalidBaseUrl { .. } => {
                ErrorKind::Configuration
            }
            HostawayError::Authentication { .. } => ErrorKind::Authentication,
            HostawayError::Upstream { .. }
            | HostawayError::InvalidResponse { .. }
            | HostawayError::Transport(_) => ErrorKind::Upstream,
        }
    }
}

impl From<reqwest::Error> for HostawayError {
    fn from(err: reqwest::Error) -> Self {
        HostawayError::Transport(err.to_string())
    }
}

impl From<http::Error> for HostawayError {
    fn from(err: http::Error) -> Self {
        HostawayError::Transport(err.to_string())
    }
}
