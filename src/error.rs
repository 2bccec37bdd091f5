//! Failure taxonomy for calls against the Flume cloud API.
//!
//! Every exchange resolves to either a typed payload or exactly one of these
//! kinds. Callers map the kind to a connectivity status; nothing here is
//! retried internally.

use std::sync::Arc;

/// Categorized failure of one API exchange.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Envelope code 401/403/503, refresh rejected, or no usable credentials.
    Authorization(String),
    /// Envelope code 400.
    MalformedRequest(String),
    /// Envelope code 404, or no usable data in a successful envelope.
    NotFound(String),
    /// `success: false` with any other code.
    Io(String),
    /// Decoded data contained a null or undecodable element.
    MalformedResponse(String),
    /// No response, unreadable body, or connection problem.
    Transport {
        message: String,
        cause: Option<Arc<reqwest::Error>>,
    },
    /// The exchange was cancelled before it completed.
    Cancelled,
}

impl ApiError {
    /// Transport failure without an underlying cause.
    pub fn transport(message: impl Into<String>) -> Self {
        ApiError::Transport {
            message: message.into(),
            cause: None,
        }
    }

    /// Transport failure wrapping the HTTP client's error.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        ApiError::Transport {
            message: format!("{}: {}", context, err),
            cause: Some(Arc::new(err)),
        }
    }

    /// The failure's message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Authorization(m)
            | ApiError::MalformedRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Io(m)
            | ApiError::MalformedResponse(m) => m,
            ApiError::Transport { message, .. } => message,
            ApiError::Cancelled => "request was cancelled",
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, ApiError::Authorization(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Authorization(m) => write!(f, "Authorization problem: {}", m),
            ApiError::MalformedRequest(m) => write!(f, "Malformed request: {}", m),
            ApiError::NotFound(m) => write!(f, "Not found: {}", m),
            ApiError::Io(m) => write!(f, "Request failed: {}", m),
            ApiError::MalformedResponse(m) => write!(f, "Malformed response: {}", m),
            ApiError::Transport { message, .. } => write!(f, "Transport error: {}", message),
            ApiError::Cancelled => write!(f, "Request was cancelled"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Transport {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
