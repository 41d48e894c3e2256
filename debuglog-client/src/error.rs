use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(
        "{} returned {status}: {}",
        .url.as_deref().unwrap_or("request"),
        .body.as_deref().unwrap_or_default()
    )]
    Http {
        status: StatusCode,
        url: Option<String>,
        headers: Option<HeaderMap>,
        body: Option<String>,
    },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to build request: {0}")]
    Build(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            TransportError::Timeout | TransportError::Network(_) | TransportError::Build(_) => {
                None
            }
        }
    }
}
