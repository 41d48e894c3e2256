use debuglog_client::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to decode {context} response: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("credential for header {name} is not a valid header value")]
    InvalidHeader { name: &'static str },
}
