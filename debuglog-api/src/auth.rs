use crate::error::ApiError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use debuglog_client::Request;
use http::HeaderMap;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use http::header::CONTENT_TYPE;

pub const API_KEY_HEADER: &str = "dd-api-key";
pub const APPLICATION_KEY_HEADER: &str = "dd-application-key";

/// Static key pair presented to the log-pipeline API on every request.
#[derive(Clone)]
pub struct PipelineAuth {
    pub api_key: String,
    pub application_key: String,
}

impl std::fmt::Debug for PipelineAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineAuth")
            .field("api_key", &"<redacted>")
            .field("application_key", &"<redacted>")
            .finish()
    }
}

impl PipelineAuth {
    pub fn new(api_key: impl Into<String>, application_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            application_key: application_key.into(),
        }
    }

    pub(crate) fn apply(&self, mut req: Request) -> Result<Request, ApiError> {
        add_pipeline_headers(self, &mut req.headers)?;
        Ok(req)
    }
}

/// HTTP basic credentials for the ticketing instance.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn apply(&self, mut req: Request) -> Result<Request, ApiError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let value = sensitive_value("authorization", &format!("Basic {encoded}"))?;
        let _ = req.headers.insert(AUTHORIZATION, value);
        Ok(req)
    }
}

/// Whether `value` can be sent as an HTTP header value unchanged.
pub fn is_valid_header_value(value: &str) -> bool {
    HeaderValue::from_str(value).is_ok()
}

fn sensitive_value(name: &'static str, raw: &str) -> Result<HeaderValue, ApiError> {
    let mut value =
        HeaderValue::from_str(raw).map_err(|_| ApiError::InvalidHeader { name })?;
    value.set_sensitive(true);
    Ok(value)
}

pub(crate) fn add_pipeline_headers(
    auth: &PipelineAuth,
    headers: &mut HeaderMap,
) -> Result<(), ApiError> {
    let api_key = sensitive_value(API_KEY_HEADER, &auth.api_key)?;
    let application_key = sensitive_value(APPLICATION_KEY_HEADER, &auth.application_key)?;
    let _ = headers.insert(API_KEY_HEADER, api_key);
    let _ = headers.insert(APPLICATION_KEY_HEADER, application_key);
    let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(())
}
