use crate::error::TransportError;
use crate::request::Request;
use crate::request::Response;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::Level;
use tracing::debug;
use tracing::enabled;
use tracing::trace;

/// Request-id headers returned by the log-pipeline and ticketing backends.
const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "x-datadog-request-id", "x-transaction-id"];

/// Executes a single request and returns the full response body.
///
/// Non-2xx statuses are surfaced as [`TransportError::Http`]; nothing is
/// retried at this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;
}

/// Uses whatever timeouts the wrapped client was built with; the default
/// client has none.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, req: Request) -> reqwest::RequestBuilder {
        let Request {
            method,
            url,
            headers,
            body,
        } = req;

        let builder = self.client.request(method, &url).headers(headers);
        match body {
            Some(body) => builder.json(&body),
            None => builder,
        }
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

fn request_ids(headers: &HeaderMap) -> Vec<(&'static str, &str)> {
    REQUEST_ID_HEADERS
        .iter()
        .filter_map(|&name| Some((name, headers.get(name)?.to_str().ok()?)))
        .collect()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        if enabled!(Level::TRACE) {
            trace!(
                "{} to {}: {}",
                req.method,
                req.url,
                req.body.as_ref().unwrap_or_default()
            );
        }

        let method = req.method.clone();
        let url = req.url.clone();
        let resp = match self.build(req).send().await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(%method, %url, error = %err, "request failed");
                return Err(Self::map_error(err));
            }
        };
        let status = resp.status();
        let headers = resp.headers().clone();
        debug!(
            %method,
            %url,
            %status,
            request_ids = ?request_ids(&headers),
            "request completed"
        );

        let bytes = resp.bytes().await.map_err(Self::map_error)?;
        if !status.is_success() {
            let body = String::from_utf8(bytes.to_vec()).ok();
            return Err(TransportError::Http {
                status,
                url: Some(url),
                headers: Some(headers),
                body,
            });
        }
        Ok(Response {
            status,
            headers,
            body: bytes,
        })
    }
}
