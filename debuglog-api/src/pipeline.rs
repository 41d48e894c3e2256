use crate::auth::PipelineAuth;
use crate::error::ApiError;
use debuglog_client::HttpTransport;
use debuglog_client::Request;
use http::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// The `data` member of a log-pipeline resource.
///
/// Held as raw JSON so an update re-sends every attribute this crate does not
/// model. Only `attributes.filter.query` is ever touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDocument(Value);

impl PipelineDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Current filter expression, or `""` when the pipeline has none.
    pub fn filter_query(&self) -> &str {
        self.0
            .pointer("/attributes/filter/query")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn set_filter_query(&mut self, query: impl Into<String>) {
        let mut root = into_object(self.0.take());
        let mut attributes = into_object(root.remove("attributes").unwrap_or_default());
        let mut filter = into_object(attributes.remove("filter").unwrap_or_default());
        filter.insert("query".to_string(), Value::String(query.into()));
        attributes.insert("filter".to_string(), Value::Object(filter));
        root.insert("attributes".to_string(), Value::Object(attributes));
        self.0 = Value::Object(root);
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Non-object values (including `null`) are replaced by an empty object.
fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[derive(Deserialize)]
struct PipelineEnvelope {
    data: Option<PipelineDocument>,
}

/// Read/write access to a single log-pipeline resource.
///
/// `write_filter` is a full-document overwrite: callers must pass the document
/// they just fetched so attributes other than the filter survive the update.
pub struct PipelineClient<T: HttpTransport> {
    transport: T,
    url: String,
    auth: PipelineAuth,
}

impl<T: HttpTransport> PipelineClient<T> {
    pub fn new(transport: T, api_base_url: &str, pipeline_id: &str, auth: PipelineAuth) -> Self {
        let base = api_base_url.trim_end_matches('/');
        Self {
            transport,
            url: format!("{base}/api/v2/logs/config/pipelines/{pipeline_id}"),
            auth,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch_pipeline(&self) -> Result<PipelineDocument, ApiError> {
        let req = self.auth.apply(Request::new(Method::GET, self.url.clone()))?;
        let resp = self.transport.execute(req).await?;
        let envelope: PipelineEnvelope =
            serde_json::from_slice(&resp.body).map_err(|e| ApiError::Decode {
                context: "pipeline",
                message: format!("{e}; body: {}", String::from_utf8_lossy(&resp.body)),
            })?;
        envelope.data.ok_or_else(|| ApiError::Decode {
            context: "pipeline",
            message: "response is missing `data`".to_string(),
        })
    }

    pub async fn write_filter(
        &self,
        mut pipeline: PipelineDocument,
        query: &str,
    ) -> Result<(), ApiError> {
        pipeline.set_filter_query(query);
        let payload = json!({ "data": pipeline });
        let req = self
            .auth
            .apply(Request::new(Method::PATCH, self.url.clone()))?
            .with_json(&payload);
        self.transport.execute(req).await?;
        tracing::debug!(url = %self.url, query, "pipeline filter updated");
        Ok(())
    }
}
