use crate::auth::BasicAuth;
use crate::error::ApiError;
use debuglog_client::HttpTransport;
use debuglog_client::Request;
use http::Method;
use serde::Deserialize;
use serde::Deserializer;
use serde_json::Value;
use url::Url;

const INCIDENT_TABLE_PATH: &str = "/api/now/table/incident";

/// One row of the incident table, reduced to the fields the gate needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncidentRecord {
    #[serde(default)]
    pub number: Option<String>,
    /// Either a label (`"resolved"`) or a numeric code (`"7"`, `7`); always
    /// normalised to a string here.
    #[serde(default, deserialize_with = "state_as_string")]
    pub state: String,
}

#[derive(Deserialize)]
struct TableResponse {
    #[serde(default)]
    result: Vec<IncidentRecord>,
}

fn state_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    })
}

pub struct IncidentClient<T: HttpTransport> {
    transport: T,
    base_url: String,
    auth: BasicAuth,
}

impl<T: HttpTransport> IncidentClient<T> {
    pub fn new(transport: T, base_url: &str, auth: BasicAuth) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn lookup_url(&self, number: &str) -> Result<Url, ApiError> {
        let raw = format!("{}{INCIDENT_TABLE_PATH}", self.base_url);
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("sysparm_query", &format!("number={number}"));
        Ok(url)
    }

    /// Returns the first record matching `number`, or `None` when the table
    /// has no such incident.
    pub async fn find_incident(&self, number: &str) -> Result<Option<IncidentRecord>, ApiError> {
        let url = self.lookup_url(number)?;
        let req = self.auth.apply(Request::new(Method::GET, url.to_string()))?;
        let resp = self.transport.execute(req).await?;
        let table: TableResponse =
            serde_json::from_slice(&resp.body).map_err(|e| ApiError::Decode {
                context: "incident",
                message: format!("{e}; body: {}", String::from_utf8_lossy(&resp.body)),
            })?;
        Ok(table.result.into_iter().next())
    }
}
