//! Environment-provided settings for the two remote systems.

use crate::error::DebugLogError;
use crate::error::Result;
use debuglog_api::BasicAuth;
use debuglog_api::PipelineAuth;
use debuglog_api::auth::is_valid_header_value;

pub const DD_API_KEY: &str = "DD_API_KEY";
pub const DD_APP_KEY: &str = "DD_APP_KEY";
pub const DD_PIPELINE_ID: &str = "DD_PIPELINE_ID";
pub const DD_SITE: &str = "DD_SITE";
pub const SN_INSTANCE: &str = "SN_INSTANCE";
pub const SN_USER: &str = "SN_USER";
pub const SN_PASS: &str = "SN_PASS";

pub const DEFAULT_DD_SITE: &str = "datadoghq.com";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Scheme and host of the pipeline API, e.g. `https://api.datadoghq.com`.
    pub api_base_url: String,
    pub pipeline_id: String,
    pub auth: PipelineAuth,
}

impl PipelineSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let [api_key, app_key, pipeline_id] =
            require(&lookup, [DD_API_KEY, DD_APP_KEY, DD_PIPELINE_ID])?;
        reject_unsendable(&[(DD_API_KEY, api_key.as_str()), (DD_APP_KEY, app_key.as_str())])?;
        let site = lookup(DD_SITE)
            .map(|site| site.trim().to_string())
            .filter(|site| !site.is_empty())
            .unwrap_or_else(|| DEFAULT_DD_SITE.to_string());
        Ok(Self {
            api_base_url: format!("https://api.{site}"),
            pipeline_id,
            auth: PipelineAuth::new(api_key, app_key),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TicketingSettings {
    /// Scheme and host of the ticketing instance.
    pub base_url: String,
    pub auth: BasicAuth,
}

impl TicketingSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let [instance, user, password] = require(&lookup, [SN_INSTANCE, SN_USER, SN_PASS])?;
        reject_unsendable(&[(SN_USER, user.as_str()), (SN_PASS, password.as_str())])?;
        // Bare hostnames are the norm; a full URL is accepted as-is.
        let base_url = if instance.starts_with("http://") || instance.starts_with("https://") {
            instance
        } else {
            format!("https://{instance}")
        };
        Ok(Self {
            base_url,
            auth: BasicAuth::new(user, password),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DebugLogConfig {
    pub pipeline: PipelineSettings,
    pub ticketing: TicketingSettings,
}

impl DebugLogConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_lookup)
    }

    /// Both groups are checked so one error names every missing key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        match (
            PipelineSettings::from_lookup(&lookup),
            TicketingSettings::from_lookup(&lookup),
        ) {
            (Ok(pipeline), Ok(ticketing)) => Ok(Self {
                pipeline,
                ticketing,
            }),
            (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
            (Err(DebugLogError::Configuration(a)), Err(DebugLogError::Configuration(b))) => {
                Err(DebugLogError::Configuration(format!("{a}; {b}")))
            }
            (Err(err), Err(_)) => Err(err),
        }
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn require<const N: usize>(
    lookup: &impl Fn(&str) -> Option<String>,
    keys: [&'static str; N],
) -> Result<[String; N]> {
    let values = keys.map(|key| lookup(key).filter(|value| !value.trim().is_empty()));
    let missing: Vec<&str> = keys
        .iter()
        .zip(values.iter())
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(DebugLogError::Configuration(format!(
            "{} must be set (missing: {})",
            join_keys(&keys),
            missing.join(", ")
        )));
    }
    Ok(values.map(Option::unwrap_or_default))
}

/// Credentials are sent in request headers, which cannot carry control
/// characters.
fn reject_unsendable(values: &[(&str, &str)]) -> Result<()> {
    let invalid: Vec<&str> = values
        .iter()
        .filter(|(_, value)| !is_valid_header_value(value))
        .map(|(key, _)| *key)
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }
    Err(DebugLogError::Configuration(format!(
        "{} must not contain control characters",
        join_keys(&invalid)
    )))
}

fn join_keys(keys: &[&str]) -> String {
    match keys {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
