use reqwest::blocking::{Client, ClientBuilder};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::error::Result;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default API version prefix
pub const DEFAULT_API_VERSION: &str = "v1";

/// Create the HTTP client used by [`crate::transport::HttpTransport`]
pub fn create_http_client(timeout: Duration) -> Result<Client> {
    let client = ClientBuilder::new().timeout(timeout).build()?;
    Ok(client)
}

/// Configuration for the API client.
///
/// Deserializes from an options object such as
/// `{"base_uri": "https://api.example.com", "time_out": 2.5, "api_key": "k",
/// "api_secret": "s", "api_version": "v2"}`; absent keys take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URI requests are resolved against
    pub base_uri: String,
    /// Request timeout
    #[serde(rename = "time_out", deserialize_with = "deserialize_secs")]
    pub timeout: Duration,
    /// API key
    pub api_key: String,
    /// API secret
    pub api_secret: String,
    /// Version prefixed to every path; empty disables the prefix
    pub api_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_uri: String::new(),
            timeout: DEFAULT_TIMEOUT,
            api_key: String::new(),
            api_secret: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration for the given base URI
    pub fn new(base_uri: impl Into<String>) -> Self {
        ClientConfig {
            base_uri: base_uri.into(),
            ..Default::default()
        }
    }

    /// Set the credential pair
    pub fn with_credentials(mut self, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self.api_secret = api_secret.into();
        self
    }

    /// Set the API version prefix
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URI with exactly one trailing slash, so relative paths resolve
    /// beneath it
    pub fn normalized_base_uri(&self) -> String {
        format!("{}/", self.base_uri.trim_end_matches('/'))
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}
