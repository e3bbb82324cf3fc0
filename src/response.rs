use serde_json::Value;
use std::cell::OnceCell;

use crate::error::{ApiError, Result};
use crate::transport::TransportResponse;

/// ResponseState holds the outcome of the most recent request.
/// The body is decoded as JSON on first access and cached afterwards.
#[derive(Debug, Clone)]
pub struct ResponseState {
    status: u16,
    body: Vec<u8>,
    effective_url: String,
    headers: Vec<(String, String)>,
    decoded: OnceCell<Value>,
}

impl ResponseState {
    /// Create a response state from raw parts
    pub fn new(status: u16, body: impl Into<Vec<u8>>, effective_url: impl Into<String>) -> Self {
        ResponseState {
            status,
            body: body.into(),
            effective_url: effective_url.into(),
            headers: Vec::new(),
            decoded: OnceCell::new(),
        }
    }

    /// Attach response headers
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// HTTP status code
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Raw response body
    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    /// URL the response was served from
    pub fn effective_url(&self) -> &str {
        &self.effective_url
    }

    /// All response headers, in the order they were received
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decode the body as JSON, caching the result
    pub fn decoded_body(&self) -> Result<&Value> {
        if let Some(value) = self.decoded.get() {
            return Ok(value);
        }
        let value = serde_json::from_slice(&self.body)
            .map_err(|source| ApiError::ResponseParse { source })?;

        Ok(self.decoded.get_or_init(|| value))
    }

    /// Apply unmarshals the response body into the provided type
    pub fn apply<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        <T as serde::Deserialize>::deserialize(self.decoded_body()?).map_err(|source| ApiError::ResponseParse { source })
    }

    /// Get a value from the decoded body by a slash-separated path.
    /// For example, "user/name" would access the "name" field inside the "user" object.
    pub fn get(&self, path: &str) -> Result<Option<&Value>> {
        let mut current = self.decoded_body()?;

        for part in path.split('/').filter(|s| !s.is_empty()) {
            let next = match current {
                Value::Object(map) => map.get(part),
                Value::Array(arr) => part.parse::<usize>().ok().and_then(|i| arr.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// Get a string value from the decoded body by a slash-separated path
    pub fn get_string(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get(path)?.and_then(|v| v.as_str().map(|s| s.to_string())))
    }
}

impl From<TransportResponse> for ResponseState {
    fn from(response: TransportResponse) -> Self {
        ResponseState::new(response.status, response.body, response.effective_url)
            .with_headers(response.headers)
    }
}
