//! HTTP transport seam.
//!
//! The client hands a fully prepared [`TransportRequest`] to a [`Transport`]
//! and receives the status, headers, body and effective URL back. [`HttpTransport`]
//! is the `reqwest` implementation; tests and embedders can plug their own
//! through a [`TransportFactory`].

use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::client::create_http_client;
use crate::error::{ApiError, Result};

/// An outbound request, relative to the transport's base URI
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Path resolved against the base URI
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Form-encoded body fields
    pub form: Vec<(String, String)>,
    /// JSON body, takes precedence over `form`
    pub json: Option<Value>,
}

/// What came back from the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// URL the response was actually served from
    pub effective_url: String,
    /// Response headers in arrival order; non-UTF-8 values are lossily decoded
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Sends prepared requests
pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Builds a [`Transport`] bound to a base URI (trailing slash included) and a
/// timeout
pub type TransportFactory =
    Box<dyn Fn(&str, Duration) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Default factory, producing an [`HttpTransport`]
pub fn http_factory() -> TransportFactory {
    Box::new(|base_uri: &str, timeout: Duration| {
        Ok(Box::new(HttpTransport::connect(base_uri, timeout)?) as Box<dyn Transport>)
    })
}

/// Blocking `reqwest` transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    /// Create a transport for `base_uri` with the given request timeout
    pub fn connect(base_uri: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_uri).map_err(|source| ApiError::InvalidBaseUri {
            uri: base_uri.to_string(),
            source,
        })?;

        Ok(HttpTransport {
            client: create_http_client(timeout)?,
            base,
        })
    }

    /// Base URI requests are resolved against
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a request path against the base URI
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidParams(format!("invalid request path {:?}: {}", path, e)))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self.resolve(&request.path)?;

        let mut builder = self.client.request(request.method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.json {
            Some(ref json) => builder.json(json),
            None if !request.form.is_empty() => builder.form(&request.form),
            None => builder,
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let effective_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes()?.to_vec();

        Ok(TransportResponse {
            status,
            effective_url,
            headers,
            body,
        })
    }
}
