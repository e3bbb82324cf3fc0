use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

use crate::auth::{AuthAdapter, AuthenticatorFactory};
use crate::client::ClientConfig;
use crate::error::{ApiError, Result};
use crate::params::{flatten, standardize, to_params, Params};
use crate::response::ResponseState;
use crate::route::RouteTemplate;
use crate::transport::{http_factory, Transport, TransportFactory, TransportRequest};

/// Reserved parameter key whose value is sent verbatim as a JSON body
pub const JSON_PAYLOAD_KEY: &str = "json";

/// Where signed parameters travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// URL query string
    Query,
    /// `application/x-www-form-urlencoded` body
    Form,
}

/// A request ready for dispatch: path compiled, parameters signed
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub method: Method,
    /// Compiled path, version prefix included
    pub path: String,
    pub channel: Channel,
    /// Raw JSON payload, neither standardized nor signed
    pub json: Option<Value>,
    /// Signed parameters for `channel`
    pub params: Params,
}

impl RequestContext {
    /// Lower into a transport request.
    ///
    /// A JSON payload occupies the body, so signed parameters move to the
    /// query string in that case.
    pub fn into_transport_request(self) -> TransportRequest {
        let pairs = flatten(&self.params);
        let (query, form) = match (self.channel, self.json.is_some()) {
            (Channel::Form, false) => (Vec::new(), pairs),
            _ => (pairs, Vec::new()),
        };

        TransportRequest {
            method: self.method,
            path: self.path,
            query,
            form,
            json: self.json,
        }
    }
}

/// Signed API client.
///
/// Owns its configuration, the lazily built transport and signer, and the
/// state of the last response. Requests take `&mut self`; share a client
/// across threads only behind a lock.
pub struct ApiClient {
    config: ClientConfig,
    transport_factory: TransportFactory,
    transport: Option<((String, Duration), Box<dyn Transport>)>,
    auth: AuthAdapter,
    response: Option<ResponseState>,
}

impl ApiClient {
    /// Create a client from a configuration
    pub fn new(config: ClientConfig) -> Self {
        ApiClient {
            config,
            transport_factory: http_factory(),
            transport: None,
            auth: AuthAdapter::default(),
            response: None,
        }
    }

    /// Create a client from an options object (see [`ClientConfig`])
    pub fn from_options(options: Value) -> Result<Self> {
        let config: ClientConfig = serde_json::from_value(options)?;
        Ok(Self::new(config))
    }

    /// Use a custom transport
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transport_factory = factory;
        self.transport = None;
        self
    }

    /// Use a custom signer
    pub fn with_authenticator_factory(mut self, factory: AuthenticatorFactory) -> Self {
        self.auth.set_factory(factory);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URI requests are resolved against
    pub fn base_uri(&self) -> &str {
        &self.config.base_uri
    }

    /// Set the base URI
    pub fn set_base_uri(&mut self, base_uri: impl Into<String>) -> &mut Self {
        self.config.base_uri = base_uri.into();
        self
    }

    /// API key used for signing
    pub fn api_key(&self) -> &str {
        &self.config.api_key
    }

    /// API secret used for signing
    pub fn api_secret(&self) -> &str {
        &self.config.api_secret
    }

    /// Set the credential pair used to sign requests
    pub fn set_credentials(&mut self, api_key: impl Into<String>, api_secret: impl Into<String>) -> &mut Self {
        self.config.api_key = api_key.into();
        self.config.api_secret = api_secret.into();
        self
    }

    /// Version prefixed to request paths
    pub fn api_version(&self) -> &str {
        &self.config.api_version
    }

    /// Set the version prefix; empty disables it
    pub fn set_api_version(&mut self, api_version: impl Into<String>) -> &mut Self {
        self.config.api_version = api_version.into();
        self
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Set the request timeout
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.timeout = timeout;
        self
    }

    /// Send a GET request, parameters in the query string
    pub fn get<P: Serialize>(&mut self, path: &str, query: P) -> Result<&mut Self> {
        self.request("GET", path, query)
    }

    /// Send a POST request, parameters in a form body
    pub fn post<P: Serialize>(&mut self, path: &str, data: P) -> Result<&mut Self> {
        self.request("POST", path, data)
    }

    /// Send a PUT request, parameters in a form body
    pub fn put<P: Serialize>(&mut self, path: &str, data: P) -> Result<&mut Self> {
        self.request("PUT", path, data)
    }

    /// Build, sign and dispatch a request.
    ///
    /// # Arguments
    /// * `method` - HTTP method, case-insensitive
    /// * `path` - Path pattern, may contain `{name}` / `{name?}` variables
    /// * `param` - Parameters; path variables are taken out, the rest is sent
    ///
    /// On success the response replaces the previously stored one. On failure
    /// the previous response is left untouched.
    pub fn request<P: Serialize>(&mut self, method: &str, path: &str, param: P) -> Result<&mut Self> {
        if self.config.base_uri.is_empty() {
            return Err(ApiError::MissingBaseUri);
        }
        let context = self.prepare(method, path, param)?;
        let transport = self.transport()?;

        let method = context.method.clone();
        let path = context.path.clone();
        tracing::trace!(%method, %path, channel = ?context.channel, params = ?context.params, "prepared request");

        let start = Instant::now();
        let response = transport.send(context.into_transport_request())?;
        tracing::debug!(
            %method,
            %path,
            status = response.status,
            elapsed = ?start.elapsed(),
            effective_url = %response.effective_url,
            "request completed"
        );

        self.response = Some(response.into());
        Ok(self)
    }

    /// Run every step of [`ApiClient::request`] short of dispatching:
    /// compile the path, standardize and sign the parameters.
    pub fn prepare<P: Serialize>(&mut self, method: &str, path: &str, param: P) -> Result<RequestContext> {
        let params = to_params(param)?;

        let route = RouteTemplate::parse(path);
        let mut residual = route.residual(&params);
        let mut path = route.compile(&params)?;

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ApiError::InvalidMethod(method.to_string()))?;
        let channel = if method == Method::GET {
            Channel::Query
        } else {
            Channel::Form
        };
        // A null payload counts as no payload
        let json = residual
            .shift_remove(JSON_PAYLOAD_KEY)
            .filter(|payload| !payload.is_null());

        let standardized = standardize(&residual)?;
        let params = self
            .auth
            .auth_params(&self.config.api_key, &self.config.api_secret, standardized)?;

        if !self.config.api_version.is_empty() {
            path = format!("{}{}", self.config.api_version, path);
        }

        Ok(RequestContext {
            method,
            path,
            channel,
            json,
            params,
        })
    }

    /// Current transport, built on first use and rebuilt when the base URI or
    /// timeout changed
    fn transport(&mut self) -> Result<&dyn Transport> {
        if self.config.base_uri.is_empty() {
            return Err(ApiError::MissingBaseUri);
        }
        let key = (self.config.normalized_base_uri(), self.config.timeout);

        let entry = match self.transport.take() {
            Some(entry) if entry.0 == key => entry,
            _ => {
                tracing::debug!(base_uri = %key.0, timeout = ?key.1, "building HTTP transport");
                let transport = (self.transport_factory)(&key.0, key.1)?;
                (key, transport)
            }
        };

        let (_, transport) = self.transport.insert(entry);
        Ok(&**transport)
    }

    /// The last response, if any request has completed
    pub fn response(&self) -> Option<&ResponseState> {
        self.response.as_ref()
    }

    fn last_response(&self) -> Result<&ResponseState> {
        self.response.as_ref().ok_or(ApiError::NoResponse)
    }

    /// Status code of the last response
    pub fn status_code(&self) -> Result<u16> {
        Ok(self.last_response()?.status_code())
    }

    /// Decoded JSON body of the last response
    pub fn decoded_body(&self) -> Result<&Value> {
        self.last_response()?.decoded_body()
    }

    /// Decode the last response body into `T`
    pub fn apply<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.last_response()?.apply()
    }

    /// URL the last request was dispatched to, empty before the first one
    pub fn last_effective_url(&self) -> &str {
        self.response
            .as_ref()
            .map(|r| r.effective_url())
            .unwrap_or_default()
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_uri", &self.config.base_uri)
            .field("api_version", &self.config.api_version)
            .field("timeout", &self.config.timeout)
            .field("api_key", &self.config.api_key)
            .field("transport_built", &self.transport.is_some())
            .field("auth", &self.auth)
            .field("response", &self.response)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apikey::Ed25519Signer;
    use crate::auth::{Authenticator, HmacSigner};
    use crate::transport::TransportResponse;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records requests and answers with a canned body
    #[derive(Clone, Default)]
    struct Recorder {
        built: Arc<Mutex<Vec<(String, Duration)>>>,
        sent: Arc<Mutex<Vec<TransportRequest>>>,
        body: Arc<Mutex<String>>,
    }

    impl Recorder {
        fn factory(&self) -> TransportFactory {
            let recorder = self.clone();
            Box::new(move |base: &str, timeout: Duration| {
                recorder.built.lock().unwrap().push((base.to_string(), timeout));
                Ok(Box::new(RecordingTransport {
                    base: base.to_string(),
                    recorder: recorder.clone(),
                }) as Box<dyn Transport>)
            })
        }

        fn respond_with(&self, body: &str) {
            *self.body.lock().unwrap() = body.to_string();
        }

        fn sent(&self) -> Vec<TransportRequest> {
            self.sent.lock().unwrap().clone()
        }

        fn built(&self) -> usize {
            self.built.lock().unwrap().len()
        }
    }

    struct RecordingTransport {
        base: String,
        recorder: Recorder,
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            let effective_url = format!("{}{}", self.base, request.path);
            self.recorder.sent.lock().unwrap().push(request);
            Ok(TransportResponse {
                status: 200,
                effective_url,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: self.recorder.body.lock().unwrap().clone().into_bytes(),
            })
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            Err(ApiError::transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out",
            )))
        }
    }

    fn client(recorder: &Recorder) -> ApiClient {
        ApiClient::new(ClientConfig::new("https://api.example.com").with_credentials("key", "secret"))
            .with_transport_factory(recorder.factory())
    }

    fn query_value<'a>(request: &'a TransportRequest, key: &str) -> Option<&'a str> {
        request
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_get_with_path_variable() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client
            .get("/users/{id}", json!({"id": 7, "active": true}))
            .unwrap();

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "v1/users/7");
        assert!(request.form.is_empty());
        assert!(request.json.is_none());
        assert_eq!(query_value(request, "active"), Some("true"));
        assert_eq!(query_value(request, "api_key"), Some("key"));
        assert!(query_value(request, "signature").is_some());
        assert!(query_value(request, "timestamp").is_some());
        assert!(query_value(request, "id").is_none());
    }

    #[test]
    fn test_signature_covers_query() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client.get("/users", json!({"page": 2})).unwrap();

        let request = &recorder.sent()[0];
        let params: Params = request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let expected = HmacSigner::new("key", "secret").sign(&params).unwrap();
        assert_eq!(query_value(request, "signature"), Some(expected.as_str()));
    }

    #[test]
    fn test_post_uses_form_channel() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client
            .post("/orders/{id}", json!({"id": "A1", "qty": 3, "meta": {"gift": false}}))
            .unwrap();

        let request = &recorder.sent()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "v1/orders/A1");
        assert!(request.query.is_empty());
        assert!(request.form.contains(&("qty".to_string(), "3".to_string())));
        assert!(request
            .form
            .contains(&("meta[gift]".to_string(), "false".to_string())));
        assert!(request.form.iter().all(|(k, _)| k != "id"));
    }

    #[test]
    fn test_put_and_lowercase_method() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client.put("/items/1", json!({"name": "x"})).unwrap();
        client.request("delete", "/items/1", ()).unwrap();

        let sent = recorder.sent();
        assert_eq!(sent[0].method, Method::PUT);
        assert!(!sent[0].form.is_empty());
        assert_eq!(sent[1].method, Method::DELETE);
        assert!(sent[1].query.is_empty());
        assert!(!sent[1].form.is_empty());
    }

    #[test]
    fn test_json_payload_bypasses_signing() {
        let recorder = Recorder::default();
        let captured = Arc::new(Mutex::new(Vec::<Params>::new()));
        let seen = captured.clone();
        let mut client = client(&recorder).with_authenticator_factory(Box::new(
            move |_: &str, _: &str| {
                Ok(Box::new(Capture(seen.clone())) as Box<dyn Authenticator>)
            },
        ));

        client
            .post("/orders", json!({"json": {"sku": "A1", "qty": 2}}))
            .unwrap();

        let request = &recorder.sent()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.json, Some(json!({"sku": "A1", "qty": 2})));
        assert!(request.form.is_empty());
        assert_eq!(query_value(request, "captured"), Some("1"));

        let signed = captured.lock().unwrap();
        assert_eq!(signed.len(), 1);
        assert!(signed[0].is_empty());
    }

    struct Capture(Arc<Mutex<Vec<Params>>>);

    impl Authenticator for Capture {
        fn auth_params(&self, mut params: Params) -> Result<Params> {
            self.0.lock().unwrap().push(params.clone());
            params.insert("captured".to_string(), json!("1"));
            Ok(params)
        }
    }

    #[test]
    fn test_missing_base_uri_performs_no_request() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);
        client.set_base_uri("");

        let err = client.get("/users", json!({})).unwrap_err();
        assert!(matches!(err, ApiError::MissingBaseUri));
        assert!(err.is_config());
        assert_eq!(recorder.built(), 0);
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn test_missing_base_uri_checked_before_signing() {
        let recorder = Recorder::default();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        // The secret is not valid base64, so building the signer would fail
        let mut client = ApiClient::new(ClientConfig::default().with_credentials("key", "not!base64"))
            .with_transport_factory(recorder.factory())
            .with_authenticator_factory(Box::new(move |key: &str, secret: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(Ed25519Signer::new(key, secret)?) as Box<dyn Authenticator>)
            }));

        for method in ["GET", "POST", "PUT"] {
            let err = client.request(method, "/users", json!({"a": 1})).unwrap_err();
            assert!(matches!(err, ApiError::MissingBaseUri), "{method}: {err:?}");
            assert!(err.is_config());
        }
        assert!(matches!(client.post("/users", ()), Err(ApiError::MissingBaseUri)));
        assert!(matches!(client.put("/users", ()), Err(ApiError::MissingBaseUri)));

        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.built(), 0);
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn test_null_json_payload_is_absent() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        let context = client
            .prepare("POST", "/orders", json!({"json": null, "a": 1}))
            .unwrap();
        assert_eq!(context.channel, Channel::Form);
        assert!(context.json.is_none());

        client.post("/orders", json!({"json": null, "a": 1})).unwrap();

        let request = &recorder.sent()[0];
        assert!(request.json.is_none());
        assert!(request.query.is_empty());
        assert!(request.form.contains(&("a".to_string(), "1".to_string())));
        assert!(request.form.iter().any(|(k, _)| k == "signature"));
        assert!(request.form.iter().all(|(k, _)| k != "json"));
    }

    #[test]
    fn test_missing_credentials_fail_before_signer() {
        let recorder = Recorder::default();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut client = ApiClient::new(ClientConfig::new("https://api.example.com"))
            .with_transport_factory(recorder.factory())
            .with_authenticator_factory(Box::new(move |key: &str, secret: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(HmacSigner::new(key, secret)) as Box<dyn Authenticator>)
            }));

        let err = client.post("/orders", json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ApiError::MissingApiKey));

        client.set_credentials("key", "");
        let err = client.put("/orders", json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ApiError::MissingApiSecret));

        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(recorder.sent().is_empty());
    }

    #[test]
    fn test_version_prefix() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client.set_api_version("v2");
        client.get("/ping", ()).unwrap();
        client.set_api_version("");
        client.get("/ping", ()).unwrap();

        let sent = recorder.sent();
        assert_eq!(sent[0].path, "v2/ping");
        assert_eq!(sent[1].path, "/ping");
    }

    #[test]
    fn test_transport_reused_and_rebuilt() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        client.get("/a", ()).unwrap();
        client.get("/b", ()).unwrap();
        assert_eq!(recorder.built(), 1);

        client.set_timeout(Duration::from_secs(1));
        client.get("/c", ()).unwrap();
        assert_eq!(recorder.built(), 2);

        client.set_base_uri("https://other.example.com/");
        client.get("/d", ()).unwrap();
        assert_eq!(recorder.built(), 3);

        let built = recorder.built.lock().unwrap().clone();
        assert_eq!(built[0], ("https://api.example.com/".to_string(), Duration::from_secs(5)));
        assert_eq!(built[2], ("https://other.example.com/".to_string(), Duration::from_secs(1)));
    }

    #[test]
    fn test_response_accessors() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        assert_eq!(client.last_effective_url(), "");
        assert!(matches!(client.status_code(), Err(ApiError::NoResponse)));

        recorder.respond_with(r#"{"ok":true}"#);
        let body = client
            .get("/users/{id}", json!({"id": 7}))
            .unwrap()
            .decoded_body()
            .unwrap()
            .clone();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(client.status_code().unwrap(), 200);
        assert_eq!(
            client.response().unwrap().header("content-type"),
            Some("application/json")
        );
        assert_eq!(
            client.last_effective_url(),
            "https://api.example.com/v1/users/7"
        );
    }

    #[test]
    fn test_failed_request_keeps_previous_response() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);
        recorder.respond_with(r#"{"n":1}"#);
        client.get("/first", ()).unwrap();

        let mut client = client.with_transport_factory(Box::new(|_: &str, _: Duration| {
            Ok(Box::new(FailingTransport) as Box<dyn Transport>)
        }));
        let err = client.get("/second", ()).unwrap_err();
        assert!(err.is_transport());

        assert_eq!(client.decoded_body().unwrap(), &json!({"n": 1}));
        assert_eq!(client.last_effective_url(), "https://api.example.com/v1/first");
    }

    #[test]
    fn test_invalid_json_response() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);
        recorder.respond_with("not json");

        let err = client.get("/x", ()).unwrap().decoded_body().unwrap_err();
        assert!(err.is_response_parse());
    }

    #[test]
    fn test_prepare_rejects_bad_input() {
        let recorder = Recorder::default();
        let mut client = client(&recorder);

        assert!(matches!(
            client.prepare("GET", "/x", json!([1, 2])),
            Err(ApiError::InvalidParams(_))
        ));
        assert!(matches!(
            client.prepare("BAD METHOD", "/x", ()),
            Err(ApiError::InvalidMethod(_))
        ));
        assert!(matches!(
            client.prepare("GET", "/users/{id}", json!({"id": [1]})),
            Err(ApiError::InvalidPathParam { .. })
        ));
    }

    #[test]
    fn test_from_options() {
        let client = ApiClient::from_options(json!({
            "base_uri": "https://api.example.com",
            "time_out": 1.5,
            "api_version": "v3"
        }))
        .unwrap();

        assert_eq!(client.base_uri(), "https://api.example.com");
        assert_eq!(client.timeout(), Duration::from_millis(1500));
        assert_eq!(client.api_version(), "v3");
        assert_eq!(client.api_key(), "");
        assert_eq!(client.api_secret(), "");
    }
}
