//! # signed-api-client
//!
//! A blocking client core for HTTP APIs that expect signed parameters.
//! It compiles templated paths, normalizes parameters to text, signs them,
//! dispatches the request and decodes JSON responses.
//!
//! ## Features
//!
//! - Path templates with `{name}` / `{name?}` variables taken from the
//!   request parameters
//! - Recursive standardization of parameter values before signing
//! - Pluggable signers: HMAC-SHA256 (default) and Ed25519
//! - Pluggable transport, `reqwest` by default, with effective URL capture
//! - Distinct configuration, transport and response-parse errors
//!
//! ## Basic Usage
//!
//! ```no_run
//! use signed_api_client::{ApiClient, ClientConfig};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://api.example.com")
//!         .with_credentials("key", "secret");
//!     let mut client = ApiClient::new(config);
//!
//!     // GET v1/users/7?active=true&api_key=...&signature=...
//!     let body = client
//!         .get("/users/{id}", json!({"id": 7, "active": true}))?
//!         .decoded_body()?;
//!     println!("user: {}", body);
//!
//!     println!("sent to {}", client.last_effective_url());
//!     Ok(())
//! }
//! ```
//!
//! ## JSON payloads
//!
//! A `json` parameter is sent verbatim as the request body. It is neither
//! standardized nor signed; the remaining parameters are signed and travel
//! in the query string.
//!
//! ```no_run
//! use signed_api_client::{ApiClient, ClientConfig};
//! use serde_json::json;
//!
//! let mut client = ApiClient::new(
//!     ClientConfig::new("https://api.example.com").with_credentials("key", "secret"),
//! );
//! client.post("/orders", json!({"json": {"sku": "A1"}}))?;
//! # Ok::<(), signed_api_client::ApiError>(())
//! ```
//!
//! ## Ed25519 signing
//!
//! ```no_run
//! use signed_api_client::{ApiClient, ClientConfig, Ed25519Signer};
//!
//! let client = ApiClient::new(
//!     ClientConfig::new("https://api.example.com")
//!         .with_credentials("key-12345", "base64url_encoded_secret"),
//! )
//! .with_authenticator_factory(Ed25519Signer::factory());
//! ```

pub mod apikey;
pub mod auth;
pub mod client;
pub mod error;
pub mod params;
pub mod response;
pub mod rest;
pub mod route;
pub mod transport;

// Re-export main types for convenience
pub use apikey::Ed25519Signer;
pub use auth::{AuthAdapter, Authenticator, AuthenticatorFactory, HmacSigner};
pub use client::ClientConfig;
pub use error::{ApiError, Result};
pub use params::{standardize, Params};
pub use response::ResponseState;
pub use rest::{ApiClient, Channel, RequestContext};
pub use route::RouteTemplate;
pub use transport::{HttpTransport, Transport, TransportFactory, TransportRequest, TransportResponse};

// Re-export serde_json for convenience
pub use serde_json::json;
