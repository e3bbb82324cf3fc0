//! Request signing.
//!
//! An [`Authenticator`] turns a standardized parameter set into the set that
//! is actually transmitted, adding whatever signing metadata the remote API
//! expects. [`AuthAdapter`] owns the lazily built signer and checks the
//! credential pair before it is ever consulted.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::params::{flatten, Params};

type HmacSha256 = Hmac<Sha256>;

/// Signing collaborator built from an API key and secret
pub trait Authenticator: Send + Sync {
    /// Return the parameters to send, including signing metadata
    fn auth_params(&self, params: Params) -> Result<Params>;
}

/// Builds an [`Authenticator`] for a credential pair
pub type AuthenticatorFactory =
    Box<dyn Fn(&str, &str) -> Result<Box<dyn Authenticator>> + Send + Sync>;

/// Default factory, producing an [`HmacSigner`]
pub fn hmac_factory() -> AuthenticatorFactory {
    Box::new(|key: &str, secret: &str| Ok(Box::new(HmacSigner::new(key, secret)) as Box<dyn Authenticator>))
}

/// Canonical string signed by the bundled signers: parameters flattened,
/// sorted by key, form-urlencoded, with `exclude` left out.
pub fn canonical_string(params: &Params, exclude: &str) -> String {
    let mut pairs: Vec<(String, String)> = flatten(params)
        .into_iter()
        .filter(|(k, _)| k != exclude)
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// HMAC-SHA256 signer.
///
/// Adds `api_key`, `timestamp` and `echostr`, then `signature` as the hex
/// digest of the canonical string keyed by the secret.
#[derive(Clone)]
pub struct HmacSigner {
    api_key: String,
    secret: String,
}

impl HmacSigner {
    /// Field carrying the signature
    pub const SIGNATURE: &'static str = "signature";

    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        HmacSigner {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    /// Key sent as the `api_key` parameter
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Hex HMAC-SHA256 over the canonical form of `params`
    pub fn sign(&self, params: &Params) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ApiError::Signing(format!("invalid secret key: {}", e)))?;
        mac.update(canonical_string(params, Self::SIGNATURE).as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Authenticator for HmacSigner {
    fn auth_params(&self, mut params: Params) -> Result<Params> {
        params.insert("api_key".to_string(), Value::String(self.api_key.clone()));
        params.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().timestamp().to_string()),
        );
        params.insert(
            "echostr".to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );

        let signature = self.sign(&params)?;
        params.insert(Self::SIGNATURE.to_string(), Value::String(signature));

        Ok(params)
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Lazily constructed signer bound to one credential pair
pub struct AuthAdapter {
    factory: AuthenticatorFactory,
    current: Option<(String, String, Box<dyn Authenticator>)>,
}

impl AuthAdapter {
    pub fn new(factory: AuthenticatorFactory) -> Self {
        AuthAdapter {
            factory,
            current: None,
        }
    }

    /// Replace the factory, dropping any signer it built
    pub fn set_factory(&mut self, factory: AuthenticatorFactory) {
        self.factory = factory;
        self.current = None;
    }

    /// Sign standardized parameters with the given credentials.
    ///
    /// Fails before touching the signer if either credential is empty.
    pub fn auth_params(&mut self, api_key: &str, api_secret: &str, params: Params) -> Result<Params> {
        if api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }
        if api_secret.is_empty() {
            return Err(ApiError::MissingApiSecret);
        }

        self.authenticator(api_key, api_secret)?.auth_params(params)
    }

    fn authenticator(&mut self, api_key: &str, api_secret: &str) -> Result<&dyn Authenticator> {
        let entry = match self.current.take() {
            Some(entry) if entry.0 == api_key && entry.1 == api_secret => entry,
            _ => {
                tracing::debug!(api_key, "building request signer");
                let signer = (self.factory)(api_key, api_secret)?;
                (api_key.to_string(), api_secret.to_string(), signer)
            }
        };

        let (_, _, signer) = self.current.insert(entry);
        Ok(&**signer)
    }
}

impl Default for AuthAdapter {
    fn default() -> Self {
        Self::new(hmac_factory())
    }
}

impl fmt::Debug for AuthAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthAdapter")
            .field("built", &self.current.is_some())
            .finish()
    }
}
