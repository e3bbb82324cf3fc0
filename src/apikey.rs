use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{canonical_string, Authenticator, AuthenticatorFactory};
use crate::error::{ApiError, Result};
use crate::params::Params;

/// Ed25519Signer signs requests with an Ed25519 private key.
///
/// Adds `_key`, `_time` and `_nonce`, then `_sign` as the base64url
/// signature of the canonical parameter string.
pub struct Ed25519Signer {
    /// API key identifier
    pub key_id: String,
    /// Ed25519 keypair for signing
    keypair: Keypair,
}

// Manually implement Clone since ed25519-dalek 1.0's Keypair doesn't implement Clone
impl Clone for Ed25519Signer {
    fn clone(&self) -> Self {
        Ed25519Signer {
            key_id: self.key_id.clone(),
            keypair: Keypair {
                secret: SecretKey::from_bytes(self.keypair.secret.as_bytes())
                    .expect("valid secret key"),
                public: self.keypair.public,
            },
        }
    }
}

impl Ed25519Signer {
    /// Field carrying the signature
    pub const SIGNATURE: &'static str = "_sign";

    /// Create a signer from a key ID and base64-encoded secret
    ///
    /// # Arguments
    /// * `key_id` - The API key identifier
    /// * `secret` - The base64url-encoded Ed25519 private key
    pub fn new(key_id: impl Into<String>, secret: &str) -> Result<Self> {
        // Try to decode as base64url first (URL_SAFE_NO_PAD)
        let decoded = URL_SAFE_NO_PAD
            .decode(secret)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(secret))?;

        // Ed25519 secret keys are 32 bytes, but we may receive a 64-byte keypair
        let secret_key = match decoded.len() {
            32 | 64 => SecretKey::from_bytes(&decoded[..32])
                .map_err(|_| ApiError::Signing("invalid Ed25519 secret key".to_string()))?,
            len => {
                return Err(ApiError::Signing(format!(
                    "invalid key length: expected 32 or 64 bytes, got {}",
                    len
                )))
            }
        };

        let public_key: PublicKey = (&secret_key).into();
        let keypair = Keypair {
            secret: secret_key,
            public: public_key,
        };

        Ok(Ed25519Signer {
            key_id: key_id.into(),
            keypair,
        })
    }

    /// Factory for [`crate::ApiClient::with_authenticator_factory`]
    pub fn factory() -> AuthenticatorFactory {
        Box::new(|key: &str, secret: &str| {
            Ok(Box::new(Ed25519Signer::new(key, secret)?) as Box<dyn Authenticator>)
        })
    }

    /// Public half of the signing key
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    /// Base64url signature over the canonical form of `params`
    pub fn sign(&self, params: &Params) -> String {
        let message = canonical_string(params, Self::SIGNATURE);
        let signature: Signature = self.keypair.sign(message.as_bytes());

        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    }
}

impl Authenticator for Ed25519Signer {
    fn auth_params(&self, mut params: Params) -> Result<Params> {
        params.insert("_key".to_string(), Value::String(self.key_id.clone()));
        params.insert(
            "_time".to_string(),
            Value::String(Utc::now().timestamp().to_string()),
        );
        params.insert(
            "_nonce".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );

        let signature = self.sign(&params);
        params.insert(Self::SIGNATURE.to_string(), Value::String(signature));

        Ok(params)
    }
}

// Implement Debug manually to avoid exposing the secret key
impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("key_id", &self.key_id)
            .field("keypair", &"<redacted>")
            .finish()
    }
}
