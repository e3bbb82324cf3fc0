use thiserror::Error;

/// Main error type for API client operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// No base URI configured when a request needed one
    #[error("no valid base URI configured")]
    MissingBaseUri,

    /// No API key configured when a signed request needed one
    #[error("no valid API key configured")]
    MissingApiKey,

    /// No API secret configured when a signed request needed one
    #[error("no valid API secret configured")]
    MissingApiSecret,

    /// Configured base URI could not be parsed
    #[error("invalid base URI {uri:?}: {source}")]
    InvalidBaseUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// Response body is not valid JSON
    #[error("failed to parse JSON: {source}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
    },

    /// Failure reported by the HTTP transport (connect, timeout, TLS, ...)
    #[error("HTTP transport error: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// HTTP method name not understood
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// A path variable was given a nested value
    #[error("path variable {name:?} must be a scalar value")]
    InvalidPathParam { name: String },

    /// Parameters nest deeper than the standardizer accepts
    #[error("parameters nested deeper than {limit} levels")]
    ParamsTooDeep { limit: usize },

    /// Parameters did not serialize to a key/value object
    #[error("invalid request parameters: {0}")]
    InvalidParams(String),

    /// Signer construction or signing failure
    #[error("signing error: {0}")]
    Signing(String),

    /// Base64 decoding error
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// JSON serialization of request parameters failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response accessors were called before any request completed
    #[error("no response available, no request has completed yet")]
    NoResponse,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::transport(err)
    }
}

impl ApiError {
    /// Wrap any transport failure
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ApiError::Transport {
            source: Box::new(err),
        }
    }

    /// Check if this error comes from missing or invalid client configuration
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ApiError::MissingBaseUri
                | ApiError::MissingApiKey
                | ApiError::MissingApiSecret
                | ApiError::InvalidBaseUri { .. }
        )
    }

    /// Check if this error is a response body decode failure
    pub fn is_response_parse(&self) -> bool {
        matches!(self, ApiError::ResponseParse { .. })
    }

    /// Check if this error was raised by the transport
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }

    /// Check if this is a transport timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            ApiError::Transport { source } => source
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| e.is_timeout()),
            _ => false,
        }
    }
}

/// Result type for API client operations
pub type Result<T> = std::result::Result<T, ApiError>;
