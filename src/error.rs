//! Error types for fishsync

use std::time::Duration;
use thiserror::Error;

use crate::client::models::Family;

/// Result type alias for fishsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used when reporting contained failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, timeout, rate limit or server failure; retried on the next tick
    Transient,
    /// Credential rejected, permission denied or no credential yet
    Auth,
    /// Malformed payload from the registry
    Decode,
    /// Lookup of an absent key
    NotFound,
    /// Local configuration or I/O problem
    Local,
}

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{family} {key} not found")]
    NotFound { family: Family, key: String },

    #[error("Operation failed: {0}")]
    Other(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Api(err) => err.class(),
            Error::Json(_) => ErrorClass::Decode,
            Error::NotFound { .. } => ErrorClass::NotFound,
            Error::Config(_) | Error::Io(_) | Error::Other(_) => ErrorClass::Local,
        }
    }
}

/// Registry transport errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid FishFish API token")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("No session credential available yet")]
    MissingCredential,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Unauthorized | ApiError::Forbidden(_) | ApiError::MissingCredential => {
                ErrorClass::Auth
            }
            ApiError::InvalidResponse(_) | ApiError::BadRequest(_) => ErrorClass::Decode,
            ApiError::NotFound(_) => ErrorClass::NotFound,
            ApiError::RateLimit(_)
            | ApiError::ServerError(_)
            | ApiError::Network(_)
            | ApiError::Stream(_) => ErrorClass::Transient,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response) => match response.status().as_u16() {
                401 => ApiError::Unauthorized,
                403 => ApiError::Forbidden("stream connection refused".to_string()),
                status => ApiError::Stream(format!("handshake rejected with status {}", status)),
            },
            other => ApiError::Stream(other.to_string()),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("API key not configured. Set `api_key` or FISHFISH_API_KEY.")]
    MissingApiKey,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
