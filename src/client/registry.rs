//! FishFish registry client implementation

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};

use super::models::{CreateSessionTokenRequest, Credential, Domain, Permission, Url};
use super::rate_limit::{EndpointCategory, RateLimiterSet};
use super::{RegistryApi, StreamConnection, stream};
use crate::config::Config;
use crate::error::{ApiError, ConfigError, Result};

/// FishFish API base URL
pub const API_BASE_URL: &str = "https://api.fishfish.gg/v1";

/// FishFish change stream URL
pub const STREAM_URL: &str = "wss://api.fishfish.gg/v1/stream";

const USER_AGENT: &str = concat!("fishsync/", env!("CARGO_PKG_VERSION"));

/// FishFish registry client
pub struct RegistryClient {
    http: HttpClient,
    base_url: String,
    stream_url: String,
    primary_token: String,
    rate_limiters: RateLimiterSet,
}

impl RegistryClient {
    /// Create a client authenticating token requests with `primary_token`
    pub fn new(primary_token: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: API_BASE_URL.to_string(),
            stream_url: STREAM_URL.to_string(),
            primary_token: primary_token.into(),
            rate_limiters: RateLimiterSet::new(),
        })
    }

    /// Build a client from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key_or_env().ok_or(ConfigError::MissingApiKey)?;
        Ok(Self::new(api_key)?.with_endpoints(&config.api_url, &config.stream_url))
    }

    /// Point the client at a different API and stream host
    pub fn with_endpoints(mut self, base_url: &str, stream_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.stream_url = stream_url.to_string();
        self
    }

    /// Make an API request authorized with `authorization`
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        authorization: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let category = EndpointCategory::from_request(path, &method);
        self.rate_limiters.wait_for(category).await;

        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header("Authorization", authorization)
            .header("Accept", "application/json")
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(ApiError::from)?;

        let status = response.status();
        match status {
            status if status.is_success() => {
                let data = response.json::<T>().await.map_err(|e| {
                    ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
                })?;
                Ok(data)
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized.into()),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden(format!(
                "not authorized to perform {} on {}",
                method, path
            ))
            .into()),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(path.to_string()).into()),
            StatusCode::TOO_MANY_REQUESTS => {
                self.rate_limiters.activate(category);
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                Err(ApiError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Bad request".to_string());
                Err(ApiError::BadRequest(error_msg).into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(ApiError::ServerError(error_msg).into())
            }
            _ => {
                let error_msg = format!("Unexpected status code: {}", status);
                Err(ApiError::InvalidResponse(error_msg).into())
            }
        }
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn request_credential(&self, permissions: &[Permission]) -> Result<Credential> {
        if self.primary_token.is_empty() {
            return Err(ApiError::Unauthorized.into());
        }

        let body = serde_json::to_value(CreateSessionTokenRequest { permissions })?;
        let result = self
            .request(
                Method::POST,
                "/users/@me/tokens",
                &[],
                &self.primary_token,
                Some(body),
            )
            .await;

        match result {
            Err(crate::error::Error::Api(ApiError::Forbidden(_))) => Err(ApiError::Forbidden(
                "unauthorized for specified permission(s)".to_string(),
            )
            .into()),
            other => other,
        }
    }

    async fn fetch_domains(&self, credential: &Credential) -> Result<Vec<Domain>> {
        self.request(
            Method::GET,
            "/domains",
            &[("full", "true")],
            &credential.token,
            None,
        )
        .await
    }

    async fn fetch_urls(&self, credential: &Credential) -> Result<Vec<Url>> {
        self.request(
            Method::GET,
            "/urls",
            &[("full", "true")],
            &credential.token,
            None,
        )
        .await
    }

    async fn open_stream(&self, credential: &Credential) -> Result<StreamConnection> {
        let mut request = self
            .stream_url
            .as_str()
            .into_client_request()
            .map_err(ApiError::from)?;

        let token = HeaderValue::from_str(&credential.token)
            .map_err(|_| ApiError::Stream("credential is not a valid header value".to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, token);
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        let (socket, _response) = connect_async(request).await.map_err(ApiError::from)?;
        debug!("Connected to change stream at {}", self.stream_url);

        Ok(stream::split_connection(socket))
    }
}
