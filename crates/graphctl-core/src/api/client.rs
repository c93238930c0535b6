//! Bearer-token HTTP client for the Graph REST API.

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{Credential, TokenRefresher, TokenStore};
use crate::config::AuthConfig;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for Graph API endpoints
pub const DEFAULT_API_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Request payload, kept owned so a rate-limited request can be resent.
enum Payload {
    Empty,
    Json(serde_json::Value),
    Raw { bytes: Vec<u8>, content_type: String },
}

/// Graph client holding a usable access token.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    base_url: String,
    token: String,
}

impl AuthenticatedClient {
    /// Create a client for an access token that is already known to be fresh.
    pub fn new(base_url: &str, token: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Load the stored credential, refresh it if it has expired, and build a
    /// client around it.
    pub async fn connect(
        config: &AuthConfig,
        store: &dyn TokenStore,
        refresher: &TokenRefresher,
        base_url: &str,
    ) -> Result<Self, ApiError> {
        let credential = store.load()?;
        let credential = refresher
            .ensure_fresh(credential, &config.effective_client_id(), store)
            .await?;
        Self::from_credential(base_url, &credential)
    }

    pub fn from_credential(base_url: &str, credential: &Credential) -> Result<Self, ApiError> {
        Self::new(base_url, credential.access_token.clone())
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, Payload::Empty).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, Self::json_payload(body)?).await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PATCH, path, Self::json_payload(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send::<serde_json::Value>(Method::DELETE, path, Payload::Empty)
            .await
            .map(|_| ())
    }

    /// PUT an opaque body, e.g. file content uploads.
    pub async fn put_raw<T: DeserializeOwned>(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<T, ApiError> {
        let payload = Payload::Raw {
            bytes,
            content_type: content_type.to_string(),
        };
        self.send(Method::PUT, path, payload).await
    }

    fn json_payload<B: Serialize>(body: &B) -> Result<Payload, ApiError> {
        serde_json::to_value(body)
            .map(Payload::Json)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))
    }

    /// Absolute URLs (e.g. `@odata.nextLink`) are used as given.
    fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header(header::ACCEPT, "application/json");
            request = match &payload {
                Payload::Empty => request,
                Payload::Json(value) => request.json(value),
                Payload::Raw {
                    bytes,
                    content_type,
                } => request
                    .header(header::CONTENT_TYPE, content_type.as_str())
                    .body(bytes.clone()),
            };

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                let body = response.text().await?;
                debug!(%method, url = %url, status = status.as_u16(), "Request succeeded");
                return Self::parse_body(&body);
            }

            if status.as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &body));
        }
    }

    /// Empty bodies (204 No Content) decode as JSON `null`.
    fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
        let text = if body.trim().is_empty() { "null" } else { body };
        serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}
