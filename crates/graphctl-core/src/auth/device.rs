//! OAuth 2.0 Device Authorization Grant (RFC 8628).
//!
//! The user opens `verification_uri` in any browser and types `user_code`
//! while we poll the token endpoint. Polling stops on success, on a
//! non-pending error, when the device code's own lifetime runs out, or
//! when the caller's cancellation token fires.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::oauth::{self, TokenReply, DEVICE_CODE_GRANT, SCOPES};
use super::{AuthError, Credential};
use crate::config::AuthEndpoints;
use crate::utils::truncate_body;

/// Maximum characters of a server body echoed in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Extra delay added on every `slow_down` reply (RFC 8628 §3.5).
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Shortest wait between token requests, whatever the server asks for.
const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Upper bound on a device code's lifetime.
const MAX_DEVICE_CODE_LIFETIME_SECS: u64 = 24 * 60 * 60;

fn default_interval() -> u64 {
    5
}

fn default_expires_in() -> u64 {
    900
}

/// Device-code response from the authorization server.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default)]
    pub message: Option<String>,
}

impl DeviceCode {
    /// Instructions to show the user.
    pub fn prompt(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                self.verification_uri, self.user_code
            )
        })
    }
}

/// Pacing of the token polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Floor applied to the server's `interval`.
    pub min_interval: Duration,
    /// Added to the interval on each `slow_down` reply.
    pub slow_down_step: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(MIN_POLL_INTERVAL_SECS),
            slow_down_step: Duration::from_secs(SLOW_DOWN_STEP_SECS),
        }
    }
}

impl PollTiming {
    fn initial_interval(&self, code: &DeviceCode) -> Duration {
        Duration::from_secs(code.interval).max(self.min_interval)
    }
}

pub struct DeviceCodeAuthenticator {
    client: Client,
    endpoints: AuthEndpoints,
    timing: PollTiming,
}

impl DeviceCodeAuthenticator {
    pub fn new(endpoints: AuthEndpoints) -> Result<Self, AuthError> {
        Ok(Self {
            client: oauth::http_client()?,
            endpoints,
            timing: PollTiming::default(),
        })
    }

    pub fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Ask the server for a device code and user code.
    pub async fn request_code(&self, client_id: &str) -> Result<DeviceCode, AuthError> {
        let response = self
            .client
            .post(&self.endpoints.device_code_url)
            .form(&[("client_id", client_id), ("scope", SCOPES)])
            .send()
            .await
            .map_err(|e| AuthError::AuthServerError(format!("Device code request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::AuthServerError(format!("Failed to read device code response: {}", e))
        })?;

        if !status.is_success() {
            return Err(AuthError::AuthServerError(format!(
                "Device code request returned {}: {}",
                status,
                truncate_body(&body, MAX_ERROR_BODY_LENGTH)
            )));
        }

        let code: DeviceCode = serde_json::from_str(&body).map_err(|e| {
            AuthError::AuthServerError(format!("Malformed device code response: {}", e))
        })?;
        debug!(
            interval = code.interval,
            expires_in = code.expires_in,
            "Device code issued"
        );
        Ok(code)
    }

    /// Poll the token endpoint until the user finishes signing in.
    pub async fn poll(
        &self,
        client_id: &str,
        code: &DeviceCode,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let lifetime = code.expires_in.min(MAX_DEVICE_CODE_LIFETIME_SECS);
        let deadline = Instant::now() + Duration::from_secs(lifetime);
        let mut interval = self.timing.initial_interval(code);
        let params = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", client_id),
            ("device_code", code.device_code.as_str()),
        ];

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            if Instant::now() >= deadline {
                return Err(AuthError::DeviceCodeExpired);
            }

            match oauth::post_token(&self.client, &self.endpoints.token_url, &params).await? {
                TokenReply::Issued(token) => {
                    info!("Device authorization completed");
                    return Ok(token.into_credential(None));
                }
                TokenReply::Rejected(err) => match err.error.as_str() {
                    "authorization_pending" => {
                        debug!("Authorization pending");
                    }
                    "slow_down" => {
                        interval += self.timing.slow_down_step;
                        debug!(interval_ms = interval.as_millis() as u64, "Server asked to slow down");
                    }
                    _ => {
                        return Err(AuthError::AuthorizationFailed {
                            description: err.description(),
                            code: err.error,
                        })
                    }
                },
            }
        }
    }

    /// Full login: request a code, hand it to `on_code` for display, then poll.
    pub async fn login(
        &self,
        client_id: &str,
        cancel: &CancellationToken,
        on_code: impl FnOnce(&DeviceCode),
    ) -> Result<Credential, AuthError> {
        let code = self.request_code(client_id).await?;
        on_code(&code);
        self.poll(client_id, &code, cancel).await
    }
}
