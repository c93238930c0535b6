//! Token endpoint wire types shared by the device-code and refresh grants.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::{AuthError, Credential};
use crate::utils::truncate_body;

/// Scopes requested on login and refresh. `offline_access` yields a refresh token.
pub const SCOPES: &str = "offline_access User.Read Mail.ReadWrite Mail.Send \
    Calendars.ReadWrite Contacts.ReadWrite Files.ReadWrite.All Tasks.ReadWrite \
    Notes.ReadWrite.All";

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum characters of a server body echoed in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert to a credential, keeping `previous_refresh` if the server
    /// did not rotate the refresh token.
    pub fn into_credential(self, previous_refresh: Option<&str>) -> Credential {
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();
        Credential::issued_now(self.access_token, refresh_token, self.expires_in)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub fn description(&self) -> String {
        self.error_description
            .clone()
            .unwrap_or_else(|| self.error.clone())
    }
}

/// What the token endpoint said.
#[derive(Debug)]
pub enum TokenReply {
    Issued(TokenResponse),
    Rejected(TokenErrorResponse),
}

pub fn http_client() -> Result<Client, AuthError> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| AuthError::AuthServerError(format!("Failed to build HTTP client: {}", e)))
}

/// POST a form to the token endpoint and classify the reply.
///
/// Transport failures and unparseable bodies become `AuthServerError`.
pub async fn post_token(
    client: &Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<TokenReply, AuthError> {
    let response = client
        .post(url)
        .form(params)
        .send()
        .await
        .map_err(|e| AuthError::AuthServerError(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::AuthServerError(format!("Failed to read token response: {}", e)))?;

    parse_token_body(status, &body)
}

fn parse_token_body(status: reqwest::StatusCode, body: &str) -> Result<TokenReply, AuthError> {
    if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(body) {
        if !err.error.is_empty() {
            return Ok(TokenReply::Rejected(err));
        }
    }
    if status.is_success() {
        if let Ok(token) = serde_json::from_str::<TokenResponse>(body) {
            return Ok(TokenReply::Issued(token));
        }
    }
    Err(AuthError::AuthServerError(format!(
        "Status {}: {}",
        status,
        truncate_body(body, MAX_ERROR_BODY_LENGTH)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_parse_success() {
        let body = r#"{"access_token":"at","refresh_token":"rt","expires_in":3600,"token_type":"Bearer","scope":"User.Read"}"#;
        match parse_token_body(StatusCode::OK, body).unwrap() {
            TokenReply::Issued(token) => {
                assert_eq!(token.access_token, "at");
                assert_eq!(token.expires_in, 3600);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_on_bad_request() {
        let body = r#"{"error":"authorization_pending","error_description":"waiting"}"#;
        match parse_token_body(StatusCode::BAD_REQUEST, body).unwrap() {
            TokenReply::Rejected(err) => {
                assert_eq!(err.error, "authorization_pending");
                assert_eq!(err.description(), "waiting");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_is_server_error() {
        let result = parse_token_body(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(result, Err(AuthError::AuthServerError(_))));
    }

    #[test]
    fn test_keeps_previous_refresh_token() {
        let token = TokenResponse {
            access_token: "new".into(),
            refresh_token: None,
            expires_in: 60,
            token_type: None,
            scope: None,
        };
        let cred = token.into_credential(Some("old-refresh"));
        assert_eq!(cred.refresh_token, "old-refresh");
        assert!(cred.has_expiry());
    }

    #[test]
    fn test_server_error_body_is_truncated() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        match parse_token_body(StatusCode::BAD_GATEWAY, &long) {
            Err(AuthError::AuthServerError(msg)) => assert!(msg.contains("truncated")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
