use reqwest::Client;
use tracing::{debug, info, warn};

use super::oauth::{self, TokenReply, REFRESH_TOKEN_GRANT, SCOPES};
use super::{AuthError, Credential, TokenStore};
use crate::config::AuthEndpoints;

/// Exchanges refresh tokens for new access tokens.
pub struct TokenRefresher {
    client: Client,
    endpoints: AuthEndpoints,
}

impl TokenRefresher {
    pub fn new(endpoints: AuthEndpoints) -> Result<Self, AuthError> {
        Ok(Self {
            client: oauth::http_client()?,
            endpoints,
        })
    }

    /// Return a credential that is safe to use right now.
    ///
    /// A credential without expiry, or one not yet expired, is returned as
    /// is with no network traffic. An expired one is refreshed and the
    /// result saved to `store` before it is returned.
    pub async fn ensure_fresh(
        &self,
        credential: Credential,
        client_id: &str,
        store: &dyn TokenStore,
    ) -> Result<Credential, AuthError> {
        if !credential.is_expired() {
            return Ok(credential);
        }
        if !credential.can_refresh() || client_id.is_empty() {
            debug!(
                has_refresh_token = credential.can_refresh(),
                has_client_id = !client_id.is_empty(),
                "Expired token cannot be refreshed"
            );
            return Err(AuthError::ReauthRequired);
        }

        let refreshed = self.refresh(&credential, client_id).await?;
        store.save(&refreshed)?;
        info!("Access token refreshed");
        Ok(refreshed)
    }

    /// Exchange the refresh token without touching storage.
    pub async fn refresh(
        &self,
        credential: &Credential,
        client_id: &str,
    ) -> Result<Credential, AuthError> {
        let params = [
            ("grant_type", REFRESH_TOKEN_GRANT),
            ("client_id", client_id),
            ("refresh_token", credential.refresh_token.as_str()),
            ("scope", SCOPES),
        ];

        let reply = oauth::post_token(&self.client, &self.endpoints.token_url, &params)
            .await
            .map_err(|e| match e {
                AuthError::AuthServerError(msg) => AuthError::RefreshFailed(msg),
                other => other,
            })?;

        match reply {
            TokenReply::Issued(token) => {
                Ok(token.into_credential(Some(credential.refresh_token.as_str())))
            }
            TokenReply::Rejected(err) => {
                warn!(error = %err.error, "Refresh token rejected");
                Err(AuthError::RefreshFailed(err.description()))
            }
        }
    }
}
