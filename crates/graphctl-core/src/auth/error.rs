use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not logged in - run `graphctl login`")]
    NotAuthenticated,

    #[error("Access token expired and cannot be refreshed - run `graphctl login`")]
    ReauthRequired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Authorization failed ({code}): {description}")]
    AuthorizationFailed { code: String, description: String },

    #[error("Unexpected response from authorization server: {0}")]
    AuthServerError(String),

    #[error("Device code expired before authorization completed")]
    DeviceCodeExpired,

    #[error("Login cancelled")]
    Cancelled,

    #[error("Credential storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Failed to encode credential: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// True when the user can recover by running login again.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::ReauthRequired | AuthError::RefreshFailed(_)
        )
    }
}
