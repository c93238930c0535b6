//! Application configuration management.
//!
//! This module handles loading and saving the auth configuration, which
//! records the OAuth client ID and which backend holds the credential.
//!
//! Configuration is stored at `~/.config/graphctl/config.json` unless
//! `GRAPHCTL_CONFIG_DIR` points somewhere else.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config directory paths
const APP_NAME: &str = "graphctl";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "GRAPHCTL_CONFIG_DIR";

/// Environment variable providing the OAuth client ID
pub const CLIENT_ID_ENV: &str = "GRAPHCTL_CLIENT_ID";

/// Environment variable overriding the identity authority base URL
pub const AUTHORITY_ENV: &str = "GRAPHCTL_AUTHORITY";

/// Microsoft identity platform, multi-tenant authority
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common/oauth2/v2.0";

/// Where the credential record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Keyring => write!(f, "keyring"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(from = "StoredAuthConfig")]
pub struct AuthConfig {
    pub client_id: String,
    pub storage: StorageBackend,
}

/// Config as written on disk. The client ID may appear under either
/// spelling, or both; `client_id` wins when both are non-empty.
#[derive(Deserialize)]
struct StoredAuthConfig {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default, rename = "clientId")]
    client_id_camel: Option<String>,
    #[serde(default)]
    storage: StorageBackend,
}

impl From<StoredAuthConfig> for AuthConfig {
    fn from(stored: StoredAuthConfig) -> Self {
        let client_id = stored
            .client_id
            .filter(|id| !id.is_empty())
            .or(stored.client_id_camel)
            .unwrap_or_default();
        Self {
            client_id,
            storage: stored.storage,
        }
    }
}

impl AuthConfig {
    /// Load the config from `dir`, returning defaults if no file exists yet.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(storage = %config.storage, "Config loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE), contents)?;
        Ok(())
    }

    /// Client ID from the environment if set, otherwise the stored one.
    pub fn effective_client_id(&self) -> String {
        match std::env::var(CLIENT_ID_ENV) {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => self.client_id.clone(),
        }
    }
}

/// Resolve the directory holding config, token, and slug files.
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(config_dir.join(APP_NAME))
}

/// OAuth endpoints of the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub device_code_url: String,
    pub token_url: String,
}

impl AuthEndpoints {
    /// Build endpoints under an authority base such as
    /// `https://login.microsoftonline.com/common/oauth2/v2.0`.
    pub fn from_authority(authority: &str) -> Self {
        let base = authority.trim_end_matches('/');
        Self {
            device_code_url: format!("{}/devicecode", base),
            token_url: format!("{}/token", base),
        }
    }

    /// Endpoints from `GRAPHCTL_AUTHORITY`, falling back to the public cloud.
    pub fn from_env() -> Self {
        match std::env::var(AUTHORITY_ENV) {
            Ok(authority) if !authority.is_empty() => Self::from_authority(&authority),
            _ => Self::default(),
        }
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self::from_authority(DEFAULT_AUTHORITY)
    }
}
