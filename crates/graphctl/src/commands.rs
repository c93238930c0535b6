//! Command handlers. Each one loads what it needs from the config directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use graphctl_core::api::{AuthenticatedClient, DEFAULT_API_BASE_URL};
use graphctl_core::auth::{open_store, AuthError, DeviceCodeAuthenticator, TokenRefresher};
use graphctl_core::config::{self, AuthConfig, AuthEndpoints, StorageBackend, CLIENT_ID_ENV};
use graphctl_core::SlugRegistry;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Config directory plus the config loaded from it.
struct Profile {
    dir: PathBuf,
    config: AuthConfig,
}

impl Profile {
    fn load() -> Result<Self> {
        let dir = config::config_dir()?;
        let config = AuthConfig::load(&dir)?;
        Ok(Self { dir, config })
    }

    fn slugs(&self) -> SlugRegistry {
        SlugRegistry::in_dir(&self.dir)
    }

    async fn client(&self) -> Result<AuthenticatedClient> {
        let store = open_store(&self.config, &self.dir);
        let refresher = TokenRefresher::new(AuthEndpoints::from_env())?;
        let client = AuthenticatedClient::connect(
            &self.config,
            store.as_ref(),
            &refresher,
            DEFAULT_API_BASE_URL,
        )
        .await?;
        Ok(client)
    }
}

/// `--keyring` / `--file` flags to an explicit backend, if one was given.
pub fn backend_choice(keyring: bool, file: bool) -> Option<StorageBackend> {
    match (keyring, file) {
        (true, _) => Some(StorageBackend::Keyring),
        (false, true) => Some(StorageBackend::File),
        (false, false) => None,
    }
}

/// Remove the credential left behind when login moves to another backend.
/// Failures are logged; the new login stands either way.
fn retire_previous_store(previous: &AuthConfig, current: &AuthConfig, dir: &Path) {
    if previous.storage == current.storage {
        return;
    }
    match open_store(previous, dir).delete() {
        Ok(()) => info!(
            from = %previous.storage,
            to = %current.storage,
            "Removed token from previous backend"
        ),
        Err(e) => warn!(
            error = %e,
            backend = %previous.storage,
            "Could not remove token from previous backend"
        ),
    }
}

pub async fn login(client_id: Option<String>, backend: Option<StorageBackend>) -> Result<()> {
    let mut profile = Profile::load()?;
    let previous = profile.config.clone();

    let client_id = client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| profile.config.effective_client_id());
    if client_id.is_empty() {
        anyhow::bail!("No client ID configured. Pass --client-id or set {}", CLIENT_ID_ENV);
    }
    profile.config.client_id = client_id.clone();
    if let Some(backend) = backend {
        profile.config.storage = backend;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let authenticator = DeviceCodeAuthenticator::new(AuthEndpoints::from_env())?;
    let credential = authenticator
        .login(&client_id, &cancel, |code| {
            eprintln!("{}", code.prompt());
            eprintln!("Waiting for sign-in...");
        })
        .await?;

    let store = open_store(&profile.config, &profile.dir);
    store
        .save(&credential)
        .context("Signed in, but the token could not be saved")?;
    profile
        .config
        .save(&profile.dir)
        .context("Failed to save config")?;
    retire_previous_store(&previous, &profile.config, &profile.dir);

    info!(storage = %profile.config.storage, "Login successful");
    println!("Logged in (token stored in {}).", profile.config.storage);
    Ok(())
}

pub fn logout() -> Result<()> {
    let profile = Profile::load()?;
    open_store(&profile.config, &profile.dir)
        .delete()
        .context("Failed to remove stored token")?;

    let slugs = profile.slugs();
    slugs.clear();
    if slugs.is_memory_only() {
        warn!("Slug table could not be cleared on disk");
    }

    println!("Logged out.");
    Ok(())
}

pub fn status() -> Result<()> {
    let profile = Profile::load()?;
    let client_id = profile.config.effective_client_id();
    println!(
        "Client ID: {}",
        if client_id.is_empty() { "(none)" } else { client_id.as_str() }
    );
    println!("Storage:   {}", profile.config.storage);

    match open_store(&profile.config, &profile.dir).load() {
        Ok(credential) => {
            let expiry = match credential.minutes_until_expiry() {
                None => "no expiry recorded".to_string(),
                Some(_) if credential.is_expired() => "expired".to_string(),
                Some(minutes) => format!("expires in {} min", minutes),
            };
            let refresh = if credential.can_refresh() {
                "refreshable"
            } else {
                "not refreshable"
            };
            println!("Status:    logged in ({}, {})", expiry, refresh);
        }
        Err(AuthError::NotAuthenticated) => println!("Status:    not logged in"),
        Err(e) => return Err(e).context("Failed to read stored token"),
    }
    Ok(())
}

pub async fn token() -> Result<()> {
    let profile = Profile::load()?;
    let store = open_store(&profile.config, &profile.dir);
    let credential = store.load()?;
    let refresher = TokenRefresher::new(AuthEndpoints::from_env())?;
    let credential = refresher
        .ensure_fresh(credential, &profile.config.effective_client_id(), store.as_ref())
        .await?;
    println!("{}", credential.access_token);
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
}

pub async fn me() -> Result<()> {
    let profile = Profile::load()?;
    let client = profile.client().await?;
    let user: User = client.get("me").await.context("Failed to fetch profile")?;

    let slugs = profile.slugs();
    println!("Name:  {}", user.display_name.as_deref().unwrap_or("-"));
    println!(
        "Email: {}",
        user.mail
            .as_deref()
            .or(user.user_principal_name.as_deref())
            .unwrap_or("-")
    );
    println!("ID:    {}", slugs.compress(&user.id));
    Ok(())
}

pub fn slug(ids: &[String]) -> Result<()> {
    let slugs = Profile::load()?.slugs();
    for id in ids {
        println!("{}\t{}", slugs.compress(id), id);
    }
    Ok(())
}

pub fn resolve(tokens: &[String]) -> Result<()> {
    let slugs = Profile::load()?.slugs();
    for token in tokens {
        println!("{}", slugs.expand(token));
    }
    Ok(())
}
