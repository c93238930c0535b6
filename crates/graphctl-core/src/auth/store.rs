use std::path::{Path, PathBuf};

use keyring::Entry;
use tracing::debug;

use super::{AuthError, Credential};
use crate::config::{AuthConfig, StorageBackend};

/// Token file name in the config directory
const TOKEN_FILE: &str = "token.json";

/// Keyring service and account holding the credential blob
const KEYRING_SERVICE: &str = "graphctl";
const KEYRING_ACCOUNT: &str = "oauth-token";

/// Persistence for the single credential record.
///
/// `load` on a missing record returns `AuthError::NotAuthenticated`;
/// `delete` on a missing record succeeds.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Credential, AuthError>;
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    fn delete(&self) -> Result<(), AuthError>;
}

/// Pick the backend named by the config.
pub fn open_store(config: &AuthConfig, config_dir: &Path) -> Box<dyn TokenStore> {
    match config.storage {
        StorageBackend::File => Box::new(FileTokenStore::new(config_dir.join(TOKEN_FILE))),
        StorageBackend::Keyring => Box::new(KeyringTokenStore::new()),
    }
}

/// JSON token file readable only by the owning user.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default file name inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TOKEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Credential, AuthError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::NotAuthenticated)
            }
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&contents)?;
        debug!(path = %self.path.display(), "Token loaded from file");
        Ok(credential)
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(credential)?;
        write_private(&self.path, contents.as_bytes())?;
        debug!(path = %self.path.display(), "Token saved to file");
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Credential serialized as JSON into the OS keychain.
pub struct KeyringTokenStore {
    service: String,
    account: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
            account: KEYRING_ACCOUNT.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, AuthError> {
        Ok(Entry::new(&self.service, &self.account)?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Credential, AuthError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(serde_json::from_str(&secret)?),
            Err(keyring::Error::NoEntry) => Err(AuthError::NotAuthenticated),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let secret = serde_json::to_string(credential)?;
        self.entry()?.set_password(&secret)?;
        debug!(service = %self.service, "Token saved to keyring");
        Ok(())
    }

    fn delete(&self) -> Result<(), AuthError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
