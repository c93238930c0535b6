//! Authentication module for the device-code login lifecycle.
//!
//! This module provides:
//! - `DeviceCodeAuthenticator`: first login via the OAuth device-code grant
//! - `TokenRefresher`: refresh-on-expiry with write-back to storage
//! - `TokenStore`: credential persistence in a file or the OS keyring
//!
//! Credentials are normalized to an absolute expiry when loaded.

pub mod credential;
pub mod device;
pub mod error;
pub mod oauth;
pub mod refresh;
pub mod store;

pub use credential::Credential;
pub use device::{DeviceCode, DeviceCodeAuthenticator, PollTiming};
pub use error::AuthError;
pub use refresh::TokenRefresher;
pub use store::{open_store, FileTokenStore, KeyringTokenStore, TokenStore};
