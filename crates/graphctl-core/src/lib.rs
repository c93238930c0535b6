//! Core library for graphctl.
//!
//! Provides the device-code login flow, credential storage and refresh, the
//! slug registry that shortens Graph identifiers for the command line, and
//! a bearer-token client for the Graph REST API.

pub mod api;
pub mod auth;
pub mod config;
pub mod slugs;
pub mod utils;

pub use api::{ApiError, AuthenticatedClient};
pub use auth::{AuthError, Credential, DeviceCodeAuthenticator, TokenRefresher, TokenStore};
pub use config::{AuthConfig, AuthEndpoints, StorageBackend};
pub use slugs::SlugRegistry;
