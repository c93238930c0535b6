//! REST client for Microsoft Graph.
//!
//! `AuthenticatedClient` loads the stored credential, refreshes it when
//! expired, and attaches it as a bearer token to every request. Resource
//! specific request builders sit on top of its verb wrappers.

pub mod client;
pub mod error;

pub use client::{AuthenticatedClient, DEFAULT_API_BASE_URL};
pub use error::{ApiError, GraphFailure};
