use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Access/refresh token pair with an absolute expiry.
///
/// `expires_at` is epoch seconds; zero means the server gave no expiry and
/// the token is treated as valid until rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredCredential")]
pub struct Credential {
    pub access_token: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    pub expires_at: i64,
}

impl Credential {
    /// Build a credential from a token response issued just now.
    pub fn issued_now(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        let expires_at = if expires_in > 0 {
            Utc::now().timestamp() + expires_in
        } else {
            0
        };
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    pub fn has_expiry(&self) -> bool {
        self.expires_at != 0
    }

    pub fn is_expired(&self) -> bool {
        self.has_expiry() && Utc::now().timestamp() >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Minutes remaining until expiry (for display), `None` without expiry.
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        if !self.has_expiry() {
            return None;
        }
        Some(((self.expires_at - Utc::now().timestamp()) / 60).max(0))
    }
}

/// Epoch number as written by either implementation: integer, float, or a
/// numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Epoch {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Epoch {
    fn to_i64(&self, field: &str) -> Result<i64, String> {
        match self {
            Epoch::Int(n) => Ok(*n),
            Epoch::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
            Epoch::Float(f) => Err(format!("{} is not a finite number: {}", field, f)),
            Epoch::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .or_else(|_| s.parse::<f64>().map(|f| f.trunc() as i64))
                    .map_err(|_| format!("{} is not numeric: {:?}", field, s))
            }
        }
    }
}

/// Token record as found on disk, before the expiry is resolved.
///
/// Our own writer emits `expires_at`; a cooperating implementation writes
/// `saved_at` (milliseconds) plus a relative `expires_in` (seconds).
#[derive(Deserialize)]
struct StoredCredential {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<Epoch>,
    #[serde(default)]
    saved_at: Option<Epoch>,
    #[serde(default)]
    expires_in: Option<Epoch>,
}

/// How a stored record encodes its expiry.
#[derive(Debug, PartialEq, Eq)]
enum ExpiryEncoding {
    Absolute(i64),
    Relative { saved_at_ms: i64, expires_in: i64 },
    Unset,
}

impl ExpiryEncoding {
    /// A zero `expires_at` counts as unset, so relative fields beside it win.
    fn of(stored: &StoredCredential) -> Result<Self, String> {
        let expires_at = match &stored.expires_at {
            Some(epoch) => epoch.to_i64("expires_at")?,
            None => 0,
        };
        if expires_at != 0 {
            return Ok(ExpiryEncoding::Absolute(expires_at));
        }
        match (&stored.saved_at, &stored.expires_in) {
            (Some(saved_at), Some(expires_in)) => Ok(ExpiryEncoding::Relative {
                saved_at_ms: saved_at.to_i64("saved_at")?,
                expires_in: expires_in.to_i64("expires_in")?,
            }),
            (Some(_), None) => Err("saved_at present without expires_in".to_string()),
            (None, Some(_)) => Err("expires_in present without saved_at".to_string()),
            (None, None) => Ok(ExpiryEncoding::Unset),
        }
    }

    fn resolve(self) -> i64 {
        match self {
            ExpiryEncoding::Absolute(at) => at,
            ExpiryEncoding::Relative {
                saved_at_ms,
                expires_in,
            } if expires_in > 0 => saved_at_ms / 1000 + expires_in,
            ExpiryEncoding::Relative { .. } | ExpiryEncoding::Unset => 0,
        }
    }
}

impl TryFrom<StoredCredential> for Credential {
    type Error = String;

    fn try_from(stored: StoredCredential) -> Result<Self, Self::Error> {
        let expires_at = ExpiryEncoding::of(&stored)?.resolve();
        Ok(Credential {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token.unwrap_or_default(),
            expires_at,
        })
    }
}
