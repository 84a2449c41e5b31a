//! Authentication models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-bounded session credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The bearer token string
    pub token: String,

    /// Token expiration time (unix seconds on the wire)
    #[serde(rename = "expires", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True when the credential expires within `window` of now
    pub fn expires_within(&self, window: chrono::Duration) -> bool {
        self.expires_at - window < Utc::now()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Permissions that can be attached to a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Domains,
    Urls,
    Admin,
}

/// Body of a session token request
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionTokenRequest<'a> {
    pub permissions: &'a [Permission],
}
