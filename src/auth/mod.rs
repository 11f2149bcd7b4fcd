//! Auth-provider integration.
//!
//! Authentication itself is delegated to an external provider (Supabase
//! Auth). This module only reads, refreshes and forwards the provider's
//! session; it never issues or validates tokens on its own.
//!
//! # Structure
//!
//! - [`supabase`]: REST implementation of [`AuthProvider`]
//! - [`cookies`]: session cookie encoding and the plan/apply cookie contract
//! - [`middleware`]: per-request session refresh and redirect decisions

pub mod cookies;
pub mod middleware;
pub mod supabase;

pub use middleware::{Outcome, RedirectTarget, ResolvedSession, SessionRefresh, decide};
pub use supabase::SupabaseAuth;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds before `expires_at` at which a session is treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// A signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Token bundle owned and refreshed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// UNIX timestamp (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Whether the access token has expired, or will within the refresh margin.
    ///
    /// Sessions without `expires_at` are assumed valid; the provider still
    /// gets the final say when the user is fetched.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now + EXPIRY_MARGIN_SECS)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Fill `expires_at` from `expires_in` when the provider only sent the latter.
    #[must_use]
    pub fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now + secs);
        }
        self
    }
}

/// Errors from the auth provider.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider refused the credentials or session.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The provider answered with something other than a verdict on the session.
    #[error("auth provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("auth provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid auth provider URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A stored session could not be decoded.
    #[error("invalid session cookie: {0}")]
    Decode(String),
}

impl AuthError {
    /// True when the provider decided the session is not valid, as opposed to
    /// the provider itself failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthError::Rejected { .. } | AuthError::Decode(_))
    }
}

/// External auth provider seam.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Cookie name under which the session is stored.
    fn storage_key(&self) -> &str;

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}
