//! Client-side variant: the caller holds the session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;

use super::{BackendClient, BackendError, RequestOptions, SessionSource};
use crate::auth::cookies::read_session;
use crate::auth::{AuthProvider, Session, User};

/// A session held by the caller. The user is re-verified with the auth
/// provider on every call.
#[derive(Clone)]
pub struct ProviderSession {
    provider: Arc<dyn AuthProvider>,
    session: Option<Session>,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("storage_key", &self.provider.storage_key())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl ProviderSession {
    pub fn new(provider: Arc<dyn AuthProvider>, session: Option<Session>) -> Self {
        Self { provider, session }
    }

    /// Read the session from browser cookies. An undecodable cookie counts as
    /// no session.
    pub fn from_jar(provider: Arc<dyn AuthProvider>, jar: &CookieJar) -> Self {
        let session = read_session(jar, provider.storage_key()).ok().flatten();
        Self::new(provider, session)
    }
}

#[async_trait]
impl SessionSource for ProviderSession {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        let Some(session) = &self.session else {
            return Ok(None);
        };

        match self.provider.get_user(&session.access_token).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_rejection() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn access_token(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }
}

/// Call the backend with a caller-held session.
pub async fn call_backend_client(
    client: &BackendClient,
    session: &ProviderSession,
    endpoint: &str,
    options: RequestOptions,
) -> Result<reqwest::Response, BackendError> {
    client.call(session, endpoint, options).await
}
