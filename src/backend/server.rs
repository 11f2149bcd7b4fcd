//! Server-side variant: uses the session resolved by the middleware.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::{BackendClient, BackendError, RequestOptions, SessionSource};
use crate::auth::{ResolvedSession, User};

/// The current request's session, as left in extensions by the session
/// middleware. Empty when the middleware did not run or failed open.
#[derive(Debug, Clone, Default)]
pub struct RequestSession(pub ResolvedSession);

impl RequestSession {
    pub fn user(&self) -> Option<&User> {
        self.0.user.as_ref()
    }
}

impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ResolvedSession>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl SessionSource for RequestSession {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.0.user.clone())
    }

    fn access_token(&self) -> Option<&str> {
        self.0
            .session
            .as_ref()
            .map(|session| session.access_token.as_str())
    }
}

/// Call the backend on behalf of the current request.
pub async fn call_backend_server(
    client: &BackendClient,
    session: &RequestSession,
    endpoint: &str,
    options: RequestOptions,
) -> Result<reqwest::Response, BackendError> {
    client.call(session, endpoint, options).await
}
