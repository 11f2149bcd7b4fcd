//! Authenticated calls to the backend service.
//!
//! Both entry points share [`BackendClient`]; they differ only in where the
//! session comes from:
//!
//! - [`call_backend_server`]: the session the middleware already resolved for
//!   the current request ([`RequestSession`]).
//! - [`call_backend_client`]: a session held by the caller, re-verified with
//!   the auth provider on every call ([`ProviderSession`]).
//!
//! A call is a single best-effort request: no retry, no timeout, no backoff.

pub mod client;
pub mod server;

pub use client::{ProviderSession, call_backend_client};
pub use server::{RequestSession, call_backend_server};

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::auth::{AuthError, User};

/// Errors raised before or while calling the backend.
///
/// The first three are surfaced to users verbatim.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Missing access token")]
    MissingAccessToken,

    #[error("Missing NEXT_PUBLIC_BACKEND_URL")]
    MissingBackendUrl,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Turn a non-success response into [`BackendError::Status`] carrying the body text.
pub async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Where a backend call gets its user and access token.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// The signed-in user, or `None` when there is none.
    async fn current_user(&self) -> Result<Option<User>, BackendError>;

    fn access_token(&self) -> Option<&str>;
}

/// Optional parts of a backend request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Defaults to `GET`.
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, BackendError> {
        self.body = Some(serde_json::to_vec(value)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }
}

/// HTTP client bound to the configured backend base URL.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: Option<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Build the outgoing request without sending it.
    ///
    /// Checks run in order: signed-in user, access token, base URL. The
    /// bearer header replaces any `Authorization` the caller supplied.
    pub async fn build_request<S>(
        &self,
        source: &S,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<reqwest::Request, BackendError>
    where
        S: SessionSource + ?Sized,
    {
        if source.current_user().await?.is_none() {
            return Err(BackendError::NotAuthenticated);
        }

        let token = source
            .access_token()
            .filter(|token| !token.is_empty())
            .ok_or(BackendError::MissingAccessToken)?;

        let base_url = self
            .base_url
            .as_deref()
            .ok_or(BackendError::MissingBackendUrl)?;

        let url = Url::parse(&format!("{base_url}{endpoint}"))?;

        let mut headers = options.headers;
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );

        let mut builder = self.http.request(options.method, url).headers(headers);
        if let Some(body) = options.body {
            builder = builder.body(body);
        }
        Ok(builder.build()?)
    }

    /// Build and send the request.
    pub async fn call<S>(
        &self,
        source: &S,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<reqwest::Response, BackendError>
    where
        S: SessionSource + ?Sized,
    {
        let request = self.build_request(source, endpoint, options).await?;
        debug!(
            name: "backend.call",
            method = %request.method(),
            url = %request.url(),
            "Calling backend"
        );
        Ok(self.http.execute(request).await?)
    }
}
