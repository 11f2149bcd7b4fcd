//! Per-request session refresh and redirect policy.
//!
//! Every request refreshes the provider session from its cookies. In secure
//! mode the result drives two UX redirects; otherwise requests always pass
//! through. Provider failures fail open: the request continues unmodified.
//! This is an availability policy and must not be relied on to reject
//! traffic.

use axum::{
    extract::{Request, State},
    http::header::SET_COOKIE,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use cookie::Cookie;
use tracing::{debug, info, warn};

use super::cookies::{
    CookieUpdate, apply_to_request, apply_to_response, plan_session_cookies, read_session,
    session_cookie_names,
};
use super::{AuthError, AuthProvider, Session, User};
use crate::AppState;

/// Path prefix that requires a session in secure mode.
pub const PROTECTED_PREFIX: &str = "/protected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    SignIn,
    Protected,
}

impl RedirectTarget {
    pub fn path(self) -> &'static str {
        match self {
            RedirectTarget::SignIn => "/sign-in",
            RedirectTarget::Protected => PROTECTED_PREFIX,
        }
    }
}

/// What the middleware does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    PassThrough,
    Redirect(RedirectTarget),
}

/// Session state handed to downstream handlers through request extensions.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSession {
    /// Present only when the provider confirmed the user.
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// Result of refreshing the session carried by a request.
#[derive(Debug, Default)]
pub struct SessionRefresh {
    pub resolved: ResolvedSession,
    /// Cookie changes to mirror onto the request and the response.
    pub cookies: Vec<CookieUpdate>,
}

/// Redirect decision for a request path.
pub fn decide(path: &str, secure_mode: bool, authenticated: bool) -> Outcome {
    if !secure_mode {
        return Outcome::PassThrough;
    }
    if path.starts_with(PROTECTED_PREFIX) && !authenticated {
        return Outcome::Redirect(RedirectTarget::SignIn);
    }
    if path == "/" && authenticated {
        return Outcome::Redirect(RedirectTarget::Protected);
    }
    Outcome::PassThrough
}

fn cleared(key: &str, existing: &[String]) -> Result<SessionRefresh, AuthError> {
    Ok(SessionRefresh {
        resolved: ResolvedSession::default(),
        cookies: plan_session_cookies(key, None, existing)?,
    })
}

/// Load the stored session, refresh it when expired, and confirm the user.
///
/// Provider rejections resolve to "no user"; every other provider error is
/// returned so the caller can fail open.
pub async fn refresh_session(
    provider: &dyn AuthProvider,
    jar: &CookieJar,
) -> Result<SessionRefresh, AuthError> {
    let key = provider.storage_key();
    let existing = session_cookie_names(jar, key);

    let stored = match read_session(jar, key) {
        Ok(Some(session)) => session,
        Ok(None) => return Ok(SessionRefresh::default()),
        Err(e) => {
            debug!(error = %e, "Discarding undecodable session cookie");
            return cleared(key, &existing);
        }
    };

    let (session, cookies) = if stored.is_expired() {
        match provider.refresh_session(&stored.refresh_token).await {
            Ok(fresh) => {
                let cookies = plan_session_cookies(key, Some(&fresh), &existing)?;
                info!(name: "session.refreshed", chunks = cookies.len(), "Session refreshed");
                (fresh, cookies)
            }
            Err(e) if e.is_rejection() => {
                debug!(error = %e, "Refresh token rejected");
                return cleared(key, &existing);
            }
            Err(e) => return Err(e),
        }
    } else {
        (stored, Vec::new())
    };

    let user = match provider.get_user(&session.access_token).await {
        Ok(user) => Some(user),
        Err(e) if e.is_rejection() => {
            debug!(error = %e, "Access token rejected");
            None
        }
        Err(e) => return Err(e),
    };

    Ok(SessionRefresh {
        resolved: ResolvedSession {
            user,
            session: Some(session),
        },
        cookies,
    })
}

/// Refresh and decide in one step.
///
/// A provider failure yields `PassThrough` with no refresh, meaning the
/// request goes on exactly as it arrived.
pub async fn evaluate(
    provider: &dyn AuthProvider,
    jar: &CookieJar,
    path: &str,
    secure_mode: bool,
) -> (Outcome, Option<SessionRefresh>) {
    match refresh_session(provider, jar).await {
        Ok(refresh) => {
            let outcome = decide(path, secure_mode, refresh.resolved.user.is_some());
            (outcome, Some(refresh))
        }
        Err(e) => {
            warn!(
                name: "session.refresh.failed",
                error = %e,
                path = %path,
                "Auth provider failed, passing request through"
            );
            (Outcome::PassThrough, None)
        }
    }
}

/// Axum middleware wrapping [`evaluate`].
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let secure_mode = state.config.security.secure_mode;
    let jar = CookieJar::from_headers(request.headers());
    let path = request.uri().path().to_string();

    let (outcome, refresh) = evaluate(state.auth.as_ref(), &jar, &path, secure_mode).await;

    if let Outcome::Redirect(target) = outcome {
        info!(
            name: "session.redirect",
            from = %path,
            to = target.path(),
            "Redirecting request"
        );
        return Redirect::temporary(target.path()).into_response();
    }

    let Some(refresh) = refresh else {
        return next.run(request).await;
    };

    apply_to_request(request.headers_mut(), &refresh.cookies);
    request.extensions_mut().insert(refresh.resolved);

    let mut response = next.run(request).await;
    let pending = without_handler_cookies(&response, refresh.cookies);
    apply_to_response(response.headers_mut(), &pending, secure_mode);
    response
}

/// Drop updates for cookies the handler already wrote (sign-in, sign-out).
fn without_handler_cookies(response: &Response, updates: Vec<CookieUpdate>) -> Vec<CookieUpdate> {
    let written: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .map(|cookie| cookie.name().to_string())
        .collect();

    updates
        .into_iter()
        .filter(|update| !written.iter().any(|name| name == update.name()))
        .collect()
}
