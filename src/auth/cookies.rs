//! Session cookie storage.
//!
//! The provider session is stored as `base64-<base64url(json)>` under the
//! provider's storage key, split into `<key>.0`, `<key>.1`, ... when it does
//! not fit in a single cookie.
//!
//! Updating cookies is a two-step contract: [`plan_session_cookies`] computes
//! the set of changes without touching any message, then
//! [`apply_to_request`] and [`apply_to_response`] write them out.

use axum::http::{HeaderMap, HeaderValue, header};
use axum_extra::extract::cookie::CookieJar;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

use super::{AuthError, Session};

/// Largest value written to a single cookie before chunking.
pub const MAX_CHUNK_SIZE: usize = 3180;

const BASE64_PREFIX: &str = "base64-";

/// Lifetime of written session cookies.
const COOKIE_MAX_AGE_DAYS: i64 = 400;

/// A single cookie change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieUpdate {
    Set { name: String, value: String },
    Remove { name: String },
}

impl CookieUpdate {
    pub fn name(&self) -> &str {
        match self {
            CookieUpdate::Set { name, .. } | CookieUpdate::Remove { name } => name,
        }
    }
}

fn chunk_name(key: &str, index: usize) -> String {
    format!("{key}.{index}")
}

fn is_session_cookie(name: &str, key: &str) -> bool {
    name == key
        || name
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

pub fn encode_session(session: &Session) -> Result<String, AuthError> {
    let json = serde_json::to_vec(session).map_err(|e| AuthError::Decode(e.to_string()))?;
    Ok(format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

pub fn decode_session(value: &str) -> Result<Session, AuthError> {
    let json = match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| AuthError::Decode(e.to_string()))?,
        None => value.as_bytes().to_vec(),
    };
    serde_json::from_slice(&json).map_err(|e| AuthError::Decode(e.to_string()))
}

/// Raw stored value, joining chunks in index order.
fn read_raw(jar: &CookieJar, key: &str) -> Option<String> {
    if let Some(cookie) = jar.get(key) {
        return Some(cookie.value().to_string());
    }

    let mut value = String::new();
    let mut index = 0;
    while let Some(chunk) = jar.get(&chunk_name(key, index)) {
        value.push_str(chunk.value());
        index += 1;
    }
    (!value.is_empty()).then_some(value)
}

/// Decode the session stored under `key`, if any.
pub fn read_session(jar: &CookieJar, key: &str) -> Result<Option<Session>, AuthError> {
    read_raw(jar, key)
        .map(|value| decode_session(&value))
        .transpose()
}

/// Names of all cookies in the jar that belong to the session under `key`.
pub fn session_cookie_names(jar: &CookieJar, key: &str) -> Vec<String> {
    jar.iter()
        .map(Cookie::name)
        .filter(|name| is_session_cookie(name, key))
        .map(str::to_string)
        .collect()
}

/// Compute the cookie changes that store `session` (or clear it when `None`).
///
/// Every name in `existing` that is not rewritten is removed, so stale chunks
/// from a previously larger session never survive.
pub fn plan_session_cookies(
    key: &str,
    session: Option<&Session>,
    existing: &[String],
) -> Result<Vec<CookieUpdate>, AuthError> {
    let mut updates = Vec::new();

    if let Some(session) = session {
        let value = encode_session(session)?;
        if value.len() <= MAX_CHUNK_SIZE {
            updates.push(CookieUpdate::Set {
                name: key.to_string(),
                value,
            });
        } else {
            // The encoded value is ASCII, so byte chunks are valid UTF-8.
            for (index, chunk) in value.as_bytes().chunks(MAX_CHUNK_SIZE).enumerate() {
                updates.push(CookieUpdate::Set {
                    name: chunk_name(key, index),
                    value: String::from_utf8_lossy(chunk).into_owned(),
                });
            }
        }
    }

    let stale: Vec<CookieUpdate> = existing
        .iter()
        .filter(|name| !updates.iter().any(|u| u.name() == name.as_str()))
        .map(|name| CookieUpdate::Remove { name: name.clone() })
        .collect();
    updates.extend(stale);

    Ok(updates)
}

/// Rewrite the inbound `Cookie` header so downstream handlers see the updates.
pub fn apply_to_request(headers: &mut HeaderMap, updates: &[CookieUpdate]) {
    if updates.is_empty() {
        return;
    }

    let jar = updates
        .iter()
        .fold(CookieJar::from_headers(headers), |jar, update| match update {
            CookieUpdate::Set { name, value } => jar.add(Cookie::new(name.clone(), value.clone())),
            CookieUpdate::Remove { name } => jar.remove(Cookie::from(name.clone())),
        });

    let header_value = jar
        .iter()
        .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
        .collect::<Vec<_>>()
        .join("; ");

    headers.remove(header::COOKIE);
    if header_value.is_empty() {
        return;
    }
    match HeaderValue::from_str(&header_value) {
        Ok(value) => {
            headers.insert(header::COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable cookie header"),
    }
}

/// Build the `Set-Cookie` form of an update.
///
/// `Secure` is set exactly when `secure` is true, regardless of what the
/// provider would choose.
pub fn response_cookie(update: &CookieUpdate, secure: bool) -> Cookie<'static> {
    let (name, value, max_age) = match update {
        CookieUpdate::Set { name, value } => {
            (name.clone(), value.clone(), Duration::days(COOKIE_MAX_AGE_DAYS))
        }
        CookieUpdate::Remove { name } => (name.clone(), String::new(), Duration::ZERO),
    };

    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Append a `Set-Cookie` header per update.
pub fn apply_to_response(headers: &mut HeaderMap, updates: &[CookieUpdate], secure: bool) {
    for update in updates {
        let cookie = response_cookie(update, secure);
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(cookie = %update.name(), error = %e, "Skipping unrepresentable cookie"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "sb-test-auth-token";

    fn session(access_token: &str) -> Session {
        Session {
            access_token: access_token.to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(1_700_000_000),
            user: None,
        }
    }

    fn jar_from(updates: &[CookieUpdate]) -> CookieJar {
        let mut headers = HeaderMap::new();
        apply_to_request(&mut headers, updates);
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_small_session_uses_single_cookie() {
        let updates = plan_session_cookies(KEY, Some(&session("short")), &[]).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name(), KEY);

        let restored = read_session(&jar_from(&updates), KEY).unwrap().unwrap();
        assert_eq!(restored.access_token, "short");
    }

    #[test]
    fn test_large_session_is_chunked_and_reassembled() {
        let token = "x".repeat(MAX_CHUNK_SIZE * 2);
        let updates = plan_session_cookies(KEY, Some(&session(&token)), &[]).unwrap();

        assert!(updates.len() >= 3);
        assert_eq!(updates[0].name(), format!("{KEY}.0"));
        assert!(updates.iter().all(|u| matches!(u, CookieUpdate::Set { value, .. } if value.len() <= MAX_CHUNK_SIZE)));

        let restored = read_session(&jar_from(&updates), KEY).unwrap().unwrap();
        assert_eq!(restored.access_token, token);
    }

    #[test]
    fn test_stale_chunks_are_removed() {
        let existing = vec![format!("{KEY}.0"), format!("{KEY}.1")];
        let updates = plan_session_cookies(KEY, Some(&session("short")), &existing).unwrap();

        assert!(updates.contains(&CookieUpdate::Remove {
            name: format!("{KEY}.0")
        }));
        assert!(updates.contains(&CookieUpdate::Remove {
            name: format!("{KEY}.1")
        }));
    }

    #[test]
    fn test_clearing_removes_everything() {
        let existing = vec![KEY.to_string()];
        let updates = plan_session_cookies(KEY, None, &existing).unwrap();
        assert_eq!(
            updates,
            vec![CookieUpdate::Remove {
                name: KEY.to_string()
            }]
        );
    }

    #[test]
    fn test_plain_json_is_accepted() {
        let json = serde_json::to_string(&session("plain")).unwrap();
        assert_eq!(decode_session(&json).unwrap().access_token, "plain");
        assert!(matches!(
            decode_session("base64-!!!"),
            Err(AuthError::Decode(_))
        ));
    }

    #[test]
    fn test_session_cookie_names_ignore_unrelated() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{KEY}.0=a; {KEY}.1=b; {KEY}-code-verifier=c; theme=dark"))
                .unwrap(),
        );
        let jar = CookieJar::from_headers(&headers);
        let mut names = session_cookie_names(&jar, KEY);
        names.sort();
        assert_eq!(names, vec![format!("{KEY}.0"), format!("{KEY}.1")]);
    }

    #[test]
    fn test_request_rewrite_keeps_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; old=1"));
        apply_to_request(
            &mut headers,
            &[
                CookieUpdate::Remove {
                    name: "old".to_string(),
                },
                CookieUpdate::Set {
                    name: "fresh".to_string(),
                    value: "2".to_string(),
                },
            ],
        );

        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("theme").unwrap().value(), "dark");
        assert_eq!(jar.get("fresh").unwrap().value(), "2");
        assert!(jar.get("old").is_none());
    }

    #[test]
    fn test_response_cookies_follow_secure_flag() {
        let update = CookieUpdate::Set {
            name: KEY.to_string(),
            value: "v".to_string(),
        };

        let mut headers = HeaderMap::new();
        apply_to_response(&mut headers, std::slice::from_ref(&update), true);
        let secure = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(secure.contains("Secure"));
        assert!(secure.contains("Path=/"));

        let insecure = response_cookie(&update, false).to_string();
        assert!(!insecure.contains("Secure"));

        let removal = response_cookie(
            &CookieUpdate::Remove {
                name: KEY.to_string(),
            },
            false,
        )
        .to_string();
        assert!(removal.contains("Max-Age=0"));
    }
}
