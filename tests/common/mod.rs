//! Shared fixtures: an in-memory auth provider and a loopback backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, Response, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;

use session_gateway::AppState;
use session_gateway::auth::cookies::encode_session;
use session_gateway::auth::{AuthError, AuthProvider, Session, User};
use session_gateway::backend::BackendClient;
use session_gateway::config::{
    AppConfig, AuthConfig, BackendConfig, ChatConfig, SecurityConfig, ServerConfig,
};
use session_gateway::server::build_router;

pub const STORAGE_KEY: &str = "sb-test-auth-token";
pub const GOOD_TOKEN: &str = "good-token";
pub const USER_ID: &str = "user-1";

pub fn user() -> User {
    User {
        id: USER_ID.to_string(),
        email: Some("user@example.com".to_string()),
        role: Some("authenticated".to_string()),
        aud: None,
    }
}

pub fn session(access_token: &str, expires_at: i64) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: format!("refresh-for-{access_token}"),
        token_type: "bearer".to_string(),
        expires_in: Some(3600),
        expires_at: Some(expires_at),
        user: None,
    }
}

pub fn valid_session() -> Session {
    session(GOOD_TOKEN, chrono::Utc::now().timestamp() + 3600)
}

/// `Cookie` header value carrying a session.
pub fn session_cookie(session: &Session) -> String {
    format!("{STORAGE_KEY}={}", encode_session(session).unwrap())
}

/// In-memory provider. Only [`GOOD_TOKEN`] is a valid access token; refresh
/// tokens listed in `refreshes` yield their session.
#[derive(Default)]
pub struct FakeAuth {
    pub refreshes: HashMap<String, Session>,
    /// Every call fails as if the provider were down.
    pub unavailable: bool,
    pub sign_outs: AtomicUsize,
}

impl FakeAuth {
    fn outage() -> AuthError {
        AuthError::Provider {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }

    fn rejected(message: &str) -> AuthError {
        AuthError::Rejected {
            status: 401,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    fn storage_key(&self) -> &str {
        STORAGE_KEY
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        if self.unavailable {
            return Err(Self::outage());
        }
        if access_token == GOOD_TOKEN {
            Ok(user())
        } else {
            Err(Self::rejected("invalid JWT"))
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        if self.unavailable {
            return Err(Self::outage());
        }
        self.refreshes
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| Self::rejected("Invalid Refresh Token"))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        if self.unavailable {
            return Err(Self::outage());
        }
        if email == "user@example.com" && password == "secret" {
            Ok(valid_session())
        } else {
            Err(Self::rejected("Invalid login credentials"))
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn config(secure_mode: bool, backend_url: Option<String>) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        backend: BackendConfig {
            url: backend_url,
            chat_endpoint: "/chat".to_string(),
            health_endpoint: "/auth-health-check".to_string(),
        },
        auth: AuthConfig {
            supabase_url: "https://test.supabase.co".to_string(),
            anon_key: "anon".to_string(),
        },
        security: SecurityConfig { secure_mode },
        chat: ChatConfig {
            idle_timeout_secs: 60,
        },
    }
}

pub fn state_with(auth: Arc<FakeAuth>, secure_mode: bool, backend_url: Option<String>) -> AppState {
    let config = Arc::new(config(secure_mode, backend_url.clone()));
    let backend = Arc::new(BackendClient::new(backend_url));
    AppState::new(config, auth, backend)
}

pub fn app_with(auth: Arc<FakeAuth>, secure_mode: bool, backend_url: Option<String>) -> Router {
    build_router(state_with(auth, secure_mode, backend_url))
}

pub fn app(secure_mode: bool) -> Router {
    app_with(Arc::new(FakeAuth::default()), secure_mode, None)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, form: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// What the loopback backend observed.
#[derive(Default)]
pub struct BackendLog {
    pub hits: AtomicUsize,
    pub authorization: Mutex<Vec<String>>,
    pub chat_bodies: Mutex<Vec<Value>>,
}

impl BackendLog {
    fn record(&self, headers: &HeaderMap) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.authorization.lock().unwrap().push(auth);
    }
}

async fn health_check(State(log): State<Arc<BackendLog>>, headers: HeaderMap) -> Json<Value> {
    log.record(&headers);
    Json(json!({ "message": format!("Hello user with id {USER_ID}!") }))
}

async fn chat(
    State(log): State<Arc<BackendLog>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response<Body> {
    log.record(&headers);
    log.chat_bodies.lock().unwrap().push(body);
    Response::builder()
        .header("x-vercel-ai-data-stream", "v1")
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("0:\"Hello\"\n0:\" <there>\"\n"))
        .unwrap()
}

/// Serve a fake backend on an ephemeral loopback port and return its base URL.
pub async fn spawn_backend() -> (String, Arc<BackendLog>) {
    let log = Arc::new(BackendLog::default());
    let app = Router::new()
        .route("/auth-health-check", get(health_check))
        .route("/chat", post(chat))
        .with_state(Arc::clone(&log));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), log)
}
