use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header::X_FRAME_OPTIONS},
    middleware,
    response::{
        Html, IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::AppState;
use crate::auth::cookies::{apply_to_response, plan_session_cookies, session_cookie_names};
use crate::auth::middleware::session_middleware;
use crate::auth::{RedirectTarget, SupabaseAuth};
use crate::backend::{
    BackendClient, BackendError, ProviderSession, RequestOptions, RequestSession,
    call_backend_client, error_for_status,
};
use crate::chat::{ChatError, ChatEvent, ChatMessage};
use crate::config::AppConfig;
use crate::ui::{escape_html, fragments, pages};

/// Build the application router with all layers applied.
pub fn build_router(state: AppState) -> Router {
    let frame_options = HeaderValue::from_static(state.config.security.frame_options());

    Router::new()
        .route("/", get(landing))
        .route("/protected", get(protected_page))
        .route("/protected/{*rest}", get(protected_page))
        .route("/sign-in", get(sign_in_form).post(sign_in))
        .route("/sign-out", post(sign_out))
        .route("/api/health-check", get(api_health_check))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/stream", get(api_chat_stream))
        .route("/api/chat/messages", get(api_chat_messages))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            frame_options,
        ))
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let auth = SupabaseAuth::new(&config.auth.supabase_url, config.auth.anon_key.clone())?;
    let backend = BackendClient::new(config.backend.url.clone());

    if backend.base_url().is_none() {
        warn!(
            name: "backend.config.missing",
            "NEXT_PUBLIC_BACKEND_URL is not set; backend calls will fail"
        );
    }

    info!(
        name: "auth.config.loaded",
        supabase_url = %config.auth.supabase_url,
        secure_mode = config.security.secure_mode,
        "Auth provider configured"
    );

    let state = AppState::new(Arc::clone(&config), Arc::new(auth), Arc::new(backend));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn landing(session: RequestSession) -> Html<String> {
    Html(pages::landing(session.user()))
}

async fn protected_page(State(state): State<AppState>, session: RequestSession) -> Html<String> {
    let messages = session
        .user()
        .map(|user| state.chat.transcript(&user.id))
        .unwrap_or_default();
    Html(pages::chat(session.user(), &messages))
}

async fn sign_in_form() -> Html<String> {
    Html(pages::sign_in(None, ""))
}

#[derive(Debug, Deserialize)]
struct SignInForm {
    email: String,
    password: String,
}

/// POST /sign-in - Exchange credentials for a session and store it in cookies.
async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignInForm>,
) -> Response {
    let session = match state
        .auth
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(session) => session,
        Err(e) if e.is_rejection() => {
            info!(name: "auth.sign_in.rejected", error = %e, "Sign-in rejected");
            return (
                StatusCode::UNAUTHORIZED,
                Html(pages::sign_in(Some(&e.to_string()), &form.email)),
            )
                .into_response();
        }
        Err(e) => {
            error!(name: "auth.sign_in.failed", error = %e, "Auth provider failed during sign-in");
            return (
                StatusCode::BAD_GATEWAY,
                Html(pages::sign_in(
                    Some("Sign-in is unavailable right now"),
                    &form.email,
                )),
            )
                .into_response();
        }
    };

    let key = state.auth.storage_key();
    let updates = match plan_session_cookies(key, Some(&session), &session_cookie_names(&jar, key))
    {
        Ok(updates) => updates,
        Err(e) => {
            error!(error = %e, "Could not encode session");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = Redirect::to(RedirectTarget::Protected.path()).into_response();
    apply_to_response(
        response.headers_mut(),
        &updates,
        state.config.security.secure_mode,
    );
    response
}

/// POST /sign-out - Best-effort provider logout, then clear the session cookies.
async fn sign_out(
    State(state): State<AppState>,
    session: RequestSession,
    jar: CookieJar,
) -> Response {
    if let Some(current) = &session.0.session {
        if let Err(e) = state.auth.sign_out(&current.access_token).await {
            warn!(name: "auth.sign_out.failed", error = %e, "Provider sign-out failed");
        }
    }

    let key = state.auth.storage_key();
    let mut response = Redirect::to(RedirectTarget::SignIn.path()).into_response();
    if let Ok(updates) = plan_session_cookies(key, None, &session_cookie_names(&jar, key)) {
        apply_to_response(
            response.headers_mut(),
            &updates,
            state.config.security.secure_mode,
        );
    }
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HealthCheckResponse {
    message: String,
}

async fn fetch_health_message(
    state: &AppState,
    session: &ProviderSession,
) -> Result<String, BackendError> {
    let response = call_backend_client(
        &state.backend,
        session,
        &state.config.backend.health_endpoint,
        RequestOptions::new(),
    )
    .await?;
    let body: HealthCheckResponse = error_for_status(response).await?.json().await?;
    Ok(body.message)
}

/// GET /api/health-check - Fragment loaded once when the chat page mounts.
async fn api_health_check(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let session = ProviderSession::from_jar(Arc::clone(&state.auth), &jar);
    match fetch_health_message(&state, &session).await {
        Ok(message) => Html(fragments::health_result(Some(&message))),
        Err(e) => {
            error!(name: "health_check.failed", error = %e, "Error fetching health check");
            Html(fragments::health_result(None))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    message: String,
}

/// POST /api/chat - Append the user's message and hand back the reply slot.
async fn api_chat(
    State(state): State<AppState>,
    session: RequestSession,
    Form(form): Form<ChatForm>,
) -> Response {
    let Some(user) = session.user() else {
        return (StatusCode::UNAUTHORIZED, BackendError::NotAuthenticated.to_string())
            .into_response();
    };

    match state.chat.submit(&user.id, &form.message) {
        Ok(message) => Html(fragments::submitted(&message)).into_response(),
        Err(e @ ChatError::EmptyMessage) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        Err(e @ ChatError::ReplyInProgress) => (StatusCode::CONFLICT, e.to_string()).into_response(),
    }
}

/// Map a chat event to its SSE form.
///
/// Text is HTML-escaped because the page swaps it in as markup.
fn sse_event(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Delta(text) => Event::default()
            .event("message.delta")
            .data(escape_html(&text.replace('\r', ""))),
        ChatEvent::Error(message) => Event::default()
            .event("error")
            .data(escape_html(&message.replace('\r', ""))),
        ChatEvent::Done(reply) => Event::default()
            .event("done")
            .data(serde_json::to_string(&reply).unwrap_or_else(|_| "null".to_string())),
    }
}

/// GET /api/chat/stream - Stream the reply to the pending message.
async fn api_chat_stream(
    State(state): State<AppState>,
    session: RequestSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state
        .chat
        .stream_reply(session)
        .map(|event| Ok(sse_event(event)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// GET /api/chat/messages - Current transcript as JSON.
async fn api_chat_messages(
    State(state): State<AppState>,
    session: RequestSession,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    let user = session.user().ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(state.chat.transcript(&user.id)))
}
