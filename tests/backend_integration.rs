mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;

use session_gateway::auth::{AuthProvider, ResolvedSession};
use session_gateway::backend::{
    BackendClient, BackendError, ProviderSession, RequestOptions, RequestSession,
    call_backend_client, call_backend_server,
};

use common::*;

fn provider() -> Arc<dyn AuthProvider> {
    Arc::new(FakeAuth::default())
}

#[tokio::test]
async fn test_server_call_overrides_caller_authorization() {
    let (base_url, log) = spawn_backend().await;
    let client = BackendClient::new(Some(base_url));
    let session = RequestSession(ResolvedSession {
        user: Some(user()),
        session: Some(valid_session()),
    });

    let options =
        RequestOptions::new().header(AUTHORIZATION, HeaderValue::from_static("Bearer spoofed"));
    let response = call_backend_server(&client, &session, "/auth-health-check", options)
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Hello user with id user-1!");
    assert_eq!(
        log.authorization.lock().unwrap().as_slice(),
        [format!("Bearer {GOOD_TOKEN}")]
    );
}

#[tokio::test]
async fn test_client_call_reverifies_user() {
    let (base_url, log) = spawn_backend().await;
    let client = BackendClient::new(Some(base_url));

    let revoked = ProviderSession::new(
        provider(),
        Some(session("revoked", chrono::Utc::now().timestamp() + 3600)),
    );
    let err = call_backend_client(&client, &revoked, "/auth-health-check", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotAuthenticated));
    assert_eq!(log.hits.load(Ordering::SeqCst), 0);

    let valid = ProviderSession::new(provider(), Some(valid_session()));
    let response =
        call_backend_client(&client, &valid, "/auth-health-check", RequestOptions::new())
            .await
            .unwrap();
    assert!(response.status().is_success());
    assert_eq!(log.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_call_surfaces_provider_outage() {
    let (base_url, log) = spawn_backend().await;
    let client = BackendClient::new(Some(base_url));
    let down: Arc<dyn AuthProvider> = Arc::new(FakeAuth {
        unavailable: true,
        ..FakeAuth::default()
    });

    let session = ProviderSession::new(down, Some(valid_session()));
    let err = call_backend_client(&client, &session, "/auth-health-check", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Auth(_)));
    assert_eq!(log.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_session_sends_nothing() {
    let (base_url, log) = spawn_backend().await;
    let client = BackendClient::new(Some(base_url));

    let err = call_backend_server(
        &client,
        &RequestSession::default(),
        "/auth-health-check",
        RequestOptions::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Not authenticated");

    let anonymous = ProviderSession::new(provider(), None);
    let err = call_backend_client(&client, &anonymous, "/auth-health-check", RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Not authenticated");
    assert_eq!(log.hits.load(Ordering::SeqCst), 0);
}
