//! Supabase Auth (GoTrue) REST client.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use super::{AuthError, AuthProvider, Session, User};

/// [`AuthProvider`] backed by the Supabase Auth REST API.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    storage_key: String,
}

impl SupabaseAuth {
    pub fn new(supabase_url: &str, anon_key: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_client(supabase_url, anon_key, reqwest::Client::new())
    }

    pub fn with_client(
        supabase_url: &str,
        anon_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let parsed = Url::parse(supabase_url)?;
        let project_ref = parsed
            .host_str()
            .and_then(|host| host.split('.').next())
            .unwrap_or_default();

        Ok(Self {
            http,
            base_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            storage_key: format!("sb-{project_ref}-auth-token"),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let session: Session = parse_response(response).await?;
        Ok(session.with_expiry_from(Utc::now().timestamp()))
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    fn storage_key(&self) -> &str {
        &self.storage_key
    }

    async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .http
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(error_from(response).await)
    }
}

/// Map a non-success provider response onto [`AuthError`].
///
/// Client errors other than 429 are verdicts on the credentials; anything
/// else means the provider could not answer.
async fn error_from(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        AuthError::Rejected {
            status: status.as_u16(),
            message,
        }
    } else {
        AuthError::Provider {
            status: status.as_u16(),
            message,
        }
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_string))
}
