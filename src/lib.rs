//! Session Gateway
//!
//! A thin HTTP front-end that keeps an auth-provider session fresh on every
//! request, forwards authenticated calls to a separate backend service and
//! serves a streaming chat page.
//!
//! # Architecture
//!
//! - **Session middleware**: refreshes the provider session from cookies and,
//!   in secure mode, redirects around the protected area; fails open
//! - **Backend helpers**: bearer-authenticated calls to the backend
//! - **Chat hook**: server-owned transcript with SSE reply streaming
//! - **UI**: server-rendered HTML + HTMX
//!
//! # Modules
//!
//! - [`auth`]: provider client, session cookies and middleware
//! - [`backend`]: backend call helpers
//! - [`chat`]: transcript store and reply streaming
//! - [`config`]: layered process configuration
//! - [`server`]: router and handlers
//! - [`ui`]: HTML pages and fragments

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod server;
pub mod ui;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use auth::AuthProvider;
use backend::BackendClient;
use chat::{ChatHook, ChatStore};
use config::AppConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// External auth provider.
    pub auth: Arc<dyn AuthProvider>,
    /// Backend client bound to the configured base URL.
    pub backend: Arc<BackendClient>,
    /// Chat transcript owner.
    pub chat: ChatHook,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        auth: Arc<dyn AuthProvider>,
        backend: Arc<BackendClient>,
    ) -> Self {
        let store = ChatStore::new(Duration::from_secs(config.chat.idle_timeout_secs));
        let chat = ChatHook::new(
            store,
            Arc::clone(&backend),
            config.backend.chat_endpoint.clone(),
        );
        Self {
            config,
            auth,
            backend,
            chat,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("storage_key", &self.auth.storage_key())
            .field("backend", &self.backend)
            .finish()
    }
}
